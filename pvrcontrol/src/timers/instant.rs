//! Instant recording: the default-recording-length policy.

use chrono::Utc;
use tracing::{debug, warn};

use pvrclient::{Channel, EpgTag, Timer};
use pvrconfig::InstantRecordAction;

use crate::errors::{PvrError, Result};
use crate::providers::{InstantRecordOption, Severity};

use super::TimerEngine;

/// Shows almost over get the "record next show" preselection.
const PRESELECT_NEXT_SHOW_THRESHOLD: f64 = 90.0;

impl TimerEngine {
    /// Flip recording on the channel currently playing.
    pub fn toggle_recording_on_playing_channel(&self) -> Result<()> {
        let Some(channel) = self.playback.playing_channel() else {
            return Err(PvrError::NoChannel);
        };
        let on = !self.is_recording_on_channel(&channel);
        self.set_recording_on_channel(&channel, on)
    }

    /// Turn recording on or off on a channel.
    ///
    /// Turning on with no EPG context requested runs the configured
    /// default-recording-length policy: record the current show, record a
    /// fixed number of minutes, or ask. Turning off deletes the channel's
    /// actively recording timers.
    pub fn set_recording_on_channel(&self, channel: &Channel, on: bool) -> Result<()> {
        self.check_parental(channel)?;

        let Some(client) = self.registry.get_client(channel.client_id) else {
            return Err(PvrError::InvalidClient(channel.client_id));
        };
        if !client.capabilities().supports_timers {
            debug!(channel = %channel.name, "Channel's backend does not support timers");
            return Err(PvrError::UnsupportedTimerType);
        }

        if on {
            if self.is_recording_on_channel(channel) {
                return Ok(());
            }

            let mut duration = self.config.get_instant_record_minutes();
            let tag = match self.config.get_instant_record_action() {
                InstantRecordAction::CurrentShow => self.services.epg.now_on(channel),
                InstantRecordAction::FixedDuration => None,
                InstantRecordAction::Ask => self.ask_instant_record_action(channel, &mut duration)?,
            };

            let timer = tag
                .filter(|t| !t.gap)
                .and_then(|t| Timer::from_epg(&t, false))
                .unwrap_or_else(|| Timer::instant(channel, duration));

            match client.add_timer(&timer) {
                Ok(()) => {
                    self.events
                        .broadcast(crate::events::CoreEvent::TimersChanged);
                    Ok(())
                }
                Err(err) => {
                    warn!(channel = %channel.name, error = %err, "Could not start recording");
                    self.services
                        .notifications
                        .notify(Severity::Error, "Could not start recording");
                    Err(PvrError::Backend(err))
                }
            }
        } else {
            if !self.is_recording_on_channel(channel) {
                return Ok(());
            }
            self.delete_timers_on_channel(channel, true)
        }
    }

    /// The "ask" policy: offer the fixed lengths and, when the EPG knows
    /// them, the current and next show. Preselects the current show when
    /// available (the next show once the current one is almost over), else
    /// the configured fixed duration.
    ///
    /// Returns the chosen EPG entry, or `None` with `duration` set for a
    /// fixed-length recording. `Aborted` when the dialog was canceled.
    fn ask_instant_record_action(
        &self,
        channel: &Channel,
        duration: &mut i64,
    ) -> Result<Option<EpgTag>> {
        let fixed_default = *duration;

        let mut options = vec![
            InstantRecordOption::FixedMinutes(30),
            InstantRecordOption::FixedMinutes(60),
            InstantRecordOption::FixedMinutes(120),
        ];
        if fixed_default != 30 && fixed_default != 60 && fixed_default != 120 {
            options.push(InstantRecordOption::FixedMinutes(fixed_default));
        }

        let mut preselect = options
            .iter()
            .position(|o| *o == InstantRecordOption::FixedMinutes(fixed_default))
            .unwrap_or(0);

        let now_tag = self.services.epg.now_on(channel);
        let next_tag = self.services.epg.next_on(channel);

        if let Some(current) = &now_tag {
            options.push(InstantRecordOption::CurrentShow(masked_title(
                channel, current,
            )));
            preselect = options.len() - 1;

            if let Some(next) = &next_tag {
                options.push(InstantRecordOption::NextShow(masked_title(channel, next)));
                // Be smart: if the current show is almost over, preselect
                // the next one.
                if current.progress_percentage(Utc::now()) > PRESELECT_NEXT_SHOW_THRESHOLD {
                    preselect = options.len() - 1;
                }
            }
        }

        let Some(choice) = self.services.instant_prompt.select(&options, preselect) else {
            return Err(PvrError::Aborted);
        };

        match options.get(choice) {
            Some(InstantRecordOption::FixedMinutes(minutes)) => {
                *duration = *minutes;
                Ok(None)
            }
            Some(InstantRecordOption::CurrentShow(_)) => Ok(now_tag),
            Some(InstantRecordOption::NextShow(_)) => Ok(next_tag),
            None => {
                warn!(choice, "Instant record selection out of range, using fixed length");
                Ok(None)
            }
        }
    }
}

/// Parental-locked channels never leak titles into the dialog.
fn masked_title(channel: &Channel, tag: &EpgTag) -> String {
    if channel.locked {
        "Parental locked".to_string()
    } else {
        tag.title.clone()
    }
}
