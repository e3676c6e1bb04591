//! Timer & reminder engine.
//!
//! Owns timer/rule CRUD, conflict-aware deletion, edit rollback and the
//! reminder countdown protocol. The engine keeps no persistent cache: each
//! backend's view of its own timers is authoritative and is only aggregated
//! transiently. Reminders are the one exception — they have no recording
//! side effect and live purely in this process.

mod instant;
mod reminders;

use std::sync::atomic::{AtomicBool, AtomicU32};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use pvrclient::{Channel, EpgTag, Timer};
use pvrconfig::Config;

use crate::errors::{DeleteTimerResult, PvrError, Result};
use crate::events::{CoreEvent, CoreEventBus};
use crate::playback::PlaybackTracker;
use crate::providers::{
    ChannelSwitcher, EpgProvider, InstantRecordPrompt, NotificationSink, ParentalCheckResult,
    ParentalGuard, ReminderPrompt, Severity,
};
use crate::registry::ClientRegistry;

use reminders::ReminderQueue;

/// Collaborators injected into the engine.
pub struct Services {
    pub epg: Arc<dyn EpgProvider>,
    pub parental: Arc<dyn ParentalGuard>,
    pub notifications: Arc<dyn NotificationSink>,
    pub reminder_prompt: Arc<dyn ReminderPrompt>,
    pub instant_prompt: Arc<dyn InstantRecordPrompt>,
    pub switcher: Arc<dyn ChannelSwitcher>,
}

/// Source from which a new timer is derived.
#[derive(Clone, Debug)]
pub enum TimerSource {
    /// A schedule entry: produces an EPG-derived timer or rule.
    Epg(EpgTag),
    /// A bare channel: produces a fixed-duration instant timer.
    Channel(Channel),
}

pub struct TimerEngine {
    registry: Arc<ClientRegistry>,
    playback: Arc<PlaybackTracker>,
    services: Services,
    config: Arc<Config>,
    events: CoreEventBus,
    reminders: Mutex<ReminderQueue>,
    /// Prevents stacked reminder prompts.
    announcing: AtomicBool,
    next_timer_id: AtomicU32,
}

impl TimerEngine {
    pub fn new(
        registry: Arc<ClientRegistry>,
        playback: Arc<PlaybackTracker>,
        services: Services,
        config: Arc<Config>,
        events: CoreEventBus,
    ) -> Self {
        Self {
            registry,
            playback,
            services,
            config,
            events,
            reminders: Mutex::new(ReminderQueue::new()),
            announcing: AtomicBool::new(false),
            next_timer_id: AtomicU32::new(1),
        }
    }

    /// Transient aggregate of every backend's timers plus the local
    /// reminders.
    pub fn timers(&self) -> Vec<Timer> {
        let mut all = Vec::new();
        let fanout = self.registry.for_each_created_client(|_, client| {
            client.timers().map(|timers| all.extend(timers))
        });
        if !fanout.no_clients() && !fanout.failed.is_empty() {
            warn!(failed = %fanout.summary(), "Some clients failed to report timers");
        }
        all.extend(self.reminders.lock().unwrap().snapshot());
        all
    }

    /// The timer attached to a schedule entry, if any (reminders count:
    /// an EPG event owns at most one timer slot).
    pub fn timer_for_epg_tag(&self, tag: &EpgTag) -> Option<Timer> {
        self.timers().into_iter().find(|timer| {
            timer.epg_tag.as_ref().is_some_and(|owned| {
                owned.event_id == tag.event_id
                    && owned.channel.channel_id == tag.channel.channel_id
                    && owned.channel.client_id == tag.channel.client_id
            })
        })
    }

    /// The rule that generated this one-shot instance, if any.
    pub fn timer_rule_for(&self, timer: &Timer) -> Option<Timer> {
        let parent = timer.parent_id?;
        self.timers().into_iter().find(|candidate| {
            candidate.is_rule()
                && candidate.timer_id == parent
                && candidate.client_id == timer.client_id
        })
    }

    /// True when a non-reminder timer is actively recording the channel.
    pub fn is_recording_on_channel(&self, channel: &Channel) -> bool {
        self.timers().iter().any(|timer| {
            !timer.reminder
                && timer.is_recording()
                && timer.channel.as_ref().is_some_and(|owned| {
                    owned.channel_id == channel.channel_id && owned.client_id == channel.client_id
                })
        })
    }

    /// Create a timer (or rule) from a schedule entry or a bare channel.
    ///
    /// Validation runs before any backend call: parental lock, duplicate
    /// timer for the same schedule entry, recordability. Gap entries
    /// degrade to instant timers. The backend stays the system of record —
    /// on rejection nothing is cached locally.
    pub fn add_timer(&self, source: &TimerSource, as_rule: bool) -> Result<()> {
        let (channel, mut tag) = match source {
            TimerSource::Epg(tag) => (tag.channel.clone(), Some(tag.clone())),
            TimerSource::Channel(channel) => (channel.clone(), None),
        };

        // For gap entries, only an instant timer makes sense.
        if tag.as_ref().is_some_and(|t| t.gap) {
            tag = None;
        }

        if tag.is_none() && as_rule {
            warn!("No schedule entry to derive a timer rule from");
            return Err(PvrError::NoEpgTag);
        }

        self.check_parental(&channel)?;

        if let Some(tag) = &tag {
            if self.timer_for_epg_tag(tag).is_some() {
                self.services.notifications.notify(
                    Severity::Info,
                    "There is already a timer set for this event",
                );
                return Err(PvrError::DuplicateTimer);
            }
            if !as_rule && !tag.recordable {
                self.services.notifications.notify(
                    Severity::Info,
                    "The PVR backend does not allow to record this event",
                );
                return Err(PvrError::NotRecordable);
            }
        }

        let timer = match &tag {
            Some(tag) => Timer::from_epg(tag, as_rule).ok_or_else(|| {
                self.services.notifications.notify(
                    Severity::Info,
                    "Timer creation failed. Unsupported timer type",
                );
                PvrError::UnsupportedTimerType
            })?,
            None => Timer::instant(&channel, self.config.get_instant_record_minutes()),
        };

        self.dispatch_new_timer(timer)
    }

    /// Queue a reminder for a schedule entry. Rejects when the entry
    /// already owns a timer of any kind.
    pub fn add_reminder(&self, tag: &EpgTag) -> Result<()> {
        if self.timer_for_epg_tag(tag).is_some() {
            self.services
                .notifications
                .notify(Severity::Info, "There is already a timer set for this event");
            return Err(PvrError::DuplicateTimer);
        }

        let reminder = Timer::reminder_from_epg(tag).ok_or_else(|| {
            self.services
                .notifications
                .notify(Severity::Info, "Timer creation failed. Unsupported timer type");
            PvrError::UnsupportedTimerType
        })?;

        self.check_parental(&tag.channel)?;
        self.queue_reminder(reminder);
        Ok(())
    }

    /// Apply `changes` to an existing timer.
    ///
    /// Same kind, type and owning client: an in-place update. Otherwise the
    /// original must be deleted before the replacement is created — a
    /// freshly created rule may immediately schedule the original's event
    /// again, and the other order would leave a duplicate behind. If the
    /// create fails after a successful delete, the original is recreated as
    /// a best-effort rollback.
    pub fn edit_timer(&self, timer: &Timer, changes: Timer) -> Result<()> {
        if timer.timer_type.read_only && !timer.timer_type.supports_enable_disable {
            debug!(timer = timer.timer_id, "Timer type is read-only, not editable");
            return Err(PvrError::UnsupportedTimerType);
        }

        let in_place = changes.kind == timer.kind
            && changes.timer_type == timer.timer_type
            && changes.client_id == timer.client_id;

        if in_place {
            return self.update_timer(&changes);
        }

        match self.delete_timer(timer, timer.is_recording(), false) {
            DeleteTimerResult::Ok => {}
            DeleteTimerResult::StillRecording => return Err(PvrError::Aborted),
            DeleteTimerResult::Failed => return Err(PvrError::DeleteFailed),
        }

        match self.dispatch_new_timer(changes) {
            Ok(()) => Ok(()),
            Err(create_err) => {
                warn!(error = %create_err, "Edit create failed after delete, rolling back");
                match self.dispatch_new_timer(timer.clone()) {
                    Ok(()) => Err(create_err),
                    Err(rollback_err) => {
                        // Actual data loss: the delete succeeded but neither
                        // the replacement nor the original could be created.
                        let lost = format!(
                            "'{}' could not be restored after a failed edit ({rollback_err})",
                            timer.title
                        );
                        error!(timer = timer.timer_id, error = %rollback_err,
                               "Timer lost: rollback create failed");
                        self.services
                            .notifications
                            .notify(Severity::Error, &format!("Timer lost: {lost}"));
                        Err(PvrError::TimerLost(lost))
                    }
                }
            }
        }
    }

    /// In-place update on the owning backend.
    pub fn update_timer(&self, timer: &Timer) -> Result<()> {
        if timer.reminder {
            self.reminders.lock().unwrap().replace(timer.clone());
            self.events.broadcast(CoreEvent::TimersChanged);
            return Ok(());
        }

        let Some(client) = self.registry.get_client(timer.client_id) else {
            self.notify_update_failed();
            return Err(PvrError::InvalidClient(timer.client_id));
        };
        match client.update_timer(timer) {
            Ok(()) => {
                info!(timer = timer.timer_id, client = %timer.client_id, "Updated timer");
                self.events.broadcast(CoreEvent::TimersChanged);
                Ok(())
            }
            Err(err) => {
                warn!(timer = timer.timer_id, error = %err, "Backend refused timer update");
                self.notify_update_failed();
                Err(PvrError::Backend(err))
            }
        }
    }

    /// Manual Disabled <-> Scheduled toggle.
    pub fn toggle_timer_state(&self, timer: &Timer) -> Result<()> {
        if !timer.timer_type.supports_enable_disable {
            return Err(PvrError::UnsupportedTimerType);
        }
        let mut changed = timer.clone();
        changed.state = if timer.state == pvrclient::TimerState::Disabled {
            pvrclient::TimerState::Scheduled
        } else {
            pvrclient::TimerState::Disabled
        };
        self.update_timer(&changed)
    }

    /// Delete a timer.
    ///
    /// `delete_rule` resolves a rule-generated instance to its parent rule
    /// first ("whole rule" was chosen). An actively recording timer is only
    /// deleted when `is_recording` confirms the stop; otherwise the caller
    /// gets `StillRecording` and must re-invoke with the confirmation.
    pub fn delete_timer(
        &self,
        timer: &Timer,
        is_recording: bool,
        delete_rule: bool,
    ) -> DeleteTimerResult {
        let target = if delete_rule && !timer.is_rule() {
            match self.timer_rule_for(timer) {
                Some(rule) => rule,
                None => {
                    warn!(timer = timer.timer_id, "No timer rule for this timer");
                    return DeleteTimerResult::Failed;
                }
            }
        } else {
            timer.clone()
        };

        if !target.timer_type.allows_delete {
            debug!(timer = target.timer_id, "Timer type does not allow deletion");
            return DeleteTimerResult::Failed;
        }

        if target.is_recording() && !is_recording {
            return DeleteTimerResult::StillRecording;
        }

        if target.reminder {
            self.remove_reminder(&target);
            return DeleteTimerResult::Ok;
        }

        let Some(client) = self.registry.get_client(target.client_id) else {
            self.notify_delete_failed();
            return DeleteTimerResult::Failed;
        };
        match client.delete_timer(&target, is_recording) {
            Ok(()) => {
                info!(timer = target.timer_id, client = %target.client_id, "Deleted timer");
                self.events.broadcast(CoreEvent::TimersChanged);
                DeleteTimerResult::Ok
            }
            Err(err) => {
                warn!(timer = target.timer_id, error = %err, "Backend refused timer deletion");
                self.notify_delete_failed();
                DeleteTimerResult::Failed
            }
        }
    }

    /// Delete the channel's timers; with `active_only`, just the ones
    /// actively recording.
    pub fn delete_timers_on_channel(&self, channel: &Channel, active_only: bool) -> Result<()> {
        let candidates: Vec<Timer> = self
            .timers()
            .into_iter()
            .filter(|timer| {
                !timer.reminder
                    && (!active_only || timer.is_recording())
                    && timer.channel.as_ref().is_some_and(|owned| {
                        owned.channel_id == channel.channel_id
                            && owned.client_id == channel.client_id
                    })
            })
            .collect();

        let mut failed = false;
        for timer in &candidates {
            if let Some(client) = self.registry.get_client(timer.client_id) {
                if let Err(err) = client.delete_timer(timer, true) {
                    warn!(timer = timer.timer_id, error = %err, "Failed to delete channel timer");
                    failed = true;
                }
            } else {
                failed = true;
            }
        }

        if failed {
            self.services
                .notifications
                .notify(Severity::Error, "Could not stop recording");
            return Err(PvrError::DeleteFailed);
        }
        if !candidates.is_empty() {
            self.events.broadcast(CoreEvent::TimersChanged);
        }
        Ok(())
    }

    /// Hand a validated new timer to its owning backend (or queue it
    /// locally for reminders).
    fn dispatch_new_timer(&self, timer: Timer) -> Result<()> {
        if timer.reminder {
            self.queue_reminder(timer);
            return Ok(());
        }

        let Some(client) = self.registry.get_client(timer.client_id) else {
            self.notify_save_failed();
            return Err(PvrError::InvalidClient(timer.client_id));
        };
        if !client.capabilities().supports_timers {
            self.services
                .notifications
                .notify(Severity::Info, "Timer creation failed. Unsupported timer type");
            return Err(PvrError::UnsupportedTimerType);
        }

        match client.add_timer(&timer) {
            Ok(()) => {
                info!(client = %timer.client_id, title = %timer.title, "Added timer");
                self.events.broadcast(CoreEvent::TimersChanged);
                Ok(())
            }
            Err(err) => {
                warn!(client = %timer.client_id, error = %err, "Backend refused new timer");
                self.notify_save_failed();
                Err(PvrError::Backend(err))
            }
        }
    }

    /// Parental gate: channels with the lock flag require a successful
    /// interactive verification before any backend call.
    fn check_parental(&self, channel: &Channel) -> Result<()> {
        if !channel.locked {
            return Ok(());
        }
        match self.services.parental.verify(channel) {
            ParentalCheckResult::Ok => Ok(()),
            ParentalCheckResult::Failed => {
                self.services
                    .notifications
                    .notify(Severity::Error, "Parental lock verification failed");
                Err(PvrError::ParentalLocked)
            }
            ParentalCheckResult::Canceled => Err(PvrError::Aborted),
        }
    }

    fn notify_save_failed(&self) {
        self.services
            .notifications
            .notify(Severity::Error, "Could not save the timer");
    }

    fn notify_update_failed(&self) {
        self.services
            .notifications
            .notify(Severity::Error, "Could not update the timer");
    }

    fn notify_delete_failed(&self) {
        self.services
            .notifications
            .notify(Severity::Error, "Could not delete the timer");
    }
}
