//! The reminder countdown protocol.
//!
//! Reminders are timers with no recording side effect. They live in a
//! start-time-ordered queue owned by the engine and are announced one at a
//! time: stacking interactive prompts is never allowed.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use pvrclient::Timer;

use crate::events::CoreEvent;
use crate::providers::{ReminderAnnouncement, ReminderChoice, Severity};

use super::TimerEngine;

/// Poll slice of the countdown loop, so the remaining-time display stays
/// smooth and an external answer interrupts promptly.
const COUNTDOWN_TIMESLICE_MS: i64 = 50;

/// Queue entry ordered by start time (earliest first through `Reverse`).
struct ByStart(Timer);

impl PartialEq for ByStart {
    fn eq(&self, other: &Self) -> bool {
        self.0.start == other.0.start && self.0.timer_id == other.0.timer_id
    }
}

impl Eq for ByStart {}

impl PartialOrd for ByStart {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByStart {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.0
            .start
            .cmp(&other.0.start)
            .then_with(|| self.0.timer_id.cmp(&other.0.timer_id))
    }
}

pub(super) struct ReminderQueue {
    heap: BinaryHeap<Reverse<ByStart>>,
}

impl ReminderQueue {
    pub(super) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    fn push(&mut self, reminder: Timer) {
        self.heap.push(Reverse(ByStart(reminder)));
    }

    /// Pop the earliest reminder whose start time has been reached.
    fn pop_due(&mut self, now: chrono::DateTime<Utc>) -> Option<Timer> {
        match self.heap.peek() {
            Some(Reverse(ByStart(timer))) if timer.start <= now => {
                self.heap.pop().map(|Reverse(ByStart(timer))| timer)
            }
            _ => None,
        }
    }

    fn remove(&mut self, timer_id: u32) -> bool {
        let before = self.heap.len();
        let entries: Vec<Reverse<ByStart>> = std::mem::take(&mut self.heap)
            .into_iter()
            .filter(|Reverse(ByStart(timer))| timer.timer_id != timer_id)
            .collect();
        self.heap = entries.into();
        before != self.heap.len()
    }

    pub(super) fn replace(&mut self, reminder: Timer) {
        self.remove(reminder.timer_id);
        self.push(reminder);
    }

    pub(super) fn snapshot(&self) -> Vec<Timer> {
        self.heap
            .iter()
            .map(|Reverse(ByStart(timer))| timer.clone())
            .collect()
    }
}

impl TimerEngine {
    /// Put a reminder into the announcement queue, assigning its local
    /// handle.
    pub(super) fn queue_reminder(&self, mut reminder: Timer) {
        if reminder.timer_id == 0 {
            reminder.timer_id = self.next_timer_id.fetch_add(1, Ordering::SeqCst);
        }
        debug!(timer = reminder.timer_id, title = %reminder.title, "Queued reminder");
        self.reminders.lock().unwrap().push(reminder);
        self.events.broadcast(CoreEvent::TimersChanged);
    }

    pub(super) fn remove_reminder(&self, reminder: &Timer) {
        let removed = self.reminders.lock().unwrap().remove(reminder.timer_id);
        if removed {
            debug!(timer = reminder.timer_id, "Removed reminder");
            self.events.broadcast(CoreEvent::TimersChanged);
        }
    }

    /// Queue a reminder on a bare channel for a fixed time window.
    pub fn add_manual_reminder(
        &self,
        channel: &pvrclient::Channel,
        start: chrono::DateTime<Utc>,
        duration_minutes: i64,
    ) -> crate::errors::Result<()> {
        self.check_parental(channel)?;
        self.queue_reminder(Timer::reminder_at(channel, start, duration_minutes));
        Ok(())
    }

    /// Local reminders, ordered by start time.
    pub fn reminders(&self) -> Vec<Timer> {
        let mut snapshot = self.reminders.lock().unwrap().snapshot();
        snapshot.sort_by_key(|timer| (timer.start, timer.timer_id));
        snapshot
    }

    /// Announce every due reminder, one at a time, until none remain.
    ///
    /// Never runs concurrently with itself: a second call while an
    /// announcement is showing returns immediately.
    pub fn announce_reminders(&self) {
        if self.announcing.swap(true, Ordering::SeqCst) {
            return;
        }

        while let Some(reminder) = {
            let mut queue = self.reminders.lock().unwrap();
            queue.pop_due(Utc::now())
        } {
            self.announce_reminder(&reminder);
        }

        self.announcing.store(false, Ordering::SeqCst);
    }

    fn announce_reminder(&self, reminder: &Timer) {
        let Some(channel) = reminder.channel.clone() else {
            warn!(timer = reminder.timer_id, "Reminder without channel, dropping");
            return;
        };

        if reminder.is_expired(Utc::now()) {
            // Too late to act on it. Log, don't prompt.
            info!(timer = reminder.timer_id, title = %reminder.title, "Deleted missed reminder");
            self.services.notifications.notify(
                Severity::Info,
                &format!("Deleted missed reminder: {}", reminder.title),
            );
            return;
        }

        if self.playback.is_playing_channel(&channel) {
            // Channel in question is already playing.
            debug!(timer = reminder.timer_id, "Reminder channel already playing, dropping");
            return;
        }

        let can_record = self
            .registry
            .get_client(reminder.client_id)
            .map(|client| client.capabilities().supports_timers)
            .unwrap_or(false);
        let auto_record = can_record && self.config.get_reminder_auto_record();
        let auto_switch = self.config.get_reminder_auto_switch();

        let prompt = &self.services.reminder_prompt;
        prompt.open(&ReminderAnnouncement {
            title: reminder.title.clone(),
            channel_name: channel.name.clone(),
            start: reminder.start,
            can_record,
            auto_record_armed: auto_record,
            auto_switch_armed: auto_switch,
        });
        self.events.broadcast(CoreEvent::ReminderAnnounced {
            timer_id: reminder.timer_id,
        });

        let wait_ms = self.config.get_reminder_auto_close_delay().max(0) * 1000;
        let mut remaining = wait_ms;
        let mut choice: Option<ReminderChoice> = None;
        let mut satisfied = false;

        while remaining > 0 {
            if let Some(answered) = prompt.poll_choice() {
                choice = Some(answered);
                break;
            }
            if self.playback.is_playing_channel(&channel) {
                // The channel started playing through some other path while
                // the countdown was showing: the switch is already done.
                satisfied = true;
                break;
            }
            thread::sleep(Duration::from_millis(COUNTDOWN_TIMESLICE_MS as u64));
            remaining -= COUNTDOWN_TIMESLICE_MS;
            prompt.update_progress((remaining.max(0) * 100 / wait_ms) as u32);
        }

        prompt.close();

        if satisfied {
            debug!(timer = reminder.timer_id, "Reminder satisfied externally");
            return;
        }

        let auto_closed = choice.is_none();
        let mut record = matches!(choice, Some(ReminderChoice::Record));
        let mut switch = matches!(choice, Some(ReminderChoice::Switch));
        if auto_closed {
            record = auto_record;
            switch = auto_switch;
        }

        if record && can_record {
            self.record_for_reminder(reminder, &channel, auto_closed);
        }

        if switch {
            match self.services.switcher.switch_to(&channel) {
                Ok(()) => {
                    if auto_closed {
                        self.services.notifications.notify(
                            Severity::Info,
                            &format!(
                                "Switched to channel for auto-closed reminder: {}",
                                reminder.title
                            ),
                        );
                    }
                }
                Err(err) => {
                    warn!(channel = %channel.name, error = %err,
                          "Failed to switch channel for reminder");
                }
            }
        }
    }

    /// Replace the reminder with a concrete recording timer for the same
    /// event or time window.
    fn record_for_reminder(
        &self,
        reminder: &Timer,
        channel: &pvrclient::Channel,
        auto_closed: bool,
    ) {
        let new_timer = match &reminder.epg_tag {
            Some(tag) => match Timer::from_epg(tag, false) {
                Some(timer) => {
                    // An EPG event owns a single timer slot: the reminder
                    // must go before the recording timer can be attached.
                    self.delete_timer(reminder, false, false);
                    Some(timer)
                }
                None => None,
            },
            None => Some(Timer::manual(
                channel,
                reminder.start,
                reminder.duration().num_minutes(),
            )),
        };

        let Some(new_timer) = new_timer else {
            warn!(timer = reminder.timer_id, "Could not derive a recording timer from reminder");
            return;
        };

        if self.dispatch_new_timer(new_timer).is_ok() && auto_closed {
            self.services.notifications.notify(
                Severity::Info,
                &format!(
                    "Scheduled recording for auto-closed reminder: {}",
                    reminder.title
                ),
            );
        }
    }
}
