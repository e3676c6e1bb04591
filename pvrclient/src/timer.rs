//! Timer value type and its factories.
//!
//! A timer is either a concrete one-shot recording, a recurring rule that
//! schedules one-shot instances on its backend, or a reminder (a timer
//! with no recording side effect). Timers are created through the
//! factories below; the engine never assembles one field by field.

use chrono::{DateTime, Duration, Utc};

use crate::ClientId;
use crate::model::{Channel, EpgTag};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    OneShot,
    Rule,
}

/// Timer life cycle. `Scheduled -> Recording -> Completed` for recordings;
/// reminders never enter `Recording`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Scheduled,
    Recording,
    Completed,
    Disabled,
    Error,
    Conflict,
}

/// Static attributes of a timer type.
///
/// Backends may expose read-only rule types whose instances cannot be
/// deleted piecemeal; the engine enforces that through these flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerType {
    pub read_only: bool,
    pub allows_delete: bool,
    pub supports_enable_disable: bool,
    pub epg_based: bool,
}

impl TimerType {
    /// Manual fixed-window timer on a bare channel.
    pub const MANUAL: TimerType = TimerType {
        read_only: false,
        allows_delete: true,
        supports_enable_disable: true,
        epg_based: false,
    };

    /// Timer derived from one EPG entry (one-shot or rule).
    pub const EPG: TimerType = TimerType {
        read_only: false,
        allows_delete: true,
        supports_enable_disable: true,
        epg_based: true,
    };

    /// Reminder. Local to this process, never dispatched to a backend.
    pub const REMINDER: TimerType = TimerType {
        read_only: false,
        allows_delete: true,
        supports_enable_disable: false,
        epg_based: true,
    };
}

#[derive(Clone, Debug, PartialEq)]
pub struct Timer {
    /// Local handle, unique within the engine. 0 = not yet assigned.
    pub timer_id: u32,
    pub client_id: ClientId,
    pub kind: TimerKind,
    pub timer_type: TimerType,
    pub title: String,
    /// Absent only for EPG-based rules that match channels dynamically.
    pub channel: Option<Channel>,
    /// Originating schedule entry, when derived from the EPG.
    pub epg_tag: Option<EpgTag>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub state: TimerState,
    /// A reminder only notifies. It never records.
    pub reminder: bool,
    /// Local id of the rule that generated this one-shot instance.
    pub parent_id: Option<u32>,
}

impl Timer {
    /// Recording timer (or rule) for an EPG entry.
    ///
    /// Returns `None` for gap entries; only instant timers can cover a gap.
    pub fn from_epg(tag: &EpgTag, as_rule: bool) -> Option<Timer> {
        if tag.gap {
            return None;
        }
        Some(Timer {
            timer_id: 0,
            client_id: tag.channel.client_id,
            kind: if as_rule {
                TimerKind::Rule
            } else {
                TimerKind::OneShot
            },
            timer_type: TimerType::EPG,
            title: tag.title.clone(),
            channel: Some(tag.channel.clone()),
            epg_tag: Some(tag.clone()),
            start: tag.start,
            end: tag.end,
            state: TimerState::Scheduled,
            reminder: false,
            parent_id: None,
        })
    }

    /// Fixed-duration timer starting now.
    pub fn instant(channel: &Channel, duration_minutes: i64) -> Timer {
        Self::manual(channel, Utc::now(), duration_minutes)
    }

    /// Fixed-window timer on a bare channel.
    pub fn manual(channel: &Channel, start: DateTime<Utc>, duration_minutes: i64) -> Timer {
        Timer {
            timer_id: 0,
            client_id: channel.client_id,
            kind: TimerKind::OneShot,
            timer_type: TimerType::MANUAL,
            title: channel.name.clone(),
            channel: Some(channel.clone()),
            epg_tag: None,
            start,
            end: start + Duration::minutes(duration_minutes),
            state: TimerState::Scheduled,
            reminder: false,
            parent_id: None,
        }
    }

    /// Reminder for an EPG entry. `None` for gap entries.
    pub fn reminder_from_epg(tag: &EpgTag) -> Option<Timer> {
        if tag.gap {
            return None;
        }
        Some(Timer {
            timer_id: 0,
            client_id: tag.channel.client_id,
            kind: TimerKind::OneShot,
            timer_type: TimerType::REMINDER,
            title: tag.title.clone(),
            channel: Some(tag.channel.clone()),
            epg_tag: Some(tag.clone()),
            start: tag.start,
            end: tag.end,
            state: TimerState::Scheduled,
            reminder: true,
            parent_id: None,
        })
    }

    /// Reminder on a bare channel for a fixed window.
    pub fn reminder_at(channel: &Channel, start: DateTime<Utc>, duration_minutes: i64) -> Timer {
        let mut timer = Self::manual(channel, start, duration_minutes);
        timer.timer_type = TimerType::REMINDER;
        timer.reminder = true;
        timer
    }

    pub fn is_rule(&self) -> bool {
        self.kind == TimerKind::Rule
    }

    pub fn is_recording(&self) -> bool {
        self.state == TimerState::Recording
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end < now
    }

    /// True for a one-shot instance generated by a rule.
    pub fn is_owned_by_rule(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}
