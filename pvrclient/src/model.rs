//! Value types shared between backends and the orchestration core.

use chrono::{DateTime, Utc};

use crate::ClientId;

/// A channel as exposed by its owning backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Channel {
    /// Unique within the owning client.
    pub channel_id: u32,
    pub client_id: ClientId,
    pub name: String,
    pub is_radio: bool,
    /// Parental lock flag as resolved by the channel provider.
    pub locked: bool,
}

/// A channel group. Membership is resolved by the group provider, not
/// stored here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelGroup {
    pub group_id: u32,
    pub name: String,
    pub is_radio: bool,
}

/// One EPG schedule entry, resolved by the EPG provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpgTag {
    /// Unique within the owning channel's schedule.
    pub event_id: u32,
    pub channel: Channel,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// False when the backend forbids recording this event.
    pub recordable: bool,
    /// True for filler entries representing a gap in the schedule.
    pub gap: bool,
}

impl EpgTag {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// How far this event has progressed at `now`, in percent (0..=100).
    pub fn progress_percentage(&self, now: DateTime<Utc>) -> f64 {
        let total = (self.end - self.start).num_seconds();
        if total <= 0 {
            return 0.0;
        }
        let elapsed = (now - self.start).num_seconds().clamp(0, total);
        elapsed as f64 * 100.0 / total as f64
    }
}

/// A finished recording held by a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recording {
    /// Backend-assigned identifier.
    pub recording_id: String,
    pub client_id: ClientId,
    pub title: String,
}
