//! Narrow interfaces to the external collaborators this core consumes.
//!
//! EPG data, channel groups, persistence, dialogs and the playback pipeline
//! are owned elsewhere in the host application; the core only ever talks to
//! them through these traits. Hosts inject implementations at construction
//! time.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};

use pvrclient::{Channel, ChannelGroup, EpgTag};

/// Read access to the EPG.
pub trait EpgProvider: Send + Sync {
    /// Event currently airing on the channel.
    fn now_on(&self, channel: &Channel) -> Option<EpgTag>;

    /// Event airing right after the current one.
    fn next_on(&self, channel: &Channel) -> Option<EpgTag>;
}

/// Channel-group membership lookups.
pub trait GroupProvider: Send + Sync {
    /// Groups containing the channel, in group list order.
    fn groups_for_channel(&self, channel: &Channel) -> Vec<ChannelGroup>;
}

/// Synchronous persistence of "last watched" timestamps.
pub trait LastWatchedStore: Send + Sync {
    fn set_channel_last_watched(&self, channel: &Channel, when: DateTime<Utc>) -> Result<()>;

    fn set_group_last_watched(&self, group: &ChannelGroup, when: DateTime<Utc>) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentalCheckResult {
    Ok,
    Failed,
    Canceled,
}

/// Interactive parental lock verification (PIN prompt or equivalent).
/// Only consulted for channels whose lock flag is set.
pub trait ParentalGuard: Send + Sync {
    fn verify(&self, channel: &Channel) -> ParentalCheckResult;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// User-visible message sink (toasts, event log, ...).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, severity: Severity, message: &str);
}

/// One reminder announcement as presented to the user.
#[derive(Clone, Debug)]
pub struct ReminderAnnouncement {
    pub title: String,
    pub channel_name: String,
    pub start: DateTime<Utc>,
    /// Whether the "record" choice is offered.
    pub can_record: bool,
    /// Armed auto-close actions, for display purposes.
    pub auto_record_armed: bool,
    pub auto_switch_armed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReminderChoice {
    Switch,
    Record,
    Dismiss,
}

/// Modal countdown prompt driven by the reminder protocol.
///
/// The engine polls `poll_choice` in small time slices and keeps the
/// remaining-time display fresh through `update_progress`; the prompt
/// itself never blocks.
pub trait ReminderPrompt: Send + Sync {
    fn open(&self, announcement: &ReminderAnnouncement);

    /// The user's choice, once made.
    fn poll_choice(&self) -> Option<ReminderChoice>;

    /// Remaining time as a percentage of the configured delay.
    fn update_progress(&self, percent: u32);

    fn close(&self);
}

/// One selectable entry of the instant-recording dialog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstantRecordOption {
    /// Record the next N minutes.
    FixedMinutes(i64),
    /// Record the current show (title attached).
    CurrentShow(String),
    /// Record the next show (title attached).
    NextShow(String),
}

/// Selection dialog backing the "ask" instant-recording policy.
pub trait InstantRecordPrompt: Send + Sync {
    /// Index of the chosen option, or `None` when the dialog was canceled.
    fn select(&self, options: &[InstantRecordOption], preselect: usize) -> Option<usize>;
}

/// Narrow switching surface of the playback pipeline.
pub trait ChannelSwitcher: Send + Sync {
    fn switch_to(&self, channel: &Channel) -> Result<()>;
}

/// Read-through into the playback pipeline's time bookkeeping.
pub trait PlaybackClock: Send + Sync {
    /// Wall-clock start of the current playback, if known.
    fn start_time(&self) -> Option<DateTime<Utc>>;

    /// Time elapsed since playback start.
    fn elapsed(&self) -> Duration;
}
