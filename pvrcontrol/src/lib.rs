//! Orchestration core of PVRCore.
//!
//! Three tightly coupled components, constructed once at startup and passed
//! by handle to everything that needs them (no ambient global lookup):
//!
//! - [`ClientRegistry`] : single source of truth for which backend workers
//!   exist and are usable, plus the fan-out executor that invokes an
//!   operation across all of them with isolated per-client failure.
//! - [`PlaybackTracker`] : the single "currently playing" slot and its
//!   last-watched bookkeeping.
//! - [`TimerEngine`] : timer/rule CRUD with conflict-aware deletion and
//!   edit rollback, plus the reminder countdown protocol.
//!
//! The core is a passive library: it runs on whatever threads the host
//! application uses and talks to the outside world only through the narrow
//! collaborator traits in [`providers`].

pub mod deferred;
pub mod errors;
pub mod events;
pub mod playback;
pub mod providers;
pub mod registry;
pub mod timers;

pub use deferred::DeferredCall;
pub use errors::{DeleteTimerResult, PvrError};
pub use events::{CoreEvent, CoreEventBus};
pub use playback::{PlaybackTracker, PlayingItem};
pub use providers::{
    ChannelSwitcher, EpgProvider, GroupProvider, InstantRecordOption, InstantRecordPrompt,
    LastWatchedStore, NotificationSink, ParentalCheckResult, ParentalGuard, PlaybackClock,
    ReminderAnnouncement, ReminderChoice, ReminderPrompt, Severity,
};
pub use registry::{AddonEvent, ClientFactory, ClientRegistry, Fanout};
pub use timers::{Services, TimerEngine, TimerSource};
