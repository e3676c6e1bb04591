/// Capability flags reported by a backend client.
///
/// The orchestration layer never asks a backend whether it supports an
/// operation at call time; it filters on this value instead. A capability
/// that is absent makes the matching operations return
/// [`ClientError::NotImplemented`](crate::ClientError::NotImplemented),
/// which the fan-out executor counts as success.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientCapabilities {
    pub supports_timers: bool,
    pub supports_recordings: bool,
    pub supports_epg: bool,
    pub supports_channel_scan: bool,
    pub supports_channel_settings: bool,
    pub supports_providers: bool,
}

impl ClientCapabilities {
    /// Capabilities of a playback-only backend (no scheduling surface).
    pub fn playback_only() -> Self {
        Self::default()
    }

    /// True when the backend can hold recording timers at all.
    pub fn can_schedule(&self) -> bool {
        self.supports_timers
    }
}
