//! Backend client abstraction for PVRCore.
//!
//! A *client* is one backend worker (a tuner driver, a DVR backend, ...)
//! loaded into the host application. This crate defines the contract every
//! backend implements ([`PvrClient`]), the capability flags it reports, and
//! the value types shared by the orchestration layer: channels, channel
//! groups, EPG entries, recordings and timers.
//!
//! The orchestration core itself lives in `pvrcontrol`; backends never
//! depend on it.

pub mod capabilities;
pub mod client;
pub mod model;
pub mod timer;

use std::fmt;

pub use capabilities::ClientCapabilities;
pub use client::{ClientError, ClientResult, CreateStatus, LifecycleStatus, PvrClient};
pub use model::{Channel, ChannelGroup, EpgTag, Recording};
pub use timer::{Timer, TimerKind, TimerState, TimerType};

/// Stable numeric identifier of one backend client.
///
/// Ids are derived deterministically from the backend addon identifier and
/// stay stable for as long as the addon is installed. Any value `<= 0` is
/// reserved as the "no client" sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub i32);

impl ClientId {
    /// Sentinel for "no client".
    pub const INVALID: ClientId = ClientId(-1);

    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }

    /// Derive the stable id for a backend addon identifier.
    ///
    /// One-way hash (djb2 xor variant) masked to the positive `i32` range;
    /// 0 maps to 1 so the result is always a valid id.
    pub fn from_addon_id(addon_id: &str) -> ClientId {
        let mut hash: u32 = 5381;
        for byte in addon_id.bytes() {
            hash = hash.wrapping_mul(33) ^ u32::from(byte);
        }
        let id = (hash & 0x7fff_ffff) as i32;
        ClientId(if id == 0 { 1 } else { id })
    }

    /// Next id in the positive range, wrapping before the sentinel values.
    ///
    /// Used by the registry to probe past hash collisions.
    pub fn probe_next(&self) -> ClientId {
        if self.0 >= i32::MAX {
            ClientId(1)
        } else {
            ClientId(self.0 + 1)
        }
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
