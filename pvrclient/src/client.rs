//! The contract between the orchestration core and one backend worker.

use std::fmt::Debug;

use thiserror::Error;

use crate::ClientId;
use crate::capabilities::ClientCapabilities;
use crate::model::{Channel, Recording};
use crate::timer::Timer;

/// Errors reported by backend client operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The backend does not implement the operation. This is capability
    /// absence, not failure: fan-out aggregation treats it as success.
    #[error("operation not implemented by backend")]
    NotImplemented,

    /// The backend understood the request and refused it.
    #[error("backend rejected the operation: {0}")]
    Rejected(String),

    /// The backend is unreachable or failed internally.
    #[error("backend error: {0}")]
    ServerError(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Outcome of a backend create call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateStatus {
    Ok,
    /// The backend could not start this time; a later lifecycle event
    /// (re-enable, addon update) may retry.
    TransientFailure,
    /// The backend can never start in its current installation state.
    /// The registry disables it and stops retrying.
    PermanentFailure,
}

/// Lifecycle status of a registered client handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleStatus {
    /// Known to the registry but not (yet) brought up.
    NotCreated,
    /// Backend is up and usable.
    Created,
    /// Backend has been torn down.
    Destroyed,
}

/// One backend worker, held by the registry as `Arc<dyn PvrClient>`.
///
/// The backend is the system of record for its own timers: the engine
/// never caches what a client returns here beyond a single operation.
pub trait PvrClient: Send + Sync + Debug {
    fn client_id(&self) -> ClientId;

    /// Human-readable backend name.
    fn name(&self) -> &str;

    fn capabilities(&self) -> ClientCapabilities;

    /// Bring the backend up. The registry calls this outside its map lock,
    /// so the implementation may block on I/O.
    fn create(&self) -> CreateStatus;

    /// Tear the backend down. Must be idempotent.
    fn destroy(&self);

    /// Snapshot of the timers this backend currently holds.
    fn timers(&self) -> ClientResult<Vec<Timer>>;

    fn add_timer(&self, timer: &Timer) -> ClientResult<()>;

    fn update_timer(&self, timer: &Timer) -> ClientResult<()>;

    /// Delete a timer. `force` confirms deletion of a timer that is
    /// actively recording.
    fn delete_timer(&self, timer: &Timer, force: bool) -> ClientResult<()>;

    fn channels(&self) -> ClientResult<Vec<Channel>> {
        Err(ClientError::NotImplemented)
    }

    fn recordings(&self) -> ClientResult<Vec<Recording>> {
        Err(ClientError::NotImplemented)
    }

    fn start_channel_scan(&self) -> ClientResult<()> {
        Err(ClientError::NotImplemented)
    }
}
