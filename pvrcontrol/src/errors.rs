use thiserror::Error;

use pvrclient::{ClientError, ClientId};

/// Error taxonomy of the orchestration core.
///
/// Validation errors are detected before any backend call and are never
/// logged as backend faults. Backend errors come from the owning client.
/// `TimerLost` flags actual data loss (a rollback that also failed) and is
/// logged at error severity, distinctly from an ordinary failed attempt.
#[derive(Error, Debug, PartialEq)]
pub enum PvrError {
    // Validation
    #[error("there is already a timer set for this event")]
    DuplicateTimer,

    #[error("parental lock check failed")]
    ParentalLocked,

    #[error("timer creation failed: unsupported timer type")]
    UnsupportedTimerType,

    #[error("no channel given")]
    NoChannel,

    #[error("no EPG entry given")]
    NoEpgTag,

    #[error("the backend does not allow recording this event")]
    NotRecordable,

    #[error("this timer type cannot be deleted")]
    TimerNotDeletable,

    // Interactive flows
    #[error("operation canceled")]
    Aborted,

    #[error("could not delete the timer")]
    DeleteFailed,

    // Backend
    #[error("no usable client with id {0}")]
    InvalidClient(ClientId),

    #[error(transparent)]
    Backend(#[from] ClientError),

    // Consistency hazard
    #[error("timer lost: {0}")]
    TimerLost(String),
}

pub type Result<T> = std::result::Result<T, PvrError>;

/// Three-way outcome of a timer deletion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteTimerResult {
    Ok,
    /// The timer is actively recording. Re-invoke with the explicit stop
    /// confirmation before the delete is honored.
    StillRecording,
    Failed,
}
