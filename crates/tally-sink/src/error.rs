//! Error types for sink writes.

use thiserror::Error;

/// Result type alias for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Both variants are "not ready": the write had no effect and may be
/// retried once the sink signals readiness again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink not ready: rejecting phase")]
    Rejecting,

    #[error("sink not ready: shut down")]
    ShutDown,
}
