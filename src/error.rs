//! Error types for the session server.
//!
//! Handler errors never reach the client verbatim: the dispatcher logs them
//! and flattens every failure into `ErrorCode::SessionFailure` with output id 0.

use crate::session::SessionId;
use thiserror::Error;

/// Failures raised by the table, the handlers and the dispatch worker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("CreateSession throttled: {elapsed}s since last attempt, minimum is {min_interval}s")]
    Throttled { elapsed: u64, min_interval: u64 },

    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Session id is already in use: {0}")]
    DuplicateId(SessionId),

    #[error("Session id 0 is reserved")]
    InvalidId,

    #[error("Session table is full ({0} entries)")]
    TableFull(usize),

    #[error("Session table is full but has no oldest entry")]
    CapacityInvariant,

    #[error("Cannot allocate new session")]
    AllocationFailed,

    #[error("Conversion engine is not initialized")]
    EngineUnavailable,

    #[error("SetConfig requires a config")]
    MissingConfig,

    #[error("Config store error: {0}")]
    ConfigStore(String),

    #[error("Unknown command kind")]
    UnknownCommand,

    #[error("Dispatch worker is busy")]
    Busy,

    #[error("Dispatch worker channel closed")]
    WorkerClosed,
}

impl<T> From<std::sync::mpsc::SendError<T>> for SessionError {
    fn from(_: std::sync::mpsc::SendError<T>) -> Self {
        SessionError::WorkerClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for SessionError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        SessionError::WorkerClosed
    }
}
