//! Error types for the runtime system

use super::session::Endpoint;
use crate::nodes::LineId;

/// Error type for session open operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpenError {
    #[error("Endpoint '{0}' is already open")]
    AlreadyOpen(Endpoint),

    #[error("Light pen is shutting down")]
    ShutDown,
}

/// Error type for read operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// Non-blocking read with no pending sample. Expected control flow.
    #[error("No sample pending")]
    WouldBlock,

    /// The session or the whole device was torn down while reading.
    #[error("Session closed")]
    Closed,

    #[error("Buffer too small: record needs {needed} bytes, {available} available")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Error type for startup configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid line {line} for {role}")]
    InvalidLine { role: &'static str, line: LineId },

    #[error("Line {line} assigned to both {first} and {second}")]
    DuplicateLine {
        line: LineId,
        first: &'static str,
        second: &'static str,
    },

    #[error("Line length must be non-zero")]
    ZeroLineLength,
}

/// Error type for edge clock backends
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    #[error("Line {0} is not a valid input")]
    InvalidLine(LineId),

    #[error("Line {0} already has an edge subscriber")]
    AlreadySubscribed(LineId),
}

/// Result type for read operations
pub type ReadResult<T> = Result<T, ReadError>;
