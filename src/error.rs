//! Error types for the event poller.

use std::time::Duration;
use thiserror::Error;

/// Main error type for poller operations.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Invalid listener: {0}")]
    InvalidListener(String),

    #[error("Invalid poller configuration: {0}")]
    InvalidConfig(String),

    #[error("Event source error: {0}")]
    Source(#[from] SourceError),

    #[error("Failed to start poller thread: {0}")]
    Scheduler(#[from] std::io::Error),

    #[error("Executor unavailable: {0}")]
    ExecutorUnavailable(String),
}

/// Failure reported by an [`EventSource`](crate::source::EventSource) query.
///
/// All variants are treated as transient by the poller.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed event: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Decode(e.to_string())
    }
}

/// Result type for poller operations.
pub type Result<T> = std::result::Result<T, PollError>;
