//! Error types for the prompting engine.

/// Top-level error type for the task prompting system.
#[derive(Debug, thiserror::Error)]
pub enum NudgeError {
    /// Configuration could not be loaded, saved, or validated.
    #[error("config error: {0}")]
    Config(String),

    /// A task referenced by the caller does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Task store read failure.
    #[error("task store error: {0}")]
    TaskStore(String),

    /// Prompt event log load/save failure.
    #[error("event log error: {0}")]
    EventLog(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Malformed host command or payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NudgeError>;
