//! Error taxonomy (spec §7).
//!
//! Each variant maps to a propagation policy: transient classes are retried
//! locally by the caller with bounded backoff; calculation failures are
//! surfaced through the calculation row rather than the process exit code;
//! configuration and dependency errors abort the current operation.

use thiserror::Error;

pub type MaceResult<T> = Result<T, MaceError>;

#[derive(Debug, Error)]
pub enum MaceError {
    /// Missing or invalid plan / rule file / environment. Aborts the CLI
    /// action and is surfaced to the user with a recovery hint.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing required file, permission denied, integrity mismatch.
    /// Retried with bounded backoff for transient cases; terminal for
    /// missing outputs after solver completion.
    #[error("file operation error: {0}")]
    FileOperation(String),

    /// Scheduler submit rejected. Retried at the queue-manager level with
    /// bounded attempts; never mutates the calculation beyond the attempt
    /// counter.
    #[error("job submission error: {0}")]
    JobSubmission(String),

    /// Solver-reported failure, further subdivided by the classifier.
    #[error("calculation error ({kind}): {message}")]
    Calculation { kind: String, message: String },

    /// Attempt to emit a step whose parents are not all completed. Always
    /// a programming error — surfaced loudly.
    #[error("dependency error: {0}")]
    Dependency(String),

    /// Connection, lock, or integrity error from the persistent store.
    #[error("database error: {0}")]
    Database(String),

    /// Any external invocation exceeded its bound.
    #[error("timeout error: {0}")]
    Timeout(String),
}

impl From<sqlx::Error> for MaceError {
    fn from(e: sqlx::Error) -> Self {
        MaceError::Database(e.to_string())
    }
}

impl From<std::io::Error> for MaceError {
    fn from(e: std::io::Error) -> Self {
        MaceError::FileOperation(e.to_string())
    }
}

impl From<serde_json::Error> for MaceError {
    fn from(e: serde_json::Error) -> Self {
        MaceError::Configuration(e.to_string())
    }
}
