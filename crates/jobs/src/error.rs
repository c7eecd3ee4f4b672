//! Registry error types.

/// Errors returned by [`JobRegistry`](crate::JobRegistry) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobsError {
    #[error("a job is already running for {0}")]
    Conflict(String),

    #[error("no job for {0}")]
    NotFound(String),
}
