//! Supervisor errors.
//!
//! These never escape [`start`](crate::start): they are written into the
//! job's output buffer and end the job as `Failed`.

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("child {0} pipe was not captured")]
    MissingPipe(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
