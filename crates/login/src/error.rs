//! Login bridge error types.

use crate::session::{LoginState, Stage};

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("cannot {action} while {state}")]
    InvalidState {
        state: LoginState,
        action: &'static str,
    },

    #[error("a login attempt is already in progress")]
    InProgress,

    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("timed out waiting for {0}")]
    Timeout(Stage),

    #[error("login tool exited while waiting for {0}")]
    ToolExited(Stage),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
