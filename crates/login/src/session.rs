//! Login session states.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoginState {
    #[default]
    Unauthenticated,
    /// The tool is waiting for a second-factor code.
    AwaitingSecondFactor,
    /// Terminal until [`reset`](crate::LoginBridge::reset).
    Authenticated,
    /// The last attempt failed; credentials may be submitted again.
    Failed,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoginState::Unauthenticated => "unauthenticated",
            LoginState::AwaitingSecondFactor => "awaiting second factor",
            LoginState::Authenticated => "authenticated",
            LoginState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Point in the conversation with the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Username,
    Password,
    Challenge,
    Code,
    Exit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Username => "username prompt",
            Stage::Password => "password prompt",
            Stage::Challenge => "second-factor prompt",
            Stage::Code => "code verification",
            Stage::Exit => "tool exit",
        };
        f.write_str(s)
    }
}

/// Observer-facing view of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginStatus {
    pub state: LoginState,
    /// Whether the tool's cookie file exists.
    pub has_credentials: bool,
    pub last_error: Option<String>,
    /// Tool output from the most recent attempt.
    pub last_output: String,
}
