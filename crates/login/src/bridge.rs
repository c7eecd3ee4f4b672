//! The login state machine.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use gogrepo_tool::{CommandSpec, Tool};
use portable_pty::ExitStatus;
use tracing::{info, warn};

use crate::error::LoginError;
use crate::expect::{Interaction, Matched};
use crate::prompts::LoginPrompts;
use crate::session::{LoginState, LoginStatus, Stage};

/// Cookie jar gogrepo writes after a successful login.
pub const COOKIES_FILE: &str = "gog-cookies.dat";

/// How long each step may wait for the tool.
#[derive(Debug, Clone)]
pub struct LoginTimeouts {
    /// Username and password prompts.
    pub prompt: Duration,
    /// Second-factor prompt after the password, and the verdict after a code.
    pub second_factor: Duration,
    /// Exit after output has ended.
    pub exit: Duration,
}

impl Default for LoginTimeouts {
    fn default() -> Self {
        Self {
            prompt: Duration::from_secs(120),
            second_factor: Duration::from_secs(240),
            exit: Duration::from_secs(10),
        }
    }
}

enum Outcome {
    Challenge,
    Rejected,
    Exited(ExitStatus),
}

#[derive(Default)]
struct Record {
    state: LoginState,
    last_error: Option<String>,
    last_output: String,
}

/// Drives `gogrepo login` through username, password and an optional
/// second factor.
///
/// Credentials are only held for the duration of one call. Between the
/// two steps the only retained state is the waiting tool process.
pub struct LoginBridge {
    command: CommandSpec,
    cookie_path: PathBuf,
    prompts: LoginPrompts,
    timeouts: LoginTimeouts,
    /// The tool waiting for a second-factor code. Also serializes attempts.
    pending: tokio::sync::Mutex<Option<Interaction>>,
    record: Mutex<Record>,
}

impl LoginBridge {
    pub fn new(tool: &Tool) -> Self {
        Self {
            command: tool.login(),
            cookie_path: tool.data_dir().join(COOKIES_FILE),
            prompts: LoginPrompts::default(),
            timeouts: LoginTimeouts::default(),
            pending: tokio::sync::Mutex::new(None),
            record: Mutex::new(Record::default()),
        }
    }

    pub fn with_prompts(mut self, prompts: LoginPrompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_timeouts(mut self, timeouts: LoginTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn cookie_path(&self) -> &Path {
        &self.cookie_path
    }

    /// Whether gogrepo has stored session cookies.
    pub fn has_credentials(&self) -> bool {
        self.cookie_path.is_file()
    }

    pub fn state(&self) -> LoginState {
        self.lock_record().state
    }

    pub fn status(&self) -> LoginStatus {
        let record = self.lock_record();
        LoginStatus {
            state: record.state,
            has_credentials: self.has_credentials(),
            last_error: record.last_error.clone(),
            last_output: record.last_output.clone(),
        }
    }

    /// Starts a login attempt with a username and password.
    ///
    /// Returns the resulting state: `AwaitingSecondFactor` when the tool
    /// asks for a code, `Authenticated` when it exits successfully without
    /// one, `Failed` when it rejects the credentials.
    pub async fn submit_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginState, LoginError> {
        let mut pending = self.pending.try_lock().map_err(|_| LoginError::InProgress)?;
        let state = self.state();
        if !matches!(state, LoginState::Unauthenticated | LoginState::Failed) {
            return Err(LoginError::InvalidState {
                state,
                action: "submit credentials",
            });
        }
        {
            let mut record = self.lock_record();
            record.last_error = None;
            record.last_output.clear();
        }
        info!(program = %self.command.program, "login started");

        let mut child = match Interaction::spawn(&self.command) {
            Ok(child) => child,
            Err(e) => {
                self.fail(e.to_string(), String::new());
                return Err(e);
            }
        };

        match self.converse(&mut child, username, password).await {
            Ok(Outcome::Challenge) => {
                self.transition(LoginState::AwaitingSecondFactor, &child.transcript());
                info!("second factor requested");
                *pending = Some(child);
            }
            Ok(outcome) => {
                self.conclude(outcome, child).await;
            }
            Err(e) => {
                self.fail(e.to_string(), child.transcript());
                child.kill().await;
                return Err(e);
            }
        }
        Ok(self.state())
    }

    /// Sends the second-factor code to the waiting tool.
    pub async fn submit_code(&self, code: &str) -> Result<LoginState, LoginError> {
        let mut pending = self.pending.try_lock().map_err(|_| LoginError::InProgress)?;
        let state = self.state();
        let Some(mut child) = pending.take().filter(|_| state == LoginState::AwaitingSecondFactor)
        else {
            return Err(LoginError::InvalidState {
                state,
                action: "submit a code",
            });
        };

        let result = async {
            child.send_line(code.trim()).await?;
            self.await_verdict(&mut child, Stage::Code).await
        }
        .await;
        match result {
            Ok(outcome) => self.conclude(outcome, child).await,
            Err(e) => {
                self.fail(e.to_string(), child.transcript());
                child.kill().await;
                return Err(e);
            }
        }
        Ok(self.state())
    }

    /// Abandons any attempt and returns to `Unauthenticated`.
    pub async fn reset(&self) {
        let mut pending = self.pending.lock().await;
        if let Some(child) = pending.take() {
            child.kill().await;
        }
        *self.lock_record() = Record::default();
        info!("login reset");
    }

    async fn converse(
        &self,
        child: &mut Interaction,
        username: &str,
        password: &str,
    ) -> Result<Outcome, LoginError> {
        let wait = self.timeouts.prompt;
        if child.expect(&self.prompts.username, Stage::Username, wait).await? == Matched::Eof {
            return Err(LoginError::ToolExited(Stage::Username));
        }
        child.send_line(username.trim()).await?;
        if child.expect(&self.prompts.password, Stage::Password, wait).await? == Matched::Eof {
            return Err(LoginError::ToolExited(Stage::Password));
        }
        child.send_secret(password).await?;
        self.await_verdict(child, Stage::Challenge).await
    }

    /// Waits for a second-factor prompt, a failure message, or exit. After
    /// a code has been sent, a repeated prompt means the code was refused.
    async fn await_verdict(
        &self,
        child: &mut Interaction,
        stage: Stage,
    ) -> Result<Outcome, LoginError> {
        let challenges = self.prompts.second_factor.len();
        let mut patterns = self.prompts.second_factor.clone();
        patterns.extend(self.prompts.failure.iter().cloned());

        match child.expect(&patterns, stage, self.timeouts.second_factor).await? {
            Matched::Pattern(i) if i < challenges && stage == Stage::Challenge => {
                Ok(Outcome::Challenge)
            }
            Matched::Pattern(_) => Ok(Outcome::Rejected),
            Matched::Eof => Ok(Outcome::Exited(child.wait(self.timeouts.exit).await?)),
        }
    }

    async fn conclude(&self, outcome: Outcome, child: Interaction) {
        let transcript = child.transcript();
        child.kill().await;
        match outcome {
            Outcome::Exited(status) if status.success() => {
                self.transition(LoginState::Authenticated, &transcript);
                info!("login succeeded");
            }
            Outcome::Exited(status) => {
                self.fail(
                    format!("login tool exited with code {}", status.exit_code()),
                    transcript,
                );
            }
            Outcome::Rejected | Outcome::Challenge => {
                self.fail("login rejected".to_string(), transcript);
            }
        }
    }

    fn transition(&self, state: LoginState, transcript: &str) {
        let mut record = self.lock_record();
        record.state = state;
        record.last_output = transcript.to_string();
    }

    fn fail(&self, error: String, transcript: String) {
        warn!(error = %error, "login failed");
        let mut record = self.lock_record();
        record.state = LoginState::Failed;
        record.last_error = Some(error);
        record.last_output = transcript;
    }

    fn lock_record(&self) -> std::sync::MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
