//! Interactive two-step login on the terminal.

use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, bail};
use gogrepo_login::{LoginBridge, LoginState};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::state::HubState;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Where the login command reads its answers from.
pub trait Terminal: Send {
    /// Reads one visible line.
    fn line<'a>(&'a mut self, label: &'a str) -> BoxFuture<'a, anyhow::Result<String>>;

    /// Reads one line without echoing it.
    fn secret<'a>(&'a mut self, label: &'a str) -> BoxFuture<'a, anyhow::Result<String>>;
}

/// The process's own terminal.
pub struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Console {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminal for Console {
    fn line<'a>(&'a mut self, label: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move {
            eprint!("{label}");
            std::io::Write::flush(&mut std::io::stderr())?;
            let line = self.lines.next_line().await?.context("stdin closed")?;
            Ok(line.trim().to_string())
        })
    }

    fn secret<'a>(&'a mut self, label: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        let label = label.to_string();
        Box::pin(async move {
            let password = tokio::task::spawn_blocking(move || rpassword::prompt_password(label))
                .await?
                .context("failed to read password")?;
            Ok(password)
        })
    }
}

pub async fn login(state: &HubState, username: Option<String>, reset: bool) -> anyhow::Result<()> {
    run(&state.login, &mut Console::new(), username, reset).await
}

async fn run(
    bridge: &LoginBridge,
    terminal: &mut dyn Terminal,
    username: Option<String>,
    reset: bool,
) -> anyhow::Result<()> {
    if reset {
        bridge.reset().await;
    }
    if bridge.has_credentials() {
        eprintln!(
            "existing session found at {}, logging in again replaces it",
            bridge.cookie_path().display()
        );
    }

    let username = match username {
        Some(name) => name,
        None => terminal.line("GOG username: ").await?,
    };
    let password = terminal.secret("GOG password: ").await?;

    let mut outcome = bridge.submit_credentials(&username, &password).await?;
    drop(password);
    if outcome == LoginState::AwaitingSecondFactor {
        let code = terminal
            .line("Second-factor code (email or authenticator): ")
            .await?;
        outcome = bridge.submit_code(&code).await?;
    }

    let status = bridge.status();
    let output = status.last_output.trim();
    if !output.is_empty() {
        eprintln!("{output}");
    }
    match outcome {
        LoginState::Authenticated => {
            println!("logged in");
            Ok(())
        }
        other => bail!(
            "login {other}: {}",
            status.last_error.as_deref().unwrap_or("no details")
        ),
    }
}
