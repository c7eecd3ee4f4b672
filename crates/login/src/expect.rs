//! Expect-style driver for an interactive child on a pseudo-terminal.
//!
//! gogrepo reads the password with `getpass`, which talks to the
//! controlling terminal rather than stdin. The child therefore runs in its
//! own session with the pty slave as its terminal, and everything it
//! writes arrives on the master side.

use std::io::{Read, Write};
use std::time::Duration;

use gogrepo_tool::CommandSpec;
use portable_pty::{
    Child, ChildKiller, CommandBuilder, ExitStatus, MasterPty, PtySize, native_pty_system,
};
use regex::Regex;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::debug;

use crate::error::LoginError;
use crate::prompts::earliest;
use crate::session::Stage;

/// Bound on the transcript kept for display.
const TRANSCRIPT_LIMIT: usize = 64 * 1024;

/// Interval between exit checks while waiting for the child.
const EXIT_POLL: Duration = Duration::from_millis(20);

const REDACTED: &str = "********";

/// What an [`Interaction::expect`] call saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Matched {
    /// Index into the pattern list.
    Pattern(usize),
    /// Output ended without a match.
    Eof,
}

/// A running child whose terminal output is scanned for prompts.
pub(crate) struct Interaction {
    child: Box<dyn Child + Send + Sync>,
    /// Kept open for the child's lifetime; dropping it hangs up the terminal.
    master: Box<dyn MasterPty + Send>,
    writer: Option<Box<dyn Write + Send>>,
    output: mpsc::Receiver<Vec<u8>>,
    pending: String,
    transcript: String,
    /// Values the terminal may echo back that must not be shown.
    secrets: Vec<String>,
    eof: bool,
}

impl Interaction {
    pub(crate) fn spawn(spec: &CommandSpec) -> Result<Self, LoginError> {
        let spawn_error = |reason: String| LoginError::Spawn {
            program: spec.program.clone(),
            reason,
        };

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: 24,
                cols: 200,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| spawn_error(format!("cannot open a terminal: {e}")))?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        cmd.cwd(&spec.cwd);
        cmd.env("PYTHONUNBUFFERED", "1");
        cmd.env("TERM", "dumb");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| spawn_error(e.to_string()))?;
        // Only the child may hold the slave, so that its exit ends the output.
        drop(pair.slave);

        let master = pair.master;
        let mut reader = master
            .try_clone_reader()
            .map_err(|e| spawn_error(format!("cannot read the terminal: {e}")))?;
        let writer = master
            .take_writer()
            .map_err(|e| spawn_error(format!("cannot write the terminal: {e}")))?;

        let (tx, rx) = mpsc::channel(64);
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                // EIO once the last slave descriptor is closed.
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        debug!(pid = child.process_id(), "login tool started");

        Ok(Self {
            child,
            master,
            writer: Some(writer),
            output: rx,
            pending: String::new(),
            transcript: String::new(),
            secrets: Vec::new(),
            eof: false,
        })
    }

    /// Waits until one of `patterns` appears in unread output, or output
    /// ends. Output up to the end of the match is consumed.
    pub(crate) async fn expect(
        &mut self,
        patterns: &[Regex],
        stage: Stage,
        wait: Duration,
    ) -> Result<Matched, LoginError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some((index, _, end)) = earliest(patterns, &self.pending) {
                self.pending.drain(..end);
                return Ok(Matched::Pattern(index));
            }
            if self.eof {
                self.pending.clear();
                return Ok(Matched::Eof);
            }
            match timeout_at(deadline, self.output.recv()).await {
                Ok(Some(chunk)) => {
                    let text = String::from_utf8_lossy(&chunk).replace("\r\n", "\n");
                    self.pending.push_str(&text);
                    self.record(&text);
                }
                Ok(None) => self.eof = true,
                Err(_) => return Err(LoginError::Timeout(stage)),
            }
        }
    }

    /// Types one line into the child's terminal.
    pub(crate) async fn send_line(&mut self, line: &str) -> Result<(), LoginError> {
        let mut writer = self.writer.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "terminal already closed")
        })?;
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        let (writer, result) = tokio::task::spawn_blocking(move || {
            let result = writer.write_all(&bytes).and_then(|()| writer.flush());
            (writer, result)
        })
        .await
        .map_err(std::io::Error::other)?;
        self.writer = Some(writer);
        Ok(result?)
    }

    /// Like [`send_line`](Self::send_line), but the value is masked in the
    /// transcript if the terminal echoes it.
    pub(crate) async fn send_secret(&mut self, line: &str) -> Result<(), LoginError> {
        if !line.is_empty() {
            self.secrets.push(line.to_string());
        }
        self.send_line(line).await
    }

    /// Waits for the child to exit after its output has ended.
    pub(crate) async fn wait(&mut self, wait: Duration) -> Result<ExitStatus, LoginError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                return Err(LoginError::Timeout(Stage::Exit));
            }
            sleep(EXIT_POLL).await;
        }
    }

    /// Kills and reaps the child, then closes the terminal.
    pub(crate) async fn kill(self) {
        let Self {
            mut child,
            master,
            writer,
            ..
        } = self;
        drop(writer);
        let reaped = tokio::task::spawn_blocking(move || {
            let status = match child.try_wait() {
                Ok(Some(status)) => Ok(status),
                _ => {
                    if let Err(e) = child.kill() {
                        debug!(error = %e, "login tool already gone");
                    }
                    child.wait()
                }
            };
            drop(master);
            status
        })
        .await;
        if let Ok(Err(e)) = reaped {
            debug!(error = %e, "failed to reap login tool");
        }
    }

    /// Everything the tool printed so far, with secrets masked.
    pub(crate) fn transcript(&self) -> String {
        self.secrets
            .iter()
            .fold(self.transcript.clone(), |text, secret| {
                text.replace(secret.as_str(), REDACTED)
            })
    }

    fn record(&mut self, text: &str) {
        if self.transcript.len() + text.len() > TRANSCRIPT_LIMIT {
            return;
        }
        self.transcript.push_str(text);
    }
}
