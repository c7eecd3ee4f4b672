//! Public types for supervised jobs.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gogrepo_progress::Progress;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a supervised job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    /// Created, process not spawned yet.
    Pending,
    /// Process is running.
    Running,
    /// Cancel requested, waiting for the process to exit.
    Cancelling,
    /// Exited with status 0.
    Completed,
    /// Exited non-zero, was killed by a signal, or failed to spawn.
    Failed,
    /// Exited after a cancel request, whatever the exit status.
    Cancelled,
}

impl JobState {
    /// Returns `true` for states no further transition leaves.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// Origin of an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stream {
    Stdout,
    Stderr,
    /// Notes added by the supervisor itself (spawn errors, cancellation).
    Supervisor,
}

/// One line of job output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputLine {
    /// Monotonic per job, starting at 0.
    pub seq: u64,
    pub stream: Stream,
    pub text: String,
    /// Estimate after this line was observed.
    pub progress: Progress,
}

/// Event delivered to a [`Subscription`](crate::Subscription).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobEvent {
    Line(OutputLine),
    /// Non-terminal state change (e.g. `Cancelling`).
    StateChanged { state: JobState },
    /// The subscriber fell behind and `skipped` events were dropped.
    Lagged { skipped: u64 },
    /// Terminal event, delivered exactly once per subscription.
    Finished {
        state: JobState,
        exit_code: Option<i32>,
        progress: Progress,
    },
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub resource: String,
    pub run_id: Uuid,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub state: JobState,
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Exit code; a negative value is the signal that ended the process.
    pub exit_code: Option<i32>,
    pub progress: Progress,
    pub lines: Vec<OutputLine>,
}

impl JobSnapshot {
    /// Returns the failure summary for a failed job.
    pub fn failure(&self, tail: usize) -> Option<ProcessFailure> {
        if self.state != JobState::Failed {
            return None;
        }
        let skip = self.lines.len().saturating_sub(tail);
        Some(ProcessFailure {
            exit_code: self.exit_code,
            tail: self.lines[skip..].iter().map(|l| l.text.clone()).collect(),
        })
    }

    /// Concatenated output text, one line per entry.
    pub fn output_text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }
}

/// Number of trailing output lines kept in a [`ProcessFailure`].
pub const FAILURE_TAIL_LINES: usize = 20;

/// Why a job failed: its exit code and the last lines it printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFailure {
    pub exit_code: Option<i32>,
    pub tail: Vec<String>,
}

impl std::fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "process exited with status {code}")?,
            None => write!(f, "process failed")?,
        }
        if let Some(last) = self.tail.last() {
            write!(f, ": {last}")?;
        }
        Ok(())
    }
}

/// Tunables for process supervision.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Time between SIGTERM and SIGKILL on cancel.
    pub grace: Duration,
    /// Per-job fan-out buffer; slower subscribers lose the oldest events.
    pub broadcast_capacity: usize,
    /// How long to wait for the output readers after the process exits.
    pub drain_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            broadcast_capacity: 1024,
            drain_timeout: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(seq: u64, text: &str) -> OutputLine {
        OutputLine {
            seq,
            stream: Stream::Stdout,
            text: text.into(),
            progress: Progress::Unknown,
        }
    }

    fn snapshot(state: JobState, lines: Vec<OutputLine>) -> JobSnapshot {
        JobSnapshot {
            resource: "update".into(),
            run_id: Uuid::new_v4(),
            program: "python3".into(),
            args: vec![],
            cwd: PathBuf::from("/data"),
            state,
            pid: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            exit_code: Some(2),
            progress: Progress::Unknown,
            lines,
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Cancelling.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn failure_tail_takes_last_lines() {
        let lines = (0..5).map(|i| line(i, &format!("l{i}"))).collect();
        let snap = snapshot(JobState::Failed, lines);
        let failure = snap.failure(2).unwrap();
        assert_eq!(failure.tail, vec!["l3", "l4"]);
        assert_eq!(failure.exit_code, Some(2));
        assert_eq!(failure.to_string(), "process exited with status 2: l4");
    }

    #[test]
    fn failure_only_for_failed() {
        let snap = snapshot(JobState::Completed, vec![]);
        assert!(snap.failure(10).is_none());
    }

    #[test]
    fn output_text_joins_lines() {
        let snap = snapshot(JobState::Completed, vec![line(0, "a"), line(1, "b")]);
        assert_eq!(snap.output_text(), "a\nb\n");
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let ev = JobEvent::StateChanged {
            state: JobState::Cancelling,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "stateChanged");
        assert_eq!(json["state"], "cancelling");
    }
}
