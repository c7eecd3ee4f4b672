//! Shared job record and the handle observers hold.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use gogrepo_progress::{Estimator, Progress};
use gogrepo_tool::CommandSpec;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::subscription::Subscription;
use crate::types::{JobEvent, JobSnapshot, JobState, OutputLine, Stream};

/// Cheaply cloneable handle to one supervised job.
#[derive(Clone)]
pub struct JobHandle {
    pub(crate) shared: Arc<JobShared>,
}

pub(crate) struct JobShared {
    pub(crate) resource: String,
    pub(crate) run_id: Uuid,
    pub(crate) spec: CommandSpec,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) cancel: CancellationToken,
    pub(crate) state_tx: watch::Sender<JobState>,
    pub(crate) inner: Mutex<JobInner>,
}

pub(crate) struct JobInner {
    pub(crate) state: JobState,
    pub(crate) pid: Option<u32>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    pub(crate) exit_code: Option<i32>,
    pub(crate) lines: Vec<OutputLine>,
    pub(crate) estimator: Estimator,
    pub(crate) events: broadcast::Sender<JobEvent>,
}

impl JobShared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, JobInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JobHandle {
    pub(crate) fn new(resource: &str, spec: CommandSpec, broadcast_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(broadcast_capacity.max(1));
        let (state_tx, _) = watch::channel(JobState::Pending);
        Self {
            shared: Arc::new(JobShared {
                resource: resource.to_string(),
                run_id: Uuid::new_v4(),
                spec,
                created_at: Utc::now(),
                cancel: CancellationToken::new(),
                state_tx,
                inner: Mutex::new(JobInner {
                    state: JobState::Pending,
                    pid: None,
                    started_at: None,
                    ended_at: None,
                    exit_code: None,
                    lines: Vec::new(),
                    estimator: Estimator::new(),
                    events,
                }),
            }),
        }
    }

    /// Resource name this job runs under.
    pub fn resource(&self) -> &str {
        &self.shared.resource
    }

    /// Identifier of this particular run.
    pub fn run_id(&self) -> Uuid {
        self.shared.run_id
    }

    /// Current state.
    pub fn state(&self) -> JobState {
        self.shared.lock().state
    }

    /// Current progress estimate.
    pub fn progress(&self) -> Progress {
        self.shared.lock().estimator.current()
    }

    /// When the job reached a terminal state.
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.shared.lock().ended_at
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().events.receiver_count()
    }

    /// Returns a full snapshot, including all buffered output.
    pub fn snapshot(&self) -> JobSnapshot {
        self.snapshot_since(None)
    }

    /// Returns a snapshot holding only lines after `after_seq`.
    ///
    /// Lets a polling observer fetch output incrementally.
    pub fn snapshot_since(&self, after_seq: Option<u64>) -> JobSnapshot {
        let inner = self.shared.lock();
        let lines = match after_seq {
            None => inner.lines.clone(),
            Some(seq) => {
                let start = inner.lines.partition_point(|l| l.seq <= seq);
                inner.lines[start..].to_vec()
            }
        };
        JobSnapshot {
            resource: self.shared.resource.clone(),
            run_id: self.shared.run_id,
            program: self.shared.spec.program.clone(),
            args: self.shared.spec.args.clone(),
            cwd: self.shared.spec.cwd.clone(),
            state: inner.state,
            pid: inner.pid,
            created_at: self.shared.created_at,
            started_at: inner.started_at,
            ended_at: inner.ended_at,
            exit_code: inner.exit_code,
            progress: inner.estimator.current(),
            lines,
        }
    }

    /// Opens a subscription that replays buffered output, then follows
    /// live events until the job finishes.
    pub fn subscribe(&self) -> Subscription {
        let inner = self.shared.lock();
        let backlog: Vec<JobEvent> = inner.lines.iter().cloned().map(JobEvent::Line).collect();
        if inner.state.is_terminal() {
            let finished = JobEvent::Finished {
                state: inner.state,
                exit_code: inner.exit_code,
                progress: inner.estimator.current(),
            };
            Subscription::replay(backlog, finished, Arc::downgrade(&self.shared))
        } else {
            // Subscribing under the lock means no line can slip between
            // the backlog and the live receiver.
            let rx = inner.events.subscribe();
            Subscription::live(backlog, rx, Arc::downgrade(&self.shared))
        }
    }

    /// Requests cancellation.
    ///
    /// Returns `false` if the job already finished or a cancel is already
    /// in progress. Completion is observed through the state transition.
    pub fn cancel(&self) -> bool {
        let mut inner = self.shared.lock();
        let current = inner.state;
        match current {
            JobState::Pending | JobState::Running => {
                inner.state = JobState::Cancelling;
                self.shared.state_tx.send_replace(JobState::Cancelling);
                let _ = inner.events.send(JobEvent::StateChanged {
                    state: JobState::Cancelling,
                });
                drop(inner);
                self.shared.cancel.cancel();
                info!(resource = %self.shared.resource, run_id = %self.shared.run_id, "cancel requested");
                true
            }
            state => {
                debug!(resource = %self.shared.resource, ?state, "cancel ignored");
                false
            }
        }
    }

    /// Waits until the job reaches a terminal state.
    pub async fn wait(&self) -> JobSnapshot {
        let mut rx = self.shared.state_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|s| s.is_terminal()).await;
        self.snapshot()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    pub(crate) fn mark_running(&self, pid: Option<u32>) {
        let mut inner = self.shared.lock();
        inner.pid = pid;
        inner.started_at = Some(Utc::now());
        if inner.state == JobState::Pending {
            inner.state = JobState::Running;
            self.shared.state_tx.send_replace(JobState::Running);
        }
    }

    /// Appends a line, updates the estimate and broadcasts it.
    pub(crate) fn push_line(&self, stream: Stream, text: String) {
        let mut inner = self.shared.lock();
        let progress = inner.estimator.observe(&text);
        let line = OutputLine {
            seq: inner.lines.len() as u64,
            stream,
            text,
            progress,
        };
        inner.lines.push(line.clone());
        // No receivers is fine: output stays in the buffer.
        let _ = inner.events.send(JobEvent::Line(line));
    }

    /// Records the terminal state and notifies everyone.
    pub(crate) fn finish(&self, state: JobState, exit_code: Option<i32>) {
        debug_assert!(state.is_terminal());
        let mut inner = self.shared.lock();
        if inner.state.is_terminal() {
            return;
        }
        let progress = inner.estimator.finish(state == JobState::Completed);
        inner.state = state;
        inner.exit_code = exit_code;
        inner.ended_at = Some(Utc::now());
        let _ = inner.events.send(JobEvent::Finished {
            state,
            exit_code,
            progress,
        });
        self.shared.state_tx.send_replace(state);
        info!(
            resource = %self.shared.resource,
            run_id = %self.shared.run_id,
            ?state,
            exit_code,
            lines = inner.lines.len(),
            "job finished"
        );
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("resource", &self.shared.resource)
            .field("run_id", &self.shared.run_id)
            .field("state", &self.state())
            .finish()
    }
}
