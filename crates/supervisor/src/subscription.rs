//! Observer-side view of a job's event stream.

use std::collections::VecDeque;
use std::sync::Weak;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::job::JobShared;
use crate::types::JobEvent;

/// Live channel to one job's output.
///
/// Replays everything buffered at subscribe time, then follows new events.
/// Holds only a weak reference to the job. [`next`](Self::next) yields
/// [`JobEvent::Finished`] exactly once and `None` afterwards.
pub struct Subscription {
    backlog: VecDeque<JobEvent>,
    rx: Option<broadcast::Receiver<JobEvent>>,
    job: Weak<JobShared>,
    last_seq: Option<u64>,
    finished: bool,
}

impl Subscription {
    pub(crate) fn live(
        backlog: Vec<JobEvent>,
        rx: broadcast::Receiver<JobEvent>,
        job: Weak<JobShared>,
    ) -> Self {
        Self {
            backlog: backlog.into(),
            rx: Some(rx),
            job,
            last_seq: None,
            finished: false,
        }
    }

    pub(crate) fn replay(backlog: Vec<JobEvent>, finished: JobEvent, job: Weak<JobShared>) -> Self {
        let mut backlog: VecDeque<JobEvent> = backlog.into();
        backlog.push_back(finished);
        Self {
            backlog,
            rx: None,
            job,
            last_seq: None,
            finished: false,
        }
    }

    /// Returns `true` once the terminal event has been delivered.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Waits for the next event.
    pub async fn next(&mut self) -> Option<JobEvent> {
        if self.finished {
            return None;
        }
        if let Some(event) = self.backlog.pop_front() {
            return Some(self.track(event));
        }
        loop {
            let Some(rx) = self.rx.as_mut() else {
                return self.closed();
            };
            match rx.recv().await {
                Ok(JobEvent::Line(line)) if self.last_seq.is_some_and(|seq| line.seq <= seq) => {
                    continue;
                }
                Ok(event) => return Some(self.track(event)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged, oldest events dropped");
                    return Some(JobEvent::Lagged { skipped });
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return self.closed();
                }
            }
        }
    }

    /// Drains the subscription, collecting events until the job ends.
    pub async fn collect(mut self) -> Vec<JobEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }

    fn track(&mut self, event: JobEvent) -> JobEvent {
        match &event {
            JobEvent::Line(line) => self.last_seq = Some(line.seq),
            JobEvent::Finished { .. } => {
                self.finished = true;
                self.rx = None;
            }
            _ => {}
        }
        event
    }

    /// The channel closed without a terminal event; synthesize one from
    /// the job record if it is still around.
    fn closed(&mut self) -> Option<JobEvent> {
        self.finished = true;
        let job = self.job.upgrade()?;
        let inner = job.lock();
        inner.state.is_terminal().then(|| JobEvent::Finished {
            state: inner.state,
            exit_code: inner.exit_code,
            progress: inner.estimator.current(),
        })
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("backlog", &self.backlog.len())
            .field("last_seq", &self.last_seq)
            .field("finished", &self.finished)
            .finish()
    }
}
