//! Supervision of one external command execution.
//!
//! [`start`] spawns a command, merges its stdout and stderr into a single
//! ordered line stream, runs each line through a progress
//! [`Estimator`](gogrepo_progress::Estimator), and fans the result out to
//! any number of [`Subscription`]s. [`JobHandle::cancel`] asks the process
//! group to terminate and escalates to a kill after a grace period.
//!
//! Child failures never propagate as errors: they end up in the job's
//! state, exit code and output buffer.

mod error;
mod signal;
mod subscription;
mod supervise;
pub mod types;

mod job;

pub use error::SupervisorError;
pub use job::JobHandle;
pub use subscription::Subscription;
pub use supervise::start;
pub use types::{
    FAILURE_TAIL_LINES, JobEvent, JobSnapshot, JobState, OutputLine, ProcessFailure, Stream,
    SupervisorConfig,
};
