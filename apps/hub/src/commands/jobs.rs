//! Job commands: start, print live output, cancel on Ctrl-C.

use anyhow::bail;
use gogrepo_jobs::JobsError;
use gogrepo_progress::Progress;
use gogrepo_supervisor::{FAILURE_TAIL_LINES, JobEvent, JobState, OutputLine, Subscription};
use gogrepo_tool::{
    CommandSpec, DownloadOptions, RESOURCE_DOWNLOAD, RESOURCE_UPDATE, UpdateOptions,
};
use tracing::{debug, info, warn};

use crate::state::HubState;

pub async fn update(state: &HubState, opts: UpdateOptions) -> anyhow::Result<()> {
    let spec = state.tool.update(&opts);
    run(state, RESOURCE_UPDATE, spec).await
}

pub async fn download(state: &HubState, opts: DownloadOptions) -> anyhow::Result<()> {
    let spec = state.tool.download(&opts);
    run(state, RESOURCE_DOWNLOAD, spec).await
}

async fn run(state: &HubState, resource: &str, spec: CommandSpec) -> anyhow::Result<()> {
    let job = state.registry.start_job(resource, spec).await?;
    info!(resource, run_id = %job.run_id(), pid = ?job.snapshot().pid, "job started");
    let mut subscription = state.registry.subscribe(resource).await?;
    let outcome = follow(state, resource, &mut subscription).await?;

    match outcome {
        JobState::Completed => Ok(()),
        JobState::Cancelled => bail!("{resource} cancelled"),
        _ => {
            let snapshot = state.registry.status(resource).await?;
            match snapshot.failure(FAILURE_TAIL_LINES) {
                Some(failure) => bail!("{resource} failed: {failure}"),
                None => bail!("{resource} ended in state {:?}", snapshot.state),
            }
        }
    }
}

/// Prints events until the job finishes. The first Ctrl-C requests
/// cancellation; output keeps flowing until the process is gone.
async fn follow(
    state: &HubState,
    resource: &str,
    subscription: &mut Subscription,
) -> anyhow::Result<JobState> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;

    loop {
        tokio::select! {
            signal = &mut ctrl_c, if !cancel_requested => {
                cancel_requested = true;
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                    continue;
                }
                eprintln!("cancelling {resource}...");
                match state.registry.cancel_job(resource).await {
                    Ok(true) => {}
                    Ok(false) => debug!(resource, "cancel already in progress"),
                    Err(JobsError::NotFound(_)) => debug!(resource, "job already finished"),
                    Err(e) => return Err(e.into()),
                }
            }
            event = subscription.next() => match event {
                Some(JobEvent::Line(line)) => print_line(&line),
                Some(JobEvent::StateChanged { state: job_state }) => {
                    eprintln!("[{resource}] {job_state:?}");
                }
                Some(JobEvent::Lagged { skipped }) => {
                    eprintln!("[{resource}] output too fast, {skipped} events skipped");
                }
                Some(JobEvent::Finished { state: job_state, exit_code, progress }) => {
                    let code = exit_code.map_or_else(|| "-".to_string(), |c| c.to_string());
                    eprintln!(
                        "[{resource}] {job_state:?} (exit {code}, progress {})",
                        format_progress(progress).trim()
                    );
                    return Ok(job_state);
                }
                None => bail!("{resource}: event stream ended without a result"),
            },
        }
    }
}

fn print_line(line: &OutputLine) {
    println!("[{}] {}", format_progress(line.progress), line.text);
}

fn format_progress(progress: Progress) -> String {
    match progress {
        Progress::Known(p) => format!("{p:5.1}%"),
        Progress::Unknown => "   ?  ".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_column_is_fixed_width() {
        assert_eq!(format_progress(Progress::Known(42.0)), " 42.0%");
        assert_eq!(format_progress(Progress::Known(100.0)), "100.0%");
        assert_eq!(format_progress(Progress::Unknown).len(), 6);
    }
}
