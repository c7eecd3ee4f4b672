//! Spawning and supervising the child process.

use std::process::Stdio;

use gogrepo_progress::LineSplitter;
use gogrepo_tool::CommandSpec;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::SupervisorError;
use crate::job::JobHandle;
use crate::signal::{self, Signal};
use crate::types::{FAILURE_TAIL_LINES, JobState, Stream, SupervisorConfig};

const READ_CHUNK: usize = 8 * 1024;
const LINE_QUEUE: usize = 256;

type LineMsg = (Stream, String);

/// Starts `spec` as a supervised job.
///
/// The process is spawned before this returns, so the handle is already
/// `Running`, or `Failed` if the spawn itself failed. Must be called from
/// within a Tokio runtime.
pub fn start(resource: &str, spec: CommandSpec, config: &SupervisorConfig) -> JobHandle {
    let job = JobHandle::new(resource, spec, config.broadcast_capacity);

    let mut child = match spawn(&job.shared.spec) {
        Ok(child) => child,
        Err(e) => {
            warn!(resource, error = %e, "job spawn failed");
            job.push_line(Stream::Supervisor, format!("[error] {e}"));
            job.finish(JobState::Failed, None);
            return job;
        }
    };

    let pid = child.id();
    job.mark_running(pid);
    info!(
        resource,
        run_id = %job.run_id(),
        pid,
        program = %job.shared.spec.program,
        "job started"
    );

    let (tx, rx) = mpsc::channel(LINE_QUEUE);
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, Stream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, Stream::Stderr, tx));
    }

    tokio::spawn(supervise(job.clone(), child, rx, readers, config.clone()));
    job
}

fn spawn(spec: &CommandSpec) -> Result<Child, SupervisorError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .env("PYTHONUNBUFFERED", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so cancellation reaches grandchildren too.
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
        program: spec.program.clone(),
        source,
    })?;
    if child.stdout.is_none() {
        return Err(SupervisorError::MissingPipe("stdout"));
    }
    Ok(child)
}

fn spawn_reader<R>(mut reader: R, stream: Stream, tx: mpsc::Sender<LineMsg>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut splitter = LineSplitter::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!(?stream, error = %e, "output read failed");
                    break;
                }
            };
            for line in splitter.push(&buf[..n]) {
                if tx.send((stream, line)).await.is_err() {
                    return;
                }
            }
        }
        if let Some(line) = splitter.finish() {
            let _ = tx.send((stream, line)).await;
        }
    })
}

async fn supervise(
    job: JobHandle,
    mut child: Child,
    mut lines: mpsc::Receiver<LineMsg>,
    readers: Vec<JoinHandle<()>>,
    config: SupervisorConfig,
) {
    let cancel = job.cancel_token();
    let pgid = child.id();
    let mut kill_at: Option<Instant> = None;
    let mut killed = false;
    let mut lines_open = true;

    let status = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled(), if kill_at.is_none() => {
                job.push_line(
                    Stream::Supervisor,
                    "[info] cancel requested, terminating process".into(),
                );
                send_signal(&mut child, pgid, Signal::Terminate);
                kill_at = Some(Instant::now() + config.grace);
            }

            _ = tokio::time::sleep_until(kill_at.unwrap_or_else(Instant::now)),
                if kill_at.is_some() && !killed =>
            {
                job.push_line(
                    Stream::Supervisor,
                    "[info] process did not exit in time, killing".into(),
                );
                send_signal(&mut child, pgid, Signal::Kill);
                killed = true;
            }

            line = lines.recv(), if lines_open => match line {
                Some((stream, text)) => job.push_line(stream, text),
                None => lines_open = false,
            },

            status = child.wait() => break status,
        }
    };

    // Stragglers left in the group would otherwise keep the pipes open.
    if let Some(pgid) = pgid {
        signal::signal_group(pgid, Signal::Kill);
    }

    let drained = tokio::time::timeout(config.drain_timeout, async {
        while let Some((stream, text)) = lines.recv().await {
            job.push_line(stream, text);
        }
    })
    .await;
    if drained.is_err() {
        warn!(resource = %job.resource(), "output readers did not finish, abandoning");
        for reader in &readers {
            reader.abort();
        }
        while let Ok((stream, text)) = lines.try_recv() {
            job.push_line(stream, text);
        }
    }

    let cancelled = cancel.is_cancelled();
    let (state, exit_code) = match status {
        Ok(status) => {
            let state = if cancelled {
                JobState::Cancelled
            } else if status.success() {
                JobState::Completed
            } else {
                JobState::Failed
            };
            (state, signal::exit_code(status))
        }
        Err(e) => {
            let e = SupervisorError::from(e);
            job.push_line(Stream::Supervisor, format!("[error] {e}"));
            let state = if cancelled {
                JobState::Cancelled
            } else {
                JobState::Failed
            };
            (state, None)
        }
    };
    job.finish(state, exit_code);

    if let Some(failure) = job.snapshot().failure(FAILURE_TAIL_LINES) {
        warn!(resource = %job.resource(), run_id = %job.run_id(), "{failure}");
    }
}

fn send_signal(child: &mut Child, pgid: Option<u32>, sig: Signal) {
    let delivered = pgid.is_some_and(|pgid| signal::signal_group(pgid, sig));
    debug!(?pgid, ?sig, delivered, "signalled process group");
    if !delivered || sig == Signal::Kill {
        // Fall back to the direct child; harmless if it already exited.
        let _ = child.start_kill();
    }
}
