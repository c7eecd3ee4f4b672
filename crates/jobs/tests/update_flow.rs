//! End-to-end flows through the registry with a stand-in gogrepo script.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gogrepo_jobs::{JobRegistry, JobsError, RegistryConfig};
use gogrepo_progress::Progress;
use gogrepo_supervisor::{JobEvent, JobState, SupervisorConfig};
use gogrepo_tool::{DownloadOptions, RESOURCE_DOWNLOAD, RESOURCE_UPDATE, Tool, UpdateOptions};

/// Writes a fake `gogrepo.py` that `sh` runs in place of Python.
fn fake_tool(dir: &Path, body: &str) -> Tool {
    let script: PathBuf = dir.join("gogrepo.sh");
    std::fs::write(&script, body).unwrap();
    Tool::new("sh", script, dir)
}

fn registry() -> JobRegistry {
    JobRegistry::new(RegistryConfig {
        retention: Duration::from_secs(60),
        supervisor: SupervisorConfig {
            grace: Duration::from_millis(500),
            ..Default::default()
        },
    })
}

const UPDATE_SCRIPT: &str = r#"
echo "args: $*"
echo "fetching game product data (page 1 / 1)..."
echo "(1 / 2) fetching game details for beneath_a_steel_sky..."
sleep 0.3
echo "(2 / 2) fetching game details for trine_2_complete_story..."
sleep 0.3
echo "saving manifest..."
"#;

#[tokio::test]
async fn update_runs_once_and_reports_progress() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), UPDATE_SCRIPT);
    let reg = registry();

    let opts = UpdateOptions {
        os: vec!["windows".into()],
        lang: vec!["en".into()],
        ..Default::default()
    };
    let job = reg.start_job(RESOURCE_UPDATE, tool.update(&opts)).await.unwrap();
    assert_eq!(job.state(), JobState::Running);

    let second = reg.start_job(RESOURCE_UPDATE, tool.update(&opts)).await;
    assert_eq!(second.unwrap_err(), JobsError::Conflict(RESOURCE_UPDATE.into()));

    let events = reg.subscribe(RESOURCE_UPDATE).await.unwrap().collect().await;
    let lines: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Line(l) => Some(l),
            _ => None,
        })
        .collect();
    assert_eq!(lines[0].text, "args: update -os windows -lang en");
    assert_eq!(lines.len(), 5);

    // Estimates never go backwards within the run.
    let percents: Vec<f32> = lines.iter().filter_map(|l| l.progress.percent()).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");

    match events.last() {
        Some(JobEvent::Finished {
            state, progress, ..
        }) => {
            assert_eq!(*state, JobState::Completed);
            assert_eq!(*progress, Progress::Known(100.0));
        }
        other => panic!("unexpected last event: {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_starts_admit_exactly_one() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), "sleep 30");
    let reg = Arc::new(registry());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let reg = Arc::clone(&reg);
        let spec = tool.download(&DownloadOptions::default());
        tasks.push(tokio::spawn(async move {
            reg.start_job(RESOURCE_DOWNLOAD, spec).await
        }));
    }
    let mut ok = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => ok += 1,
            Err(JobsError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((ok, conflicts), (1, 7));

    assert!(reg.cancel_job(RESOURCE_DOWNLOAD).await.unwrap());
    let job = reg.get(RESOURCE_DOWNLOAD).await.unwrap();
    let snap = tokio::time::timeout(Duration::from_secs(5), job.wait())
        .await
        .unwrap();
    assert_eq!(snap.state, JobState::Cancelled);
}

#[tokio::test]
async fn update_and_download_run_side_by_side() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), "echo \"$1 started\"; sleep 30");
    let reg = registry();

    let update = reg
        .start_job(RESOURCE_UPDATE, tool.update(&UpdateOptions::default()))
        .await
        .unwrap();
    let download = reg
        .start_job(RESOURCE_DOWNLOAD, tool.download(&DownloadOptions::default()))
        .await
        .unwrap();

    let active: Vec<String> = reg.active().await.into_iter().map(|s| s.resource).collect();
    assert_eq!(active, [RESOURCE_DOWNLOAD, RESOURCE_UPDATE]);

    reg.cancel_job(RESOURCE_UPDATE).await.unwrap();
    assert_eq!(update.wait().await.state, JobState::Cancelled);
    assert_eq!(download.state(), JobState::Running);

    reg.cancel_job(RESOURCE_DOWNLOAD).await.unwrap();
    download.wait().await;
    assert!(reg.active().await.is_empty());
    assert_eq!(reg.list().await.len(), 2);
}

#[tokio::test]
async fn failed_update_keeps_output_for_status() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(
        dir.path(),
        "echo 'fetching game details...'; echo 'error: not logged in' >&2; exit 1",
    );
    let reg = registry();
    let job = reg
        .start_job(RESOURCE_UPDATE, tool.update(&UpdateOptions::default()))
        .await
        .unwrap();
    job.wait().await;

    let snap = reg.status(RESOURCE_UPDATE).await.unwrap();
    assert_eq!(snap.state, JobState::Failed);
    assert_eq!(snap.exit_code, Some(1));
    let failure = snap.failure(20).unwrap();
    assert_eq!(failure.tail.len(), 2);
    assert!(failure.to_string().contains("status 1"));
}
