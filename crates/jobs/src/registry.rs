//! Per-resource job slots.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use gogrepo_supervisor::{JobHandle, JobSnapshot, Subscription, SupervisorConfig};
use gogrepo_tool::CommandSpec;
use tracing::{debug, info};

use crate::error::JobsError;

/// Registry tunables.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a finished job stays visible once nobody is subscribed.
    pub retention: Duration,
    pub supervisor: SupervisorConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(30 * 60),
            supervisor: SupervisorConfig::default(),
        }
    }
}

/// Holds at most one job; the resource is the slot's key in the map.
#[derive(Default)]
struct Slot {
    job: Option<JobHandle>,
}

impl Slot {
    fn job(&self) -> Option<&JobHandle> {
        self.job.as_ref()
    }

    fn active(&self) -> Option<&JobHandle> {
        self.job().filter(|j| !j.state().is_terminal())
    }
}

type SlotRef = Arc<tokio::sync::Mutex<Slot>>;

/// Tracks the current (or most recent) job of each resource.
///
/// The map lock is held only long enough to look up a slot; start and
/// cancel serialize on the slot's own async mutex, so resources never
/// block each other.
pub struct JobRegistry {
    config: RegistryConfig,
    slots: Mutex<HashMap<String, SlotRef>>,
}

impl JobRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Starts a job for `resource`, or fails with [`JobsError::Conflict`]
    /// while a previous one is still running.
    ///
    /// A finished job for the same resource is replaced.
    pub async fn start_job(
        &self,
        resource: &str,
        spec: CommandSpec,
    ) -> Result<JobHandle, JobsError> {
        self.prune();
        let slot = self.slot_or_insert(resource);
        let mut slot = slot.lock().await;
        if let Some(job) = slot.active() {
            debug!(resource, run_id = %job.run_id(), "start rejected, job active");
            return Err(JobsError::Conflict(resource.to_string()));
        }
        if let Some(old) = slot.job() {
            debug!(resource, run_id = %old.run_id(), "replacing finished job");
        }
        let job = gogrepo_supervisor::start(resource, spec, &self.config.supervisor);
        slot.job = Some(job.clone());
        Ok(job)
    }

    /// Subscribes to the current or most recent job of `resource`.
    pub async fn subscribe(&self, resource: &str) -> Result<Subscription, JobsError> {
        Ok(self.get(resource).await?.subscribe())
    }

    /// Requests cancellation of the active job of `resource`.
    ///
    /// Returns `Ok(false)` if a cancel was already in progress. The job
    /// reaches `Cancelled` asynchronously.
    pub async fn cancel_job(&self, resource: &str) -> Result<bool, JobsError> {
        let not_found = || JobsError::NotFound(resource.to_string());
        let slot = self.find_slot(resource).ok_or_else(not_found)?;
        let slot = slot.lock().await;
        let job = slot.active().ok_or_else(not_found)?;
        let requested = job.cancel();
        info!(resource, run_id = %job.run_id(), requested, "cancel routed to job");
        Ok(requested)
    }

    /// Snapshot of the current or most recent job of `resource`.
    pub async fn status(&self, resource: &str) -> Result<JobSnapshot, JobsError> {
        Ok(self.get(resource).await?.snapshot())
    }

    /// Handle to the current or most recent job of `resource`.
    pub async fn get(&self, resource: &str) -> Result<JobHandle, JobsError> {
        self.prune();
        let not_found = || JobsError::NotFound(resource.to_string());
        let slot = self.find_slot(resource).ok_or_else(not_found)?;
        let slot = slot.lock().await;
        slot.job().cloned().ok_or_else(not_found)
    }

    /// Snapshots of every retained job, sorted by resource name.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        self.handles(false).await.iter().map(JobHandle::snapshot).collect()
    }

    /// Snapshots of the jobs still running, so a reconnecting observer can
    /// pick them back up.
    pub async fn active(&self) -> Vec<JobSnapshot> {
        self.handles(true).await.iter().map(JobHandle::snapshot).collect()
    }

    async fn handles(&self, active_only: bool) -> Vec<JobHandle> {
        self.prune();
        let mut slots: Vec<(String, SlotRef)> = {
            let map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            map.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        let mut out = Vec::with_capacity(slots.len());
        for (_, slot) in slots {
            let slot = slot.lock().await;
            let job = if active_only { slot.active() } else { slot.job() };
            if let Some(job) = job {
                out.push(job.clone());
            }
        }
        out
    }

    fn find_slot(&self, resource: &str) -> Option<SlotRef> {
        let map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(resource).cloned()
    }

    // Slot references are only cloned under the map lock, which lets
    // `prune` tell an unreferenced slot from one a caller is about to lock.
    fn slot_or_insert(&self, resource: &str) -> SlotRef {
        let mut map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(resource.to_string()).or_default())
    }

    /// Drops finished jobs past their retention window that nobody is
    /// watching. Busy slots are skipped and picked up on a later call.
    fn prune(&self) {
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or(chrono::TimeDelta::MAX);
        let now = Utc::now();
        let slots: Vec<SlotRef> = {
            let map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            map.values().cloned().collect()
        };
        for slot in slots {
            let Ok(mut slot) = slot.try_lock() else {
                continue;
            };
            let evict = slot.job().is_some_and(|job| {
                let expired = job
                    .ended_at()
                    .is_some_and(|ended| now.signed_duration_since(ended) >= retention);
                expired && job.subscriber_count() == 0
            });
            if evict && let Some(job) = slot.job.take() {
                debug!(resource = job.resource(), run_id = %job.run_id(), "evicting finished job");
            }
        }

        // Forget empty slots nobody else holds.
        let mut map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, slot| {
            Arc::strong_count(slot) > 1 || slot.try_lock().map_or(true, |s| s.job.is_some())
        });
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
