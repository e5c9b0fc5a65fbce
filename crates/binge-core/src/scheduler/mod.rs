//! Download scheduler: a resizable pool of workers pulling jobs from one
//! indexed priority queue.
//!
//! Jobs are submitted with a [`Priority`]; workers take the most urgent ready
//! job, wait out its retry cool-down, acquire one of `max_concurrency`
//! semaphore slots and run the [`Transfer`] on tokio's blocking pool. The
//! outcome decides between completion, requeue and giving up. Pausing is a
//! priority ([`Priority::Paused`]) that is never dequeued.
//!
//! One shutdown token, parent of every attempt token, reaches each worker at
//! every suspension point: idle backoff, cool-down, slot wait and transfer.

mod control;
mod error;
mod events;
mod group;
mod guard;
mod state;
mod worker;

pub use error::SchedulerError;
pub use events::{RequeueReason, SchedulerEvent};
pub use group::GroupSummary;

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;

use crate::job::{GroupId, Job, JobHandle, JobId, JobRequest, JobSnapshot, Priority};
use crate::retry::RetryPolicy;
use crate::transfer::Transfer;
use events::EventSink;
use state::{Removal, Shared};

/// Pool size, retry policy and idle backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Slots (and workers) available for concurrent transfers. At least 1.
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
    /// Sleep between polls while no job is ready.
    pub idle_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        crate::config::BingeConfig::default().scheduler_config()
    }
}

/// Result of [`DownloadScheduler::shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownSummary {
    /// All workers exited before the timeout.
    pub clean: bool,
    /// Jobs still tracked (queued or in flight) when shutdown returned.
    pub pending: Vec<JobSnapshot>,
}

/// Handle to a running scheduler. Cheap to clone; all clones drive the same pool.
#[derive(Clone)]
pub struct DownloadScheduler {
    shared: Arc<Shared>,
}

impl fmt::Debug for DownloadScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadScheduler")
            .field("max_concurrency", &self.max_concurrency())
            .field("queued", &self.queued_len())
            .field("in_flight", &self.in_flight())
            .field("completed", &self.completed_count())
            .finish()
    }
}

impl DownloadScheduler {
    /// Creates a scheduler on the current tokio runtime. Workers start on the
    /// first [`submit`](Self::submit).
    pub fn new(config: SchedulerConfig, transfer: Arc<dyn Transfer>) -> Result<Self, SchedulerError> {
        Self::build(config, transfer, None)
    }

    /// Like [`new`](Self::new), also reporting lifecycle events on `events`.
    pub fn with_events(
        config: SchedulerConfig,
        transfer: Arc<dyn Transfer>,
        events: UnboundedSender<SchedulerEvent>,
    ) -> Result<Self, SchedulerError> {
        Self::build(config, transfer, Some(events))
    }

    fn build(
        config: SchedulerConfig,
        transfer: Arc<dyn Transfer>,
        events: Option<UnboundedSender<SchedulerEvent>>,
    ) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current()?;
        Ok(Self {
            shared: Arc::new(Shared::new(config, transfer, EventSink::new(events), runtime)),
        })
    }

    /// Queues a new job. Safe to call from many tasks or threads at once.
    pub fn submit(&self, request: JobRequest, priority: Priority) -> Result<JobHandle, SchedulerError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }
        let job: JobHandle = Arc::new(Job::new(request, priority));
        self.shared.state().track(&job, priority)?;
        tracing::debug!(job = %job.id(), priority = %priority, url = %job.source_url(), "job submitted");
        self.ensure_workers_started();
        Ok(job)
    }

    fn ensure_workers_started(&self) {
        let mut pool = self.shared.pool();
        if pool.started || self.shared.shutdown.is_cancelled() {
            return;
        }
        pool.started = true;
        while pool.live_workers < pool.max {
            worker::spawn_worker(&self.shared, &mut pool);
        }
        tracing::info!(workers = pool.max, "download workers started");
    }

    /// Changes a job's priority. A queued job moves in the queue; an in-flight
    /// job keeps running and is requeued at the new priority if it comes back.
    pub fn update_priority(&self, id: JobId, priority: Priority) -> Result<(), SchedulerError> {
        self.shared.state().reprioritize(id, priority)?;
        tracing::debug!(job = %id, priority = %priority, "priority updated");
        Ok(())
    }

    /// Parks a job at [`Priority::Paused`]. An in-flight attempt is cancelled
    /// and comes back to the queue as interrupted, keeping its partial file.
    pub fn pause(&self, id: JobId) -> Result<(), SchedulerError> {
        self.shared.state().pause(id)
    }

    /// Moves a paused job back to `priority`.
    pub fn resume(&self, id: JobId, priority: Priority) -> Result<(), SchedulerError> {
        self.update_priority(id, priority)
    }

    /// Drops a job. A queued job is removed at once; an in-flight attempt is
    /// cancelled and the job is dropped when it returns (unless the transfer
    /// completed first).
    pub fn cancel(&self, id: JobId) -> Result<(), SchedulerError> {
        let removal = self.shared.state().remove(id)?;
        self.report_removal(id, removal);
        Ok(())
    }

    fn report_removal(&self, id: JobId, removal: Removal) {
        match removal {
            Removal::Immediate => {
                tracing::info!(job = %id, "download removed");
                self.shared.events.emit(SchedulerEvent::Removed { job: id });
            }
            Removal::Deferred => tracing::info!(job = %id, "cancelling in-flight download"),
            Removal::Untracked => {}
        }
    }

    /// Moves every tracked job of `group` to `priority`. Returns how many
    /// jobs were updated.
    pub fn update_group_priority(&self, group: GroupId, priority: Priority) -> Result<usize, SchedulerError> {
        let mut state = self.shared.state();
        let members = state.members(group)?;
        for &id in &members {
            state.reprioritize(id, priority)?;
        }
        tracing::debug!(%group, priority = %priority, jobs = members.len(), "group priority updated");
        Ok(members.len())
    }

    /// Pauses every tracked job of `group`, in-flight ones included.
    pub fn pause_group(&self, group: GroupId) -> Result<usize, SchedulerError> {
        let mut state = self.shared.state();
        let members = state.members(group)?;
        for &id in &members {
            state.pause(id)?;
        }
        tracing::info!(%group, jobs = members.len(), "group paused");
        Ok(members.len())
    }

    /// Cancels every tracked job of `group` as one unit: queued jobs are
    /// removed at once, in-flight ones when their attempt returns.
    pub fn cancel_group(&self, group: GroupId) -> Result<usize, SchedulerError> {
        let removals = {
            let mut state = self.shared.state();
            let members = state.members(group)?;
            let mut removals = Vec::with_capacity(members.len());
            for id in members {
                removals.push((id, state.remove(id)?));
            }
            removals
        };
        tracing::info!(%group, jobs = removals.len(), "group cancelled");
        let count = removals.len();
        for (id, removal) in removals {
            self.report_removal(id, removal);
        }
        Ok(count)
    }

    /// Submitted, completed, removed and exhausted counts of `group`.
    pub fn group_summary(&self, group: GroupId) -> Option<GroupSummary> {
        self.shared.state().groups.get(&group).cloned()
    }

    /// Resizes the pool. Growing adds slots and workers right away; shrinking
    /// lets in-flight transfers finish and retires surplus workers afterwards.
    /// Returns the applied value (at least 1).
    pub fn set_max_concurrency(&self, max: usize) -> usize {
        let max = max.max(1);
        let mut pool = self.shared.pool();
        let old = pool.max;
        if max > old {
            let grow = max - old;
            let repaid = grow.min(pool.debt);
            pool.debt -= repaid;
            self.shared.semaphore.add_permits(grow - repaid);
        } else if max < old {
            let shrink = old - max;
            let forgotten = self.shared.semaphore.forget_permits(shrink);
            pool.debt += shrink - forgotten;
        }
        pool.max = max;
        if pool.started && !self.shared.shutdown.is_cancelled() {
            while pool.live_workers < max {
                worker::spawn_worker(&self.shared, &mut pool);
            }
        }
        if max != old {
            tracing::info!(from = old, to = max, "max concurrent downloads changed");
        }
        max
    }

    pub fn max_concurrency(&self) -> usize {
        self.shared.pool().max
    }

    /// Transfers currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Relaxed)
    }

    /// Jobs waiting in the queue, paused ones included.
    pub fn queued_len(&self) -> usize {
        self.shared.state().queue.len()
    }

    pub fn completed_count(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// A tracked (queued or in-flight) job.
    pub fn job(&self, id: JobId) -> Option<JobHandle> {
        self.shared.state().jobs.get(&id).cloned()
    }

    /// Snapshots of every tracked job, ordered by id.
    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        let state = self.shared.state();
        let mut snaps: Vec<JobSnapshot> = state.jobs.values().map(|job| job.snapshot()).collect();
        snaps.sort_by_key(|s| s.id);
        snaps
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Signals every worker and attempt to stop, then waits up to `timeout`
    /// for the workers to exit. Cancelled attempts are requeued in memory so
    /// [`ShutdownSummary::pending`] lists them with their progress.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownSummary {
        self.shared.shutdown.cancel();
        let mut workers = std::mem::take(&mut self.shared.pool().workers);
        let clean = tokio::time::timeout(timeout, async {
            while workers.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        if clean {
            tracing::info!("download scheduler stopped");
        } else {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                remaining = workers.len(),
                "shutdown timed out; abandoning remaining workers"
            );
        }
        ShutdownSummary {
            clean,
            pending: self.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests;
