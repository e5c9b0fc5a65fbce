//! Worker loop: dequeue, cool down, take a slot, transfer, settle.

use std::sync::Arc;
use std::time::Instant;

use super::events::SchedulerEvent;
use super::guard::SlotGuard;
use super::state::{Pool, Shared};
use crate::job::{JobHandle, JobState};
use crate::transfer::Outcome;

/// Starts one more worker on the scheduler's runtime. Caller holds the pool lock.
pub(super) fn spawn_worker(shared: &Arc<Shared>, pool: &mut Pool) {
    let worker = pool.next_worker;
    pool.next_worker += 1;
    let lease = WorkerLease::acquire(shared, pool);
    let runtime = shared.runtime.clone();
    pool.workers.spawn_on(worker_loop(lease, worker), &runtime);
}

/// A worker's place in `Pool::live_workers`, given back on drop. A worker
/// that unwinds is replaced unless the scheduler is shutting down.
pub(super) struct WorkerLease {
    shared: Arc<Shared>,
    /// Set once `try_retire` has already given the place back.
    retired: bool,
}

impl WorkerLease {
    pub(super) fn acquire(shared: &Arc<Shared>, pool: &mut Pool) -> Self {
        pool.live_workers += 1;
        Self {
            shared: Arc::clone(shared),
            retired: false,
        }
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        if self.retired {
            return;
        }
        let mut pool = self.shared.pool();
        pool.live_workers = pool.live_workers.saturating_sub(1);
        if std::thread::panicking()
            && !self.shared.shutdown.is_cancelled()
            && pool.live_workers < pool.max
        {
            tracing::error!("download worker panicked; starting a replacement");
            spawn_worker(&self.shared, &mut pool);
        }
    }
}

async fn worker_loop(mut lease: WorkerLease, worker: usize) {
    let shared = Arc::clone(&lease.shared);
    tracing::debug!(worker, "worker started");
    loop {
        if shared.shutdown.is_cancelled() {
            break;
        }
        if shared.try_retire() {
            lease.retired = true;
            break;
        }
        let next = shared.state().dequeue_ready(&shared.shutdown);
        match next {
            Some((job, attempt)) => run_attempt(&shared, worker, job, attempt).await,
            None => {
                tokio::select! {
                    _ = shared.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(shared.config.idle_backoff) => {}
                }
            }
        }
    }
    tracing::debug!(worker, retired = lease.retired, "worker stopped");
}

async fn run_attempt(
    shared: &Arc<Shared>,
    worker: usize,
    job: JobHandle,
    attempt: tokio_util::sync::CancellationToken,
) {
    let id = job.id();

    if let Some(wait) = shared
        .config
        .retry
        .cooldown_remaining(job.last_retry(), Instant::now())
    {
        tracing::debug!(job = %id, worker, wait_ms = wait.as_millis() as u64, "cooling down before retry");
        tokio::select! {
            _ = attempt.cancelled() => {
                shared.finish(&job, Outcome::Cancelled);
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }

    let permit = tokio::select! {
        _ = attempt.cancelled() => {
            shared.finish(&job, Outcome::Cancelled);
            return;
        }
        permit = Arc::clone(&shared.semaphore).acquire_owned() => permit,
    };
    let permit = match permit {
        Ok(permit) => permit,
        Err(_) => {
            shared.finish(&job, Outcome::Cancelled);
            return;
        }
    };
    let slot = SlotGuard::new(permit, Arc::clone(shared));

    job.set_state(JobState::Downloading);
    let attempt_no = job.retry_count() + 1;
    tracing::info!(job = %id, worker, attempt = attempt_no, url = %job.source_url(), "download starting");
    shared.events.emit(SchedulerEvent::Started {
        job: id,
        attempt: attempt_no,
    });

    let transfer = Arc::clone(&shared.transfer);
    let exec_job = Arc::clone(&job);
    let token = attempt.clone();
    let outcome =
        match tokio::task::spawn_blocking(move || transfer.execute(&exec_job, &token)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(job = %id, worker, "transfer aborted unexpectedly: {}", e);
                job.record_error(format!("transfer aborted unexpectedly: {}", e));
                Outcome::Error
            }
        };
    drop(slot);

    shared.finish(&job, outcome);
}
