//! State shared by the scheduler handle and its workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::control::AttemptRegistry;
use super::error::SchedulerError;
use super::events::{EventSink, RequeueReason, SchedulerEvent};
use super::group::GroupSummary;
use super::SchedulerConfig;
use crate::job::{GroupId, JobHandle, JobId, JobState, Priority};
use crate::queue::IndexedPriorityQueue;
use crate::retry::RetryDecision;
use crate::transfer::{Outcome, Transfer};

/// Queue, job registry, in-flight attempts and group tallies, all behind one mutex.
#[derive(Debug, Default)]
pub(super) struct SchedulerState {
    pub(super) queue: IndexedPriorityQueue<JobId, Priority>,
    pub(super) jobs: HashMap<JobId, JobHandle>,
    pub(super) attempts: AttemptRegistry,
    pub(super) groups: HashMap<GroupId, GroupSummary>,
}

/// What [`SchedulerState::remove`] did with a job.
pub(super) enum Removal {
    /// Was queued; it is gone now.
    Immediate,
    /// Is in flight; dropped when its attempt returns.
    Deferred,
    /// Neither queued nor registered as in flight.
    Untracked,
}

impl SchedulerState {
    pub(super) fn track(&mut self, job: &JobHandle, priority: Priority) -> Result<(), SchedulerError> {
        self.queue.enqueue(job.id(), priority)?;
        self.jobs.insert(job.id(), Arc::clone(job));
        if let Some(group) = job.request().group {
            self.groups
                .entry(group)
                .or_insert_with(|| GroupSummary::new(group))
                .submitted += 1;
        }
        Ok(())
    }

    fn tracked(&self, id: JobId) -> Result<&JobHandle, SchedulerError> {
        self.jobs.get(&id).ok_or(SchedulerError::UnknownJob(id))
    }

    /// Tracked jobs of `group`, ordered by id.
    pub(super) fn members(&self, group: GroupId) -> Result<Vec<JobId>, SchedulerError> {
        if !self.groups.contains_key(&group) {
            return Err(SchedulerError::UnknownGroup(group));
        }
        let mut ids: Vec<JobId> = self
            .jobs
            .values()
            .filter(|job| job.request().group == Some(group))
            .map(|job| job.id())
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub(super) fn reprioritize(&mut self, id: JobId, priority: Priority) -> Result<(), SchedulerError> {
        self.tracked(id)?.set_priority(priority);
        if self.queue.contains(&id) {
            self.queue.update_priority(&id, priority)?;
        }
        Ok(())
    }

    pub(super) fn pause(&mut self, id: JobId) -> Result<(), SchedulerError> {
        self.reprioritize(id, Priority::Paused)?;
        if !self.queue.contains(&id) && self.attempts.request_abort(id) {
            tracing::info!(job = %id, "pausing in-flight download");
        }
        Ok(())
    }

    pub(super) fn remove(&mut self, id: JobId) -> Result<Removal, SchedulerError> {
        let job = Arc::clone(self.tracked(id)?);
        if self.queue.contains(&id) {
            self.queue.remove(&id)?;
            self.settle(&job, JobState::Removed);
            Ok(Removal::Immediate)
        } else if self.attempts.request_removal(id) {
            Ok(Removal::Deferred)
        } else {
            Ok(Removal::Untracked)
        }
    }

    /// Drops a job that reached `terminal` and tallies it in its group.
    fn settle(&mut self, job: &JobHandle, terminal: JobState) {
        self.jobs.remove(&job.id());
        job.set_state(terminal);
        if let Some(summary) = job
            .request()
            .group
            .and_then(|group| self.groups.get_mut(&group))
        {
            summary.record(job.id(), terminal);
        }
    }

    /// Pops the most urgent job unless it (and so everything) is paused, and
    /// registers its attempt.
    pub(super) fn dequeue_ready(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Option<(JobHandle, CancellationToken)> {
        let (_, priority) = self.queue.peek()?;
        if priority.is_paused() {
            return None;
        }
        let id = self.queue.dequeue().ok()?;
        let job = match self.jobs.get(&id) {
            Some(job) => Arc::clone(job),
            None => {
                tracing::warn!(job = %id, "queued id has no job record; dropped");
                return None;
            }
        };
        let token = self.attempts.register(id, shutdown);
        Some((job, token))
    }

    fn requeue(&mut self, job: &JobHandle) {
        if let Err(e) = self.queue.enqueue(job.id(), job.priority()) {
            tracing::warn!(job = %job.id(), "requeue failed: {}", e);
        }
    }
}

/// Worker-pool bookkeeping. `debt` counts permits that must be forgotten as
/// in-flight attempts release them after a shrink.
#[derive(Debug)]
pub(super) struct Pool {
    pub(super) max: usize,
    pub(super) live_workers: usize,
    pub(super) debt: usize,
    pub(super) started: bool,
    pub(super) next_worker: usize,
    pub(super) workers: JoinSet<()>,
}

pub(super) struct Shared {
    pub(super) config: SchedulerConfig,
    pub(super) transfer: Arc<dyn Transfer>,
    pub(super) state: Mutex<SchedulerState>,
    pub(super) pool: Mutex<Pool>,
    pub(super) semaphore: Arc<Semaphore>,
    pub(super) shutdown: CancellationToken,
    pub(super) completed: AtomicU64,
    pub(super) in_flight: AtomicUsize,
    pub(super) events: EventSink,
    pub(super) runtime: Handle,
}

impl Shared {
    pub(super) fn new(
        config: SchedulerConfig,
        transfer: Arc<dyn Transfer>,
        events: EventSink,
        runtime: Handle,
    ) -> Self {
        let max = config.max_concurrency.max(1);
        Self {
            config,
            transfer,
            state: Mutex::new(SchedulerState::default()),
            pool: Mutex::new(Pool {
                max,
                live_workers: 0,
                debt: 0,
                started: false,
                next_worker: 0,
                workers: JoinSet::new(),
            }),
            semaphore: Arc::new(Semaphore::new(max)),
            shutdown: CancellationToken::new(),
            completed: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            events,
            runtime,
        }
    }

    pub(super) fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn pool(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves this worker's exit when the pool has more workers than the
    /// current maximum.
    pub(super) fn try_retire(&self) -> bool {
        let mut pool = self.pool();
        if pool.live_workers > pool.max {
            pool.live_workers -= 1;
            true
        } else {
            false
        }
    }

    /// Applies an attempt's outcome: terminal bookkeeping or requeue.
    pub(super) fn finish(&self, job: &JobHandle, outcome: Outcome) {
        let id = job.id();
        let mut state = self.state();
        let remove_requested = state.attempts.finish(id);

        match outcome {
            Outcome::Completed => {
                state.settle(job, JobState::Completed);
                self.completed.fetch_add(1, Ordering::Relaxed);
                tracing::info!(job = %id, "download completed");
                self.events.emit(SchedulerEvent::Completed { job: id });
            }
            _ if remove_requested => {
                state.settle(job, JobState::Removed);
                tracing::info!(job = %id, "download removed");
                self.events.emit(SchedulerEvent::Removed { job: id });
            }
            Outcome::Error => {
                let failures = job.record_failure(Instant::now());
                match self.config.retry.decide(failures) {
                    RetryDecision::Exhausted => {
                        state.settle(job, JobState::Exhausted);
                        tracing::warn!(
                            job = %id,
                            failures,
                            last_error = job.last_error().as_deref().unwrap_or("-"),
                            "retries exhausted; giving up"
                        );
                        self.events.emit(SchedulerEvent::RetryExhausted {
                            job: id,
                            attempts: failures,
                        });
                    }
                    RetryDecision::Requeue => {
                        job.set_state(JobState::Error);
                        state.requeue(job);
                        tracing::debug!(job = %id, failures, "attempt failed; requeued");
                        self.events.emit(SchedulerEvent::Requeued {
                            job: id,
                            reason: RequeueReason::Failed { failures },
                        });
                    }
                }
            }
            Outcome::Cancelled => {
                job.set_state(JobState::Interrupted);
                state.requeue(job);
                tracing::debug!(job = %id, priority = %job.priority(), "attempt interrupted; requeued");
                self.events.emit(SchedulerEvent::Requeued {
                    job: id,
                    reason: RequeueReason::Interrupted,
                });
            }
        }
    }
}
