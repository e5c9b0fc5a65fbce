//! The scheduled unit: one file to download.
//!
//! A [`Job`] is created by the scheduler on submit and shared as a
//! [`JobHandle`]. Its identity and request are immutable; lifecycle fields
//! (state, priority, retry bookkeeping) sit behind a small mutex, and byte
//! progress is a pair of atomics the transfer thread updates per chunk.

mod priority;
mod progress;

pub use priority::{ParsePriorityError, Priority};
pub use progress::{format_size, TransferProgress};

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Process-unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        JobId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-unique identifier of a batch of jobs that are prioritized,
/// cancelled and reported together (one series, one season).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupId(u64);

impl GroupId {
    /// A fresh group id. Jobs join it through [`JobRequest::with_group`].
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        GroupId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// What to download and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Direct HTTP/HTTPS URL of the file.
    pub source_url: String,
    /// Directory the file is written into (created if missing).
    pub destination_dir: PathBuf,
    /// File name without extension, e.g. from [`crate::naming::episode_base_name`].
    /// When `None` the name is taken from the URL path.
    pub base_name: Option<String>,
    /// Batch the job belongs to, if any.
    pub group: Option<GroupId>,
}

impl JobRequest {
    pub fn new(source_url: impl Into<String>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            destination_dir: destination_dir.into(),
            base_name: None,
            group: None,
        }
    }

    pub fn with_base_name(mut self, base_name: impl Into<String>) -> Self {
        self.base_name = Some(base_name.into());
        self
    }

    pub fn with_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting in the queue.
    Queued,
    /// A transfer attempt is in flight.
    Downloading,
    /// The last attempt was cancelled; partial data is kept for resume.
    Interrupted,
    /// The last attempt failed and the job awaits a retry.
    Error,
    /// Finished; the file is complete on disk.
    Completed,
    /// Gave up after the maximum number of failed attempts.
    Exhausted,
    /// Cancelled by its owner and dropped from the scheduler.
    Removed,
}

impl JobState {
    pub fn label(self) -> &'static str {
        match self {
            JobState::Queued => "Queued",
            JobState::Downloading => "Downloading",
            JobState::Interrupted => "Interrupted",
            JobState::Error => "Error",
            JobState::Completed => "Completed",
            JobState::Exhausted => "Exhausted",
            JobState::Removed => "Removed",
        }
    }

    /// True once the scheduler no longer tracks the job.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Exhausted | JobState::Removed
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: JobState,
    priority: Priority,
    retry_count: u32,
    last_retry: Option<Instant>,
    last_error: Option<String>,
}

/// One download job. Shared between the scheduler, its workers and callers.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    request: JobRequest,
    progress: TransferProgress,
    lifecycle: Mutex<Lifecycle>,
}

/// Shared handle to a job.
pub type JobHandle = Arc<Job>;

impl Job {
    pub(crate) fn new(request: JobRequest, priority: Priority) -> Self {
        Self {
            id: JobId::next(),
            request,
            progress: TransferProgress::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: JobState::Queued,
                priority,
                retry_count: 0,
                last_retry: None,
                last_error: None,
            }),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn request(&self) -> &JobRequest {
        &self.request
    }

    pub fn source_url(&self) -> &str {
        &self.request.source_url
    }

    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }

    pub fn state(&self) -> JobState {
        self.lifecycle().state
    }

    /// Priority the job is (or will be re-)queued at.
    pub fn priority(&self) -> Priority {
        self.lifecycle().priority
    }

    /// Number of failed attempts so far. Cancelled attempts are not counted.
    pub fn retry_count(&self) -> u32 {
        self.lifecycle().retry_count
    }

    /// When the last failed attempt was recorded.
    pub fn last_retry(&self) -> Option<Instant> {
        self.lifecycle().last_retry
    }

    /// Message of the most recent failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.lifecycle().last_error.clone()
    }

    pub(crate) fn set_state(&self, state: JobState) {
        self.lifecycle().state = state;
    }

    pub(crate) fn set_priority(&self, priority: Priority) {
        self.lifecycle().priority = priority;
    }

    /// Counts a failed attempt at `now`; returns the new failure count.
    pub(crate) fn record_failure(&self, now: Instant) -> u32 {
        let mut lc = self.lifecycle();
        lc.retry_count += 1;
        lc.last_retry = Some(now);
        lc.retry_count
    }

    pub(crate) fn record_error(&self, message: impl Into<String>) {
        self.lifecycle().last_error = Some(message.into());
    }

    /// Point-in-time copy for presentation or persistence.
    pub fn snapshot(&self) -> JobSnapshot {
        let lc = self.lifecycle();
        JobSnapshot {
            id: self.id,
            source_url: self.request.source_url.clone(),
            destination_dir: self.request.destination_dir.clone(),
            base_name: self.request.base_name.clone(),
            group: self.request.group,
            state: lc.state,
            priority: lc.priority,
            retry_count: lc.retry_count,
            last_error: lc.last_error.clone(),
            downloaded_bytes: self.progress.downloaded_bytes(),
            total_size: self.progress.total_size(),
        }
    }
}

/// Serializable copy of a job's observable fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub source_url: String,
    pub destination_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
    pub state: JobState,
    pub priority: Priority,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub downloaded_bytes: u64,
    pub total_size: u64,
}
