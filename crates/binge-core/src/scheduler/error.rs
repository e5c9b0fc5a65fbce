use thiserror::Error;

use crate::job::{GroupId, JobId};
use crate::queue::QueueError;

/// Errors returned by [`super::DownloadScheduler`] calls. Per-job transfer
/// failures are never surfaced here; they drive retries instead.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    #[error("unknown group {0}")]
    UnknownGroup(GroupId),
    #[error("scheduler is shut down")]
    ShutDown,
    #[error("download scheduler must be created inside a tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
