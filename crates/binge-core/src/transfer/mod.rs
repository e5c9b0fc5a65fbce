//! Transfer executor: performs one download attempt for a job.
//!
//! The scheduler only sees the [`Transfer`] trait and the three-way
//! [`Outcome`]; [`CurlTransfer`] is the libcurl implementation used in
//! production. Attempts are blocking and run on tokio's blocking pool.

mod error;
mod response;
mod stream;

pub use error::TransferError;
pub use stream::download_resumable;

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::job::Job;
use crate::naming;

/// Result of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The whole file is on disk.
    Completed,
    /// The attempt failed; counts against the job's retry budget.
    Error,
    /// The attempt was stopped through its cancellation token. Not a failure.
    Cancelled,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Error => "error",
            Outcome::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Executes one attempt of a job. Called from a blocking thread; must return
/// promptly after `cancel` fires.
///
/// Implementations update `job.progress()` and may record a failure message
/// with the job; lifecycle state is owned by the scheduler.
pub trait Transfer: Send + Sync + 'static {
    fn execute(&self, job: &Job, cancel: &CancellationToken) -> Outcome;
}

/// Knobs for [`CurlTransfer`], usually from [`crate::config::BingeConfig::transfer_options`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    pub chunk_size: usize,
    pub connect_timeout: Duration,
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    pub user_agent: String,
    /// Extension (without dot) used when the URL has none.
    pub fallback_extension: String,
}

impl Default for TransferOptions {
    fn default() -> Self {
        crate::config::BingeConfig::default().transfer_options()
    }
}

/// HTTP(S) executor backed by libcurl.
#[derive(Debug, Clone, Default)]
pub struct CurlTransfer {
    options: TransferOptions,
}

impl CurlTransfer {
    pub fn new(options: TransferOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Where the job's file lands: its destination directory plus the name
    /// derived from its base name (or URL) and URL extension.
    pub fn target_path(&self, job: &Job) -> PathBuf {
        let request = job.request();
        let name = naming::file_name(
            &request.source_url,
            request.base_name.as_deref(),
            &self.options.fallback_extension,
        );
        request.destination_dir.join(name)
    }
}

impl Transfer for CurlTransfer {
    fn execute(&self, job: &Job, cancel: &CancellationToken) -> Outcome {
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        let dir = &job.request().destination_dir;
        if let Err(e) = fs::create_dir_all(dir) {
            tracing::warn!(job = %job.id(), dir = %dir.display(), "cannot create destination: {}", e);
            job.record_error(format!("creating {}: {}", dir.display(), e));
            return Outcome::Error;
        }
        let path = self.target_path(job);
        tracing::debug!(job = %job.id(), path = %path.display(), "transfer starting");

        match download_resumable(job.source_url(), &path, job.progress(), cancel, &self.options) {
            Ok(outcome) => {
                tracing::debug!(
                    job = %job.id(),
                    outcome = %outcome,
                    bytes = job.progress().downloaded_bytes(),
                    "transfer finished"
                );
                outcome
            }
            Err(e) => {
                tracing::warn!(job = %job.id(), url = %job.source_url(), "transfer failed: {}", e);
                job.record_error(e.to_string());
                Outcome::Error
            }
        }
    }
}
