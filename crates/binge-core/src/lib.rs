//! Priority download scheduling with resumable HTTP transfers.
//!
//! [`scheduler::DownloadScheduler`] runs a bounded, resizable pool of workers
//! over a [`queue::IndexedPriorityQueue`]; [`transfer::CurlTransfer`] performs
//! each attempt, resuming partial files with byte ranges.

pub mod config;
pub mod job;
pub mod logging;
pub mod naming;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod transfer;

pub use job::{GroupId, Job, JobHandle, JobId, JobRequest, JobSnapshot, JobState, Priority};
pub use scheduler::{DownloadScheduler, GroupSummary, SchedulerConfig, SchedulerError, SchedulerEvent};
pub use transfer::{CurlTransfer, Outcome, Transfer, TransferOptions};
