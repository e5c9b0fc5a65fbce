//! Lifecycle notifications for presentation layers.

use tokio::sync::mpsc::UnboundedSender;

use crate::job::JobId;

/// Why a job went back into the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueReason {
    /// The attempt failed; `failures` attempts have failed so far.
    Failed { failures: u32 },
    /// The attempt was cancelled (pause or shutdown); not counted as a failure.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A worker holds a slot and the transfer is starting.
    Started { job: JobId, attempt: u32 },
    Completed { job: JobId },
    Requeued { job: JobId, reason: RequeueReason },
    /// The job failed `attempts` times and was dropped. The only failure
    /// reported outward.
    RetryExhausted { job: JobId, attempts: u32 },
    /// The job was cancelled by its owner and dropped.
    Removed { job: JobId },
}

/// Optional event channel; sends never block and a closed receiver is ignored.
#[derive(Debug, Clone, Default)]
pub(super) struct EventSink {
    tx: Option<UnboundedSender<SchedulerEvent>>,
}

impl EventSink {
    pub(super) fn new(tx: Option<UnboundedSender<SchedulerEvent>>) -> Self {
        Self { tx }
    }

    pub(super) fn emit(&self, event: SchedulerEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
