//! Per-attempt cancellation for in-flight jobs.
//!
//! Every dequeued job is registered with a child of the scheduler's shutdown
//! token. Pause and cancel fire that token; the attempt notices at its next
//! suspension point or chunk boundary.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::job::JobId;

#[derive(Debug)]
struct Attempt {
    token: CancellationToken,
    remove_requested: bool,
}

/// Registry of job id -> attempt token. Lives inside the scheduler state
/// mutex, so registration is atomic with the dequeue that starts the attempt.
#[derive(Debug, Default)]
pub(super) struct AttemptRegistry {
    attempts: HashMap<JobId, Attempt>,
}

impl AttemptRegistry {
    /// Register a new attempt; returns the token to pass to the transfer.
    pub(super) fn register(&mut self, id: JobId, shutdown: &CancellationToken) -> CancellationToken {
        let token = shutdown.child_token();
        self.attempts.insert(
            id,
            Attempt {
                token: token.clone(),
                remove_requested: false,
            },
        );
        token
    }

    /// Drop the attempt; returns whether its owner asked for removal.
    pub(super) fn finish(&mut self, id: JobId) -> bool {
        self.attempts
            .remove(&id)
            .map(|a| a.remove_requested)
            .unwrap_or(false)
    }

    /// Cancel the attempt. Returns false if the job has no attempt in flight.
    pub(super) fn request_abort(&self, id: JobId) -> bool {
        match self.attempts.get(&id) {
            Some(attempt) => {
                attempt.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel the attempt and drop the job once it returns.
    pub(super) fn request_removal(&mut self, id: JobId) -> bool {
        match self.attempts.get_mut(&id) {
            Some(attempt) => {
                attempt.remove_requested = true;
                attempt.token.cancel();
                true
            }
            None => false,
        }
    }
}
