//! Per-group tallies: how many jobs of a batch were submitted and how each
//! of them ended.

use serde::Serialize;

use crate::job::{GroupId, JobId, JobState};

/// Progress of one [`GroupId`]. Counts only ever grow; a job is counted once,
/// when it leaves the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub group: GroupId,
    pub submitted: usize,
    pub completed: usize,
    pub removed: usize,
    /// Jobs that ran out of retries, in the order they gave up.
    pub exhausted: Vec<JobId>,
}

impl GroupSummary {
    pub(super) fn new(group: GroupId) -> Self {
        Self {
            group,
            submitted: 0,
            completed: 0,
            removed: 0,
            exhausted: Vec::new(),
        }
    }

    /// Jobs of the group still queued or in flight.
    pub fn pending(&self) -> usize {
        self.submitted
            .saturating_sub(self.completed + self.removed + self.exhausted.len())
    }

    /// Every submitted job has left the scheduler.
    pub fn is_finished(&self) -> bool {
        self.pending() == 0
    }

    pub(super) fn record(&mut self, id: JobId, terminal: JobState) {
        match terminal {
            JobState::Completed => self.completed += 1,
            JobState::Removed => self.removed += 1,
            JobState::Exhausted => self.exhausted.push(id),
            other => tracing::warn!(job = %id, state = %other, "non-terminal state not tallied"),
        }
    }
}
