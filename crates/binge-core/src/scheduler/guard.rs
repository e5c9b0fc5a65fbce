//! RAII guard for one concurrency slot.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

use super::state::Shared;

/// Holds a semaphore permit for the length of one transfer. On drop the
/// permit goes back to the semaphore, or is forgotten while the pool still
/// owes permits from a shrink.
pub(super) struct SlotGuard {
    permit: Option<OwnedSemaphorePermit>,
    shared: Arc<Shared>,
}

impl SlotGuard {
    pub(super) fn new(permit: OwnedSemaphorePermit, shared: Arc<Shared>) -> Self {
        shared.in_flight.fetch_add(1, Ordering::Relaxed);
        Self {
            permit: Some(permit),
            shared,
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.shared.in_flight.fetch_sub(1, Ordering::Relaxed);
        let mut pool = self.shared.pool();
        if pool.debt > 0 {
            pool.debt -= 1;
            if let Some(permit) = self.permit.take() {
                permit.forget();
            }
        }
    }
}
