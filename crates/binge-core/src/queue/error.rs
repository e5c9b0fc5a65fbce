//! Queue usage errors.

use thiserror::Error;

/// Misuse of an [`IndexedPriorityQueue`](super::IndexedPriorityQueue).
///
/// These never describe a network or disk problem; the scheduler treats
/// `EmptyQueue` as "nothing to do yet" and the other two as caller bugs.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The element is already queued; re-prioritize it instead.
    #[error("element is already queued (use update_priority instead)")]
    DuplicateElement,
    /// The element is not in the queue.
    #[error("element is not in the queue")]
    NotFound,
    /// Dequeue on an empty queue.
    #[error("the queue is empty")]
    EmptyQueue,
}
