//! Indexed binary min-heap.
//!
//! A priority queue over unique elements that, besides the usual push/pop,
//! can change the priority of a queued element in O(log n). A side table maps
//! each element to its slot in the heap array; every swap updates both slots of
//! that table together with the array.
//!
//! Lower priority values are served first. Ties are not FIFO: the order among
//! equal priorities falls out of the sift operations, which are deterministic
//! for a given sequence of calls.

mod error;

pub use error::QueueError;

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Entry<E, P> {
    element: E,
    priority: P,
}

/// Min-heap of `(element, priority)` pairs with O(1) membership lookup.
///
/// Not internally synchronized; the scheduler keeps it behind its state mutex.
#[derive(Debug, Clone)]
pub struct IndexedPriorityQueue<E, P> {
    heap: Vec<Entry<E, P>>,
    slots: HashMap<E, usize>,
}

impl<E, P> Default for IndexedPriorityQueue<E, P> {
    fn default() -> Self {
        Self {
            heap: Vec::new(),
            slots: HashMap::new(),
        }
    }
}

impl<E, P> IndexedPriorityQueue<E, P>
where
    E: Eq + Hash + Clone,
    P: Ord,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued elements.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// True if `element` is currently queued. O(1).
    pub fn contains(&self, element: &E) -> bool {
        self.slots.contains_key(element)
    }

    /// Current priority of `element`, if queued.
    pub fn priority_of(&self, element: &E) -> Option<&P> {
        self.slots.get(element).map(|&i| &self.heap[i].priority)
    }

    /// The element that `dequeue` would return next, without removing it.
    pub fn peek(&self) -> Option<(&E, &P)> {
        self.heap.first().map(|e| (&e.element, &e.priority))
    }

    /// Queued elements in heap-array order (not priority order).
    pub fn iter(&self) -> impl Iterator<Item = (&E, &P)> {
        self.heap.iter().map(|e| (&e.element, &e.priority))
    }

    /// Adds `element` with `priority`. O(log n).
    ///
    /// Fails with [`QueueError::DuplicateElement`] if it is already queued; the
    /// existing entry is left untouched.
    pub fn enqueue(&mut self, element: E, priority: P) -> Result<(), QueueError> {
        if self.slots.contains_key(&element) {
            return Err(QueueError::DuplicateElement);
        }
        let index = self.heap.len();
        self.slots.insert(element.clone(), index);
        self.heap.push(Entry { element, priority });
        self.sift_up(index);
        Ok(())
    }

    /// Removes and returns the element with the lowest priority value. O(log n).
    pub fn dequeue(&mut self) -> Result<E, QueueError> {
        if self.heap.is_empty() {
            return Err(QueueError::EmptyQueue);
        }
        Ok(self.take_at(0).element)
    }

    /// Moves `element` to `priority`. O(log n); a no-op if the priority is unchanged.
    pub fn update_priority(&mut self, element: &E, priority: P) -> Result<(), QueueError> {
        let index = *self.slots.get(element).ok_or(QueueError::NotFound)?;
        let entry = &mut self.heap[index];
        if entry.priority == priority {
            return Ok(());
        }
        let raised = priority < entry.priority;
        entry.priority = priority;
        if raised {
            self.sift_up(index);
        } else {
            self.sift_down(index);
        }
        Ok(())
    }

    /// Removes `element` wherever it sits in the heap and returns its priority. O(log n).
    pub fn remove(&mut self, element: &E) -> Result<P, QueueError> {
        let index = *self.slots.get(element).ok_or(QueueError::NotFound)?;
        Ok(self.take_at(index).priority)
    }

    /// Detaches the entry at `index`: the tail moves into the hole and is then
    /// sifted whichever way restores the heap.
    fn take_at(&mut self, index: usize) -> Entry<E, P> {
        let last = self.heap.len() - 1;
        self.swap(index, last);
        let taken = match self.heap.pop() {
            Some(entry) => entry,
            None => unreachable!("take_at on an empty heap"),
        };
        self.slots.remove(&taken.element);
        if index < self.heap.len() {
            self.sift_up(index);
            self.sift_down(index);
        }
        taken
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.heap[index].priority < self.heap[parent].priority {
                self.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    /// On equal children the left one wins, so the walk is deterministic.
    fn sift_down(&mut self, mut index: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;
            if left < len && self.heap[left].priority < self.heap[smallest].priority {
                smallest = left;
            }
            if right < len && self.heap[right].priority < self.heap[smallest].priority {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.swap(index, smallest);
            index = smallest;
        }
    }

    /// Swaps two heap slots and both of their index entries.
    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        if let Some(slot) = self.slots.get_mut(&self.heap[a].element) {
            *slot = a;
        }
        if let Some(slot) = self.slots.get_mut(&self.heap[b].element) {
            *slot = b;
        }
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        assert_eq!(self.slots.len(), self.heap.len(), "index size mismatch");
        for (i, entry) in self.heap.iter().enumerate() {
            assert_eq!(self.slots.get(&entry.element), Some(&i), "stale index");
            if i > 0 {
                let parent = (i - 1) / 2;
                assert!(
                    self.heap[parent].priority <= entry.priority,
                    "heap order violated at slot {}",
                    i
                );
            }
        }
    }
}
