//! Priority queue of pending constraint updates.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ahash::AHashMap;
use strata_common::ChunkId;

use crate::state::StateSet;

/// Constant subtracted from the priority of cross-boundary events so they
/// are serviced ahead of intra-chunk updates of equal entropy.
pub const BOUNDARY_PRIORITY_BOOST: f32 = 100.0;

/// A pending constraint update: the cell at `target_cell` changed its
/// possible set and its neighbours must be revisited.
#[derive(Debug, Clone)]
pub struct PropagationEvent {
    /// Linear index of the changed cell inside its chunk.
    pub target_cell: usize,
    /// Chunk the change originated from.
    pub source_chunk: ChunkId,
    /// Possible set before the change.
    pub old_possible: StateSet,
    /// Possible set after the change.
    pub new_possible: StateSet,
    /// True when the event arrived through a boundary buffer.
    pub crosses_boundary: bool,
    /// Smaller is processed first. Low-entropy targets and cross-boundary
    /// events sort ahead.
    pub priority: f32,
}

impl PropagationEvent {
    /// Computes the queue priority for a cell change.
    #[must_use]
    pub fn priority_for(new_entropy: usize, crosses_boundary: bool) -> f32 {
        let base = new_entropy as f32;
        if crosses_boundary {
            base - BOUNDARY_PRIORITY_BOOST
        } else {
            base
        }
    }
}

/// Heap entry; min-ordered by `(priority, sequence)`.
#[derive(Debug)]
struct QueueEntry {
    event: PropagationEvent,
    sequence: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for min-ordering.
        other
            .event
            .priority
            .total_cmp(&self.event.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Min-heap of propagation events with lazy per-cell deduplication.
///
/// When a newer event supersedes an older one for the same target cell, the
/// older entry stays in the heap and is discarded at pop time.
#[derive(Debug, Default)]
pub struct PropagationQueue {
    heap: BinaryHeap<QueueEntry>,
    /// Latest sequence number enqueued per target cell.
    latest: AHashMap<usize, u64>,
    next_sequence: u64,
}

impl PropagationQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues an event, superseding any earlier event for the same cell.
    pub fn push(&mut self, event: PropagationEvent) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.latest.insert(event.target_cell, sequence);
        self.heap.push(QueueEntry { event, sequence });
    }

    /// Pops the highest-priority live event, discarding superseded entries.
    pub fn pop(&mut self) -> Option<PropagationEvent> {
        while let Some(entry) = self.heap.pop() {
            match self.latest.get(&entry.event.target_cell) {
                Some(&seq) if seq == entry.sequence => {
                    self.latest.remove(&entry.event.target_cell);
                    return Some(entry.event);
                }
                // Superseded by a newer event; drop lazily.
                _ => {}
            }
        }
        None
    }

    /// Checks whether any live events remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Number of live (non-superseded) events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    /// Discards all events.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.latest.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateSet;

    fn event(target_cell: usize, priority: f32) -> PropagationEvent {
        PropagationEvent {
            target_cell,
            source_chunk: ChunkId::NULL,
            old_possible: StateSet::all(2),
            new_possible: StateSet::singleton(2, 0),
            crosses_boundary: false,
            priority,
        }
    }

    #[test]
    fn test_min_order() {
        let mut queue = PropagationQueue::new();
        queue.push(event(0, 5.0));
        queue.push(event(1, 1.0));
        queue.push(event(2, 3.0));

        let order: Vec<usize> = std::iter::from_fn(|| queue.pop())
            .map(|e| e.target_cell)
            .collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_fifo_among_equal_priorities() {
        let mut queue = PropagationQueue::new();
        queue.push(event(0, 2.0));
        queue.push(event(1, 2.0));
        queue.push(event(2, 2.0));

        let order: Vec<usize> = std::iter::from_fn(|| queue.pop())
            .map(|e| e.target_cell)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_dedup_keeps_newest() {
        let mut queue = PropagationQueue::new();
        queue.push(event(7, 1.0));
        let mut newer = event(7, 4.0);
        newer.new_possible = StateSet::singleton(2, 1);
        queue.push(newer);

        assert_eq!(queue.len(), 1);
        let popped = queue.pop().expect("one live event");
        assert_eq!(popped.target_cell, 7);
        assert!(popped.new_possible.contains(1));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_boundary_boost_sorts_first() {
        let mut queue = PropagationQueue::new();
        queue.push(event(0, PropagationEvent::priority_for(2, false)));
        queue.push(event(1, PropagationEvent::priority_for(8, true)));

        assert_eq!(queue.pop().expect("live").target_cell, 1);
    }
}
