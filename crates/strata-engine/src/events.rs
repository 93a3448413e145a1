//! Event bus for engine-to-host notifications.

use crossbeam_channel::{bounded, Receiver, Sender};
use strata_common::{ChunkCoord, Direction};
use strata_world::ChunkLifecycle;

/// Events the engine surfaces to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A chunk entered a new lifecycle state.
    ChunkStateChanged {
        /// Chunk coordinate
        coord: ChunkCoord,
        /// New lifecycle state
        lifecycle: ChunkLifecycle,
    },
    /// A chunk finished loading and is available to consumers.
    ChunkLoaded {
        /// Chunk coordinate
        coord: ChunkCoord,
    },
    /// A chunk was removed from the store.
    ChunkUnloaded {
        /// Chunk coordinate
        coord: ChunkCoord,
    },
    /// Two collapsed face cells disagreed across a boundary.
    BoundaryConflict {
        /// Chunk that reported the conflict
        coord: ChunkCoord,
        /// Face the conflict sits on
        dir: Direction,
        /// Face-enumeration index of the pair
        face_index: usize,
        /// True when no compatible replacement existed and both cells were
        /// degraded
        both_degraded: bool,
    },
    /// A cell's possible set became empty.
    Contradiction {
        /// Chunk the contradiction happened in
        coord: ChunkCoord,
    },
}

/// Bounded event bus: non-blocking publish, drained by the host.
#[derive(Debug)]
pub struct EventBus {
    /// Sender for broadcasting events
    sender: Sender<EngineEvent>,
    /// Receiver for collecting events
    receiver: Receiver<EngineEvent>,
    /// Channel capacity
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Publishes an event to the bus.
    pub fn publish(&self, event: EngineEvent) {
        // Non-blocking send - if full, event is dropped
        let _ = self.sender.try_send(event);
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new sender handle for publishing events.
    #[must_use]
    pub fn sender(&self) -> Sender<EngineEvent> {
        self.sender.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_drain() {
        let bus = EventBus::new(8);
        bus.publish(EngineEvent::ChunkLoaded {
            coord: ChunkCoord::new(0, 0, 0),
        });
        bus.publish(EngineEvent::ChunkUnloaded {
            coord: ChunkCoord::new(1, 0, 0),
        });
        assert_eq!(bus.pending_count(), 2);

        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_full_bus_drops_instead_of_blocking() {
        let bus = EventBus::new(1);
        bus.publish(EngineEvent::ChunkLoaded {
            coord: ChunkCoord::new(0, 0, 0),
        });
        bus.publish(EngineEvent::ChunkLoaded {
            coord: ChunkCoord::new(1, 0, 0),
        });
        assert_eq!(bus.drain().len(), 1);
    }
}
