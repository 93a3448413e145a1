//! The chunk store: owner of all loaded chunks.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use strata_common::{ChunkCoord, ChunkId, Direction};

use crate::chunk::Chunk;
use crate::view::ChunkView;

/// Owns every loaded chunk, indexed both by id (the arena handle) and by
/// lattice coordinate.
///
/// Neighbour links are resolved when a chunk is inserted and severed when
/// it is removed; chunks never hold pointers to each other, only ids.
pub struct ChunkStore {
    chunks: DashMap<ChunkId, Arc<RwLock<Chunk>>>,
    by_coord: DashMap<ChunkCoord, ChunkId>,
    chunk_size: u32,
    num_states: u16,
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("chunk_size", &self.chunk_size)
            .field("num_states", &self.num_states)
            .field("loaded", &self.chunks.len())
            .finish()
    }
}

impl ChunkStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(chunk_size: u32, num_states: u16) -> Self {
        Self {
            chunks: DashMap::new(),
            by_coord: DashMap::new(),
            chunk_size,
            num_states,
        }
    }

    /// Returns the configured chunk size.
    #[must_use]
    pub const fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Returns the configured state count.
    #[must_use]
    pub const fn num_states(&self) -> u16 {
        self.num_states
    }

    /// Creates a chunk at `coord`, resolving neighbour links both ways.
    /// Returns the existing id if the coordinate is already loaded.
    pub fn create(
        &self,
        coord: ChunkCoord,
        lod_level: u8,
        max_iterations: u32,
        constraint_influence: f32,
    ) -> ChunkId {
        if let Some(existing) = self.by_coord.get(&coord) {
            return *existing;
        }

        let id = ChunkId::next();
        let mut chunk = Chunk::new(
            id,
            coord,
            self.chunk_size,
            self.num_states,
            lod_level,
            max_iterations,
            constraint_influence,
        );

        // Resolve neighbours: link both directions.
        for dir in Direction::ALL {
            let (dx, dy, dz) = dir.offset();
            let neighbour_coord = coord.offset(dx, dy, dz);
            if let Some(neighbour_id) = self.by_coord.get(&neighbour_coord).map(|e| *e) {
                chunk.link_neighbour(dir, neighbour_id);
                if let Some(neighbour) = self.chunks.get(&neighbour_id) {
                    neighbour.write().link_neighbour(dir.opposite(), id);
                }
            }
        }

        debug!(?coord, id = id.raw(), "chunk created");
        self.chunks.insert(id, Arc::new(RwLock::new(chunk)));
        self.by_coord.insert(coord, id);
        id
    }

    /// Removes the chunk at `coord`, severing neighbour links. Returns the
    /// removed chunk handle so in-flight consumers can finish.
    pub fn remove(&self, coord: ChunkCoord) -> Option<Arc<RwLock<Chunk>>> {
        let (_, id) = self.by_coord.remove(&coord)?;
        let (_, chunk) = self.chunks.remove(&id)?;

        for dir in Direction::ALL {
            let neighbour_id = chunk.read().neighbour(dir);
            if let Some(neighbour_id) = neighbour_id {
                if let Some(neighbour) = self.chunks.get(&neighbour_id) {
                    neighbour.write().unlink_neighbour(dir.opposite());
                }
            }
        }

        debug!(?coord, id = id.raw(), "chunk removed");
        Some(chunk)
    }

    /// Looks up a chunk by coordinate.
    #[must_use]
    pub fn get(&self, coord: ChunkCoord) -> Option<Arc<RwLock<Chunk>>> {
        let id = self.by_coord.get(&coord).map(|e| *e)?;
        self.get_by_id(id)
    }

    /// Looks up a chunk by id.
    #[must_use]
    pub fn get_by_id(&self, id: ChunkId) -> Option<Arc<RwLock<Chunk>>> {
        self.chunks.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Checks whether a coordinate is loaded.
    #[must_use]
    pub fn is_loaded(&self, coord: ChunkCoord) -> bool {
        self.by_coord.contains_key(&coord)
    }

    /// Number of loaded chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// True when nothing is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// All loaded coordinates, unordered.
    #[must_use]
    pub fn loaded_coords(&self) -> Vec<ChunkCoord> {
        self.by_coord.iter().map(|e| *e.key()).collect()
    }

    /// Takes a read-only snapshot of the chunk at `coord`, if loaded. The
    /// snapshot is taken under the chunk's read lock, so it never observes
    /// a job mid-flight.
    #[must_use]
    pub fn snapshot(&self, coord: ChunkCoord) -> Option<ChunkView> {
        let chunk = self.get(coord)?;
        let view = ChunkView::capture(&chunk.read());
        Some(view)
    }

    /// Snapshots every loaded chunk. Consumers iterate this for meshing.
    #[must_use]
    pub fn snapshot_all(&self) -> Vec<ChunkView> {
        self.chunks
            .iter()
            .map(|entry| ChunkView::capture(&entry.value().read()))
            .collect()
    }
}
