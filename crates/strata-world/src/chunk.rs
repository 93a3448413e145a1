//! Chunk data structure and lifecycle.

use strata_common::{ChunkCoord, ChunkId, Direction};
use strata_wfc::{CellGrid, MirrorView, PropagationQueue, StateSet};

use crate::boundary::BoundaryBuffer;

/// Lifecycle of a loaded chunk. Transitions are driven exclusively by the
/// scheduler; an unloaded chunk is simply absent from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkLifecycle {
    /// Cells allocated, not yet collapsing.
    Loading,
    /// A collapse job is pending or running.
    Collapsing,
    /// Collapse finished (or its budget ran out); stable for consumers.
    Active,
    /// An unload has been requested.
    Unloading,
}

/// A cubic block of cells: the unit of scheduling and ownership.
#[derive(Debug)]
pub struct Chunk {
    /// Arena handle, unique for the store's lifetime.
    pub id: ChunkId,
    /// Lattice position.
    pub coord: ChunkCoord,
    /// The cell field.
    pub grid: CellGrid,
    /// Pending propagation events for this chunk.
    pub queue: PropagationQueue,
    /// Lifecycle state.
    pub lifecycle: ChunkLifecycle,
    /// Level-of-detail index.
    pub lod_level: u8,
    /// Iteration budget per collapse job at this LOD.
    pub max_iterations: u32,
    /// Constraint influence scale in `[0, 1]` at this LOD.
    pub constraint_influence: f32,
    /// True when every cell collapsed or the budget was exhausted.
    pub fully_collapsed: bool,
    /// True when a contradiction or unresolvable conflict touched this
    /// chunk; its contents are best-effort.
    pub degraded: bool,
    /// Neighbour chunk ids, indexed by direction.
    neighbours: [Option<ChunkId>; 6],
    /// Boundary buffers for faces with a resolved neighbour.
    buffers: [Option<BoundaryBuffer>; 6],
}

impl Chunk {
    /// Creates a chunk in the `Loading` state with every cell uncollapsed.
    #[must_use]
    pub fn new(
        id: ChunkId,
        coord: ChunkCoord,
        chunk_size: u32,
        num_states: u16,
        lod_level: u8,
        max_iterations: u32,
        constraint_influence: f32,
    ) -> Self {
        Self {
            id,
            coord,
            grid: CellGrid::new(chunk_size, num_states),
            queue: PropagationQueue::new(),
            lifecycle: ChunkLifecycle::Loading,
            lod_level,
            max_iterations,
            constraint_influence,
            fully_collapsed: false,
            degraded: false,
            neighbours: [None; 6],
            buffers: Default::default(),
        }
    }

    /// Neighbour id across face `dir`, if resolved.
    #[must_use]
    pub fn neighbour(&self, dir: Direction) -> Option<ChunkId> {
        self.neighbours[dir.as_index()]
    }

    /// Links a neighbour and allocates the face's boundary buffer.
    pub fn link_neighbour(&mut self, dir: Direction, id: ChunkId) {
        self.neighbours[dir.as_index()] = Some(id);
        self.buffers[dir.as_index()] =
            Some(BoundaryBuffer::new(dir, id, self.grid.face_cell_count()));
    }

    /// Severs a neighbour link and drops the face's boundary buffer.
    pub fn unlink_neighbour(&mut self, dir: Direction) {
        self.neighbours[dir.as_index()] = None;
        self.buffers[dir.as_index()] = None;
    }

    /// The boundary buffer for face `dir`, if a neighbour exists.
    #[must_use]
    pub fn buffer(&self, dir: Direction) -> Option<&BoundaryBuffer> {
        self.buffers[dir.as_index()].as_ref()
    }

    /// Mutable access to the boundary buffer for face `dir`.
    pub fn buffer_mut(&mut self, dir: Direction) -> Option<&mut BoundaryBuffer> {
        self.buffers[dir.as_index()].as_mut()
    }

    /// Splits the chunk into the disjoint parts a solver job needs: the
    /// grid, the event queue, and a read-only view of the mirrors.
    pub fn solver_parts(&mut self) -> (&mut CellGrid, &mut PropagationQueue, ChunkMirrors<'_>) {
        (
            &mut self.grid,
            &mut self.queue,
            ChunkMirrors {
                buffers: &self.buffers,
            },
        )
    }

    /// Exact fraction of collapsed cells in `[0, 1]`.
    #[must_use]
    pub fn collapsed_fraction(&self) -> f32 {
        self.grid.collapsed_count() as f32 / self.grid.cell_count() as f32
    }

    /// True when at least one cell has collapsed but not all.
    #[must_use]
    pub fn partially_collapsed(&self) -> bool {
        let collapsed = self.grid.collapsed_count();
        collapsed > 0 && collapsed < self.grid.cell_count()
    }

    /// Copies the possible sets of the face cells on `dir`, in face
    /// enumeration order. Used to refresh the neighbour's mirror.
    #[must_use]
    pub fn face_possible(&self, dir: Direction) -> Vec<StateSet> {
        (0..self.grid.face_cell_count())
            .map(|face_index| {
                let cell_index = self.grid.face_cell_index(dir, face_index);
                self.grid.cell(cell_index).possible().clone()
            })
            .collect()
    }
}

/// Read-only mirror view over a chunk's boundary buffers, handed to the
/// solver during a job.
#[derive(Debug, Clone, Copy)]
pub struct ChunkMirrors<'a> {
    buffers: &'a [Option<BoundaryBuffer>; 6],
}

impl MirrorView for ChunkMirrors<'_> {
    fn has_neighbour(&self, dir: Direction) -> bool {
        self.buffers[dir.as_index()].is_some()
    }

    fn mirror_possible(&self, dir: Direction, face_index: usize) -> Option<StateSet> {
        self.buffers[dir.as_index()]
            .as_ref()
            .and_then(|b| b.mirror(face_index).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk() -> Chunk {
        Chunk::new(ChunkId::next(), ChunkCoord::new(0, 0, 0), 4, 2, 0, 64, 1.0)
    }

    #[test]
    fn test_new_chunk_loading() {
        let c = chunk();
        assert_eq!(c.lifecycle, ChunkLifecycle::Loading);
        assert_eq!(c.grid.cell_count(), 64);
        assert!(!c.fully_collapsed);
        assert_eq!(c.collapsed_fraction(), 0.0);
    }

    #[test]
    fn test_link_and_unlink_neighbour() {
        let mut c = chunk();
        let other = ChunkId::next();
        assert!(c.neighbour(Direction::PosX).is_none());
        assert!(c.buffer(Direction::PosX).is_none());

        c.link_neighbour(Direction::PosX, other);
        assert_eq!(c.neighbour(Direction::PosX), Some(other));
        assert!(c.buffer(Direction::PosX).is_some());

        c.unlink_neighbour(Direction::PosX);
        assert!(c.neighbour(Direction::PosX).is_none());
        assert!(c.buffer(Direction::PosX).is_none());
    }

    #[test]
    fn test_mirror_view_reflects_buffers() {
        let mut c = chunk();
        c.link_neighbour(Direction::NegY, ChunkId::next());
        let (_, _, mirrors) = c.solver_parts();
        assert!(mirrors.has_neighbour(Direction::NegY));
        assert!(!mirrors.has_neighbour(Direction::PosY));
        // Mirror entries start unknown.
        assert!(mirrors.mirror_possible(Direction::NegY, 0).is_none());
    }

    #[test]
    fn test_face_possible_order() {
        let c = chunk();
        let face = c.face_possible(Direction::PosX);
        assert_eq!(face.len(), 16);
        for set in face {
            assert_eq!(set.len(), 2);
        }
    }
}
