//! Read-only chunk snapshots for consumers.

use strata_common::{ChunkCoord, LocalCoord};
use strata_wfc::{State, StateSet};

use crate::chunk::{Chunk, ChunkLifecycle};

/// Snapshot of one cell.
#[derive(Debug, Clone)]
pub struct CellView {
    /// Collapsed state, if any.
    pub collapsed: Option<State>,
    /// Possible-state set at snapshot time.
    pub possible: StateSet,
    /// True when conflict resolution degraded this cell.
    pub degraded: bool,
}

/// Read-only copy of a chunk's cells, taken under the chunk's lock.
///
/// Meshers and visualisers consume this; it stays valid after the chunk
/// itself has moved on or unloaded.
#[derive(Debug, Clone)]
pub struct ChunkView {
    /// Lattice position.
    pub coord: ChunkCoord,
    /// Cubic side length.
    pub size: u32,
    /// Lifecycle at snapshot time.
    pub lifecycle: ChunkLifecycle,
    /// LOD index at snapshot time.
    pub lod_level: u8,
    /// True when the chunk finished collapsing (or exhausted its budget).
    pub fully_collapsed: bool,
    /// Exact collapsed-cell fraction at snapshot time.
    pub collapsed_fraction: f32,
    /// Cell snapshots in x-fastest order.
    pub cells: Vec<CellView>,
}

impl ChunkView {
    /// Takes a snapshot of `chunk`.
    #[must_use]
    pub fn capture(chunk: &Chunk) -> Self {
        Self {
            coord: chunk.coord,
            size: chunk.grid.size(),
            lifecycle: chunk.lifecycle,
            lod_level: chunk.lod_level,
            fully_collapsed: chunk.fully_collapsed,
            collapsed_fraction: chunk.collapsed_fraction(),
            cells: chunk
                .grid
                .cells()
                .iter()
                .map(|cell| CellView {
                    collapsed: cell.collapsed(),
                    possible: cell.possible().clone(),
                    degraded: cell.degraded,
                })
                .collect(),
        }
    }

    /// Gets a cell snapshot at local coordinates.
    #[must_use]
    pub fn get(&self, x: u16, y: u16, z: u16) -> Option<&CellView> {
        let size = self.size as u16;
        if x >= size || y >= size || z >= size {
            return None;
        }
        self.cells.get(LocalCoord::new(x, y, z).to_index(self.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::ChunkId;

    #[test]
    fn test_capture_copies_cells() {
        let mut chunk = Chunk::new(ChunkId::next(), ChunkCoord::new(1, 0, -1), 4, 3, 2, 64, 0.5);
        chunk.grid.collapse(0, 2);

        let view = ChunkView::capture(&chunk);
        assert_eq!(view.coord, ChunkCoord::new(1, 0, -1));
        assert_eq!(view.lod_level, 2);
        assert_eq!(view.cells.len(), 64);
        assert_eq!(view.get(0, 0, 0).expect("in range").collapsed, Some(2));
        assert!(view.get(4, 0, 0).is_none());
        assert!((view.collapsed_fraction - 1.0 / 64.0).abs() < 1e-6);

        // Mutating the chunk afterwards leaves the view untouched.
        chunk.grid.collapse(1, 1);
        assert_eq!(view.get(1, 0, 0).expect("in range").collapsed, None);
    }
}
