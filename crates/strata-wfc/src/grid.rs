//! Fixed-size 3D cell field with entropy bookkeeping.

use strata_common::{Direction, LocalCoord};

use crate::cell::Cell;
use crate::state::{State, StateSet};

/// Outcome of shrinking a cell's possible set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkOutcome {
    /// The mask did not remove anything.
    Unchanged,
    /// The set shrank and more than one state remains.
    Shrunk,
    /// The set shrank to exactly one state (implicit collapse).
    Collapsed,
    /// The set shrank to zero states.
    Contradiction,
}

/// A cubic `C x C x C` array of cells, `x` varying fastest, then `y`,
/// then `z`.
#[derive(Debug, Clone)]
pub struct CellGrid {
    cells: Vec<Cell>,
    size: u32,
    num_states: u16,
}

impl CellGrid {
    /// Creates a grid of uncollapsed cells and marks the outer-face cells
    /// as boundary cells.
    #[must_use]
    pub fn new(size: u32, num_states: u16) -> Self {
        let count = (size * size * size) as usize;
        let mut cells = vec![Cell::new(num_states); count];
        let max = (size - 1) as u16;
        for (index, cell) in cells.iter_mut().enumerate() {
            let local = LocalCoord::from_index(index, size);
            let dir = Self::first_face(local, max);
            if let Some(dir) = dir {
                cell.is_boundary = true;
                cell.boundary_dir = Some(dir);
            }
        }
        Self {
            cells,
            size,
            num_states,
        }
    }

    fn first_face(local: LocalCoord, max: u16) -> Option<Direction> {
        // First matching face in the fixed direction order.
        for dir in Direction::ALL {
            let on_face = match dir {
                Direction::NegX => local.x == 0,
                Direction::PosX => local.x == max,
                Direction::NegY => local.y == 0,
                Direction::PosY => local.y == max,
                Direction::NegZ => local.z == 0,
                Direction::PosZ => local.z == max,
            };
            if on_face {
                return Some(dir);
            }
        }
        None
    }

    /// Returns the cubic side length.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Returns the state count cells were sized for.
    #[must_use]
    pub const fn num_states(&self) -> u16 {
        self.num_states
    }

    /// Returns the total cell count.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Gets a cell at local coordinates.
    #[must_use]
    pub fn get(&self, x: u16, y: u16, z: u16) -> Option<&Cell> {
        let size = self.size as u16;
        if x >= size || y >= size || z >= size {
            return None;
        }
        self.cells.get(LocalCoord::new(x, y, z).to_index(self.size))
    }

    /// Gets a cell by linear index.
    #[must_use]
    pub fn cell(&self, index: usize) -> &Cell {
        &self.cells[index]
    }

    /// Gets a cell by linear index, mutably.
    pub fn cell_mut(&mut self, index: usize) -> &mut Cell {
        &mut self.cells[index]
    }

    /// Returns a slice of all cells.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Intersects the possible set of the cell at `index` with `mask`.
    pub fn intersect_possible(&mut self, index: usize, mask: &StateSet) -> ShrinkOutcome {
        let cell = &mut self.cells[index];
        if !cell.intersect_possible(mask) {
            return ShrinkOutcome::Unchanged;
        }
        match cell.entropy() {
            0 => ShrinkOutcome::Contradiction,
            1 => ShrinkOutcome::Collapsed,
            _ => ShrinkOutcome::Shrunk,
        }
    }

    /// Collapses the cell at `index` to `state`.
    pub fn collapse(&mut self, index: usize, state: State) {
        self.cells[index].collapse(state);
    }

    /// Returns the linear index of the neighbouring cell in `dir`, or None
    /// when the neighbour lies outside the grid.
    #[must_use]
    pub fn neighbour_index(&self, index: usize, dir: Direction) -> Option<usize> {
        let local = LocalCoord::from_index(index, self.size);
        let (dx, dy, dz) = dir.offset();
        let size = self.size as i32;
        let nx = i32::from(local.x) + dx;
        let ny = i32::from(local.y) + dy;
        let nz = i32::from(local.z) + dz;
        if nx < 0 || nx >= size || ny < 0 || ny >= size || nz < 0 || nz >= size {
            return None;
        }
        Some(LocalCoord::new(nx as u16, ny as u16, nz as u16).to_index(self.size))
    }

    /// Checks whether the cell at `index` lies on the outer face `dir`.
    #[must_use]
    pub fn on_face(&self, index: usize, dir: Direction) -> bool {
        let local = LocalCoord::from_index(index, self.size);
        let max = (self.size - 1) as u16;
        match dir {
            Direction::NegX => local.x == 0,
            Direction::PosX => local.x == max,
            Direction::NegY => local.y == 0,
            Direction::PosY => local.y == max,
            Direction::NegZ => local.z == 0,
            Direction::PosZ => local.z == max,
        }
    }

    /// Returns the face-enumeration index of a boundary cell on face `dir`.
    ///
    /// The enumeration is fixed: for `±X` faces it runs over `(y, z)` with
    /// `z` fastest, for `±Y` over `(x, z)` with `z` fastest, and for `±Z`
    /// over `(x, y)` with `y` fastest. Position `i` on face `d` of a chunk
    /// pairs with position `i` on face `-d` of its neighbour.
    #[must_use]
    pub fn face_index_of(&self, index: usize, dir: Direction) -> usize {
        let local = LocalCoord::from_index(index, self.size);
        let size = self.size as usize;
        match dir {
            Direction::NegX | Direction::PosX => local.y as usize * size + local.z as usize,
            Direction::NegY | Direction::PosY => local.x as usize * size + local.z as usize,
            Direction::NegZ | Direction::PosZ => local.x as usize * size + local.y as usize,
        }
    }

    /// Returns the linear cell index of the `face_index`-th cell on face
    /// `dir`.
    #[must_use]
    pub fn face_cell_index(&self, dir: Direction, face_index: usize) -> usize {
        let size = self.size as usize;
        let max = (self.size - 1) as u16;
        let hi = (face_index / size) as u16;
        let lo = (face_index % size) as u16;
        let local = match dir {
            Direction::NegX => LocalCoord::new(0, hi, lo),
            Direction::PosX => LocalCoord::new(max, hi, lo),
            Direction::NegY => LocalCoord::new(hi, 0, lo),
            Direction::PosY => LocalCoord::new(hi, max, lo),
            Direction::NegZ => LocalCoord::new(hi, lo, 0),
            Direction::PosZ => LocalCoord::new(hi, lo, max),
        };
        local.to_index(self.size)
    }

    /// Number of cells on one face.
    #[must_use]
    pub fn face_cell_count(&self) -> usize {
        (self.size * self.size) as usize
    }

    /// Counts collapsed cells.
    #[must_use]
    pub fn collapsed_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_collapsed()).count()
    }

    /// Counts degraded cells.
    #[must_use]
    pub fn degraded_count(&self) -> usize {
        self.cells.iter().filter(|c| c.degraded).count()
    }
}
