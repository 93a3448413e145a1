//! Per-cell local constraints.

use ahash::AHashMap;
use strata_common::ChunkCoord;
use strata_wfc::State;

/// Per-cell bias table, keyed flat by `(chunk, cell index)`.
#[derive(Debug, Default, Clone)]
pub struct LocalConstraints {
    biases: AHashMap<(ChunkCoord, usize), AHashMap<State, f32>>,
}

impl LocalConstraints {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bias for one state of one cell, clamped to `[-1, 1]`.
    pub fn set(&mut self, chunk: ChunkCoord, cell_index: usize, state: State, bias: f32) {
        self.biases
            .entry((chunk, cell_index))
            .or_default()
            .insert(state, bias.clamp(-1.0, 1.0));
    }

    /// Removes the bias for one state of one cell. Returns true if a bias
    /// was present.
    pub fn remove(&mut self, chunk: ChunkCoord, cell_index: usize, state: State) -> bool {
        let Some(cell) = self.biases.get_mut(&(chunk, cell_index)) else {
            return false;
        };
        let removed = cell.remove(&state).is_some();
        if cell.is_empty() {
            self.biases.remove(&(chunk, cell_index));
        }
        removed
    }

    /// Removes every bias attached to a chunk. Returns the number of cells
    /// cleared.
    pub fn remove_chunk(&mut self, chunk: ChunkCoord) -> usize {
        let before = self.biases.len();
        self.biases.retain(|(coord, _), _| *coord != chunk);
        before - self.biases.len()
    }

    /// Looks up the bias map of one cell.
    #[must_use]
    pub fn get(&self, chunk: ChunkCoord, cell_index: usize) -> Option<&AHashMap<State, f32>> {
        self.biases.get(&(chunk, cell_index))
    }

    /// True when any cell of `chunk` carries a bias.
    #[must_use]
    pub fn touches_chunk(&self, chunk: ChunkCoord) -> bool {
        self.biases.keys().any(|(coord, _)| *coord == chunk)
    }

    /// Number of cells carrying at least one bias.
    #[must_use]
    pub fn len(&self) -> usize {
        self.biases.len()
    }

    /// True when no biases are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.biases.is_empty()
    }

    /// Iterates over all entries.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&(ChunkCoord, usize), &AHashMap<State, f32>)> + '_ {
        self.biases.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let mut locals = LocalConstraints::new();
        let chunk = ChunkCoord::new(1, 2, 3);
        locals.set(chunk, 7, 0, 0.5);
        locals.set(chunk, 7, 1, -0.25);

        let cell = locals.get(chunk, 7).expect("cell present");
        assert_eq!(cell.get(&0), Some(&0.5));
        assert_eq!(cell.get(&1), Some(&-0.25));

        assert!(locals.remove(chunk, 7, 0));
        assert!(!locals.remove(chunk, 7, 0));
        assert!(locals.remove(chunk, 7, 1));
        // Empty cells are pruned.
        assert!(locals.get(chunk, 7).is_none());
        assert!(locals.is_empty());
    }

    #[test]
    fn test_bias_clamped() {
        let mut locals = LocalConstraints::new();
        let chunk = ChunkCoord::new(0, 0, 0);
        locals.set(chunk, 0, 0, 5.0);
        locals.set(chunk, 0, 1, -5.0);
        let cell = locals.get(chunk, 0).expect("cell present");
        assert_eq!(cell.get(&0), Some(&1.0));
        assert_eq!(cell.get(&1), Some(&-1.0));
    }

    #[test]
    fn test_remove_chunk() {
        let mut locals = LocalConstraints::new();
        let a = ChunkCoord::new(0, 0, 0);
        let b = ChunkCoord::new(1, 0, 0);
        locals.set(a, 0, 0, 0.1);
        locals.set(a, 1, 0, 0.2);
        locals.set(b, 0, 0, 0.3);

        assert!(locals.touches_chunk(a));
        assert_eq!(locals.remove_chunk(a), 2);
        assert!(!locals.touches_chunk(a));
        assert!(locals.touches_chunk(b));
    }
}
