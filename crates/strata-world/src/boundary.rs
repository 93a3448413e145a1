//! Boundary buffers and cross-face conflict handling.

use strata_common::{ChunkCoord, ChunkId, Direction};
use strata_wfc::{AdjacencyTable, CellGrid, State, StateSet};

/// Collapse provenance for a boundary face cell: when it collapsed and what
/// it could have been beforehand. Drives conflict resolution.
#[derive(Debug, Clone)]
pub struct FaceStamp {
    /// Monotonic scheduler counter at the time of the collapse.
    pub counter: u64,
    /// Coordinate of the chunk the collapse happened in (tie-break key).
    pub chunk: ChunkCoord,
    /// The cell's possible set just before it collapsed.
    pub pre_collapse: StateSet,
}

impl FaceStamp {
    /// Orders stamps: smaller counter first, chunk-coord lexicographic on
    /// ties.
    #[must_use]
    pub fn is_earlier_than(&self, other: &Self) -> bool {
        (self.counter, self.chunk) < (other.counter, other.chunk)
    }
}

/// A collapsed/collapsed incompatibility across a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryConflict {
    /// Face-enumeration index of the conflicting pair.
    pub face_index: usize,
    /// Collapsed state on the owning side.
    pub owner_state: State,
    /// Collapsed state on the mirrored side.
    pub neighbour_state: State,
}

/// How a conflict was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictOutcome {
    /// The owner collapsed later and was overwritten with a compatible
    /// state; the owner cell is tagged degraded.
    OverwriteOwner(State),
    /// The neighbour collapsed later and must be overwritten with this
    /// state; the neighbour cell is tagged degraded.
    OverwriteNeighbour(State),
    /// No compatible replacement exists; both cells are tagged degraded.
    BothDegraded,
}

/// Mirror of the opposite chunk's boundary face.
///
/// For face `dir` of chunk `A` facing chunk `B`: `mirror[i]` is a value
/// snapshot of the possible set of `B`'s cell at face index `i` on face
/// `opposite(dir)`. The pairing is by index under the fixed face
/// enumeration (see [`CellGrid::face_cell_index`]).
#[derive(Debug)]
pub struct BoundaryBuffer {
    dir: Direction,
    neighbour: ChunkId,
    mirror: Vec<Option<StateSet>>,
    /// Face indices whose mirror changed since the last propagation pass.
    dirty: Vec<usize>,
    /// Collapse stamps for the owner's face cells.
    stamps: Vec<Option<FaceStamp>>,
}

impl BoundaryBuffer {
    /// Creates an empty buffer for face `dir` facing `neighbour`.
    #[must_use]
    pub fn new(dir: Direction, neighbour: ChunkId, face_cells: usize) -> Self {
        Self {
            dir,
            neighbour,
            mirror: vec![None; face_cells],
            dirty: Vec::new(),
            stamps: vec![None; face_cells],
        }
    }

    /// The face this buffer mirrors across.
    #[must_use]
    pub const fn dir(&self) -> Direction {
        self.dir
    }

    /// The neighbouring chunk's id.
    #[must_use]
    pub const fn neighbour(&self) -> ChunkId {
        self.neighbour
    }

    /// The mirror snapshot at a face index, if one has been synced.
    #[must_use]
    pub fn mirror(&self, face_index: usize) -> Option<&StateSet> {
        self.mirror.get(face_index).and_then(Option::as_ref)
    }

    /// Updates one mirror entry. Returns true (and marks the index dirty)
    /// only when the snapshot actually changed, which keeps repeated syncs
    /// idempotent.
    pub fn set_mirror(&mut self, face_index: usize, possible: StateSet) -> bool {
        if face_index >= self.mirror.len() {
            return false;
        }
        if self.mirror[face_index].as_ref() == Some(&possible) {
            return false;
        }
        self.mirror[face_index] = Some(possible);
        if !self.dirty.contains(&face_index) {
            self.dirty.push(face_index);
        }
        true
    }

    /// Replaces the whole mirror from the neighbour's face, in face
    /// enumeration order. Returns the number of entries that changed.
    pub fn sync_from_face(&mut self, neighbour_face: &[StateSet]) -> usize {
        let mut changed = 0;
        for (face_index, possible) in neighbour_face.iter().enumerate() {
            if self.set_mirror(face_index, possible.clone()) {
                changed += 1;
            }
        }
        changed
    }

    /// Drains the dirty face indices accumulated since the last call.
    pub fn take_dirty(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.dirty)
    }

    /// True when mirror updates await propagation.
    #[must_use]
    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Records the collapse stamp of the owner's face cell. The first
    /// stamp wins; a cell collapses once.
    pub fn record_stamp(&mut self, face_index: usize, stamp: FaceStamp) {
        if let Some(slot) = self.stamps.get_mut(face_index) {
            if slot.is_none() {
                *slot = Some(stamp);
            }
        }
    }

    /// The collapse stamp of the owner's face cell, if recorded.
    #[must_use]
    pub fn stamp(&self, face_index: usize) -> Option<&FaceStamp> {
        self.stamps.get(face_index).and_then(Option::as_ref)
    }

    /// Scans for collapsed/collapsed pairs that violate the adjacency
    /// table.
    #[must_use]
    pub fn detect_conflicts(
        &self,
        owner: &CellGrid,
        adjacency: &AdjacencyTable,
    ) -> Vec<BoundaryConflict> {
        let mut conflicts = Vec::new();
        for face_index in 0..self.mirror.len() {
            let Some(mirror) = self.mirror(face_index) else {
                continue;
            };
            let Some(neighbour_state) = mirror.sole_state() else {
                continue;
            };
            let cell = owner.cell(owner.face_cell_index(self.dir, face_index));
            let Some(owner_state) = cell.collapsed() else {
                continue;
            };
            if !adjacency.allowed(owner_state, neighbour_state, self.dir) {
                conflicts.push(BoundaryConflict {
                    face_index,
                    owner_state,
                    neighbour_state,
                });
            }
        }
        conflicts
    }
}

/// Settles one conflict between the owner's face cell and its mirrored
/// counterpart.
///
/// The later collapse loses and is overwritten with a state compatible
/// with the earlier one, drawn from the loser's pre-collapse possible set;
/// when no such state exists both sides are degraded. A missing stamp
/// counts as earliest (the collapse predates stamp tracking, e.g. a
/// seeded cell).
#[must_use]
pub fn resolve_conflict(
    adjacency: &AdjacencyTable,
    dir: Direction,
    conflict: &BoundaryConflict,
    owner_stamp: Option<&FaceStamp>,
    neighbour_stamp: Option<&FaceStamp>,
) -> ConflictOutcome {
    let owner_is_earlier = match (owner_stamp, neighbour_stamp) {
        (Some(a), Some(b)) => a.is_earlier_than(b),
        (None, Some(_)) => true,
        (Some(_), None) => false,
        (None, None) => true,
    };

    if owner_is_earlier {
        // Neighbour loses: find a state compatible with the owner's,
        // looking from the owner towards the neighbour.
        let compatible = adjacency.support_mask(conflict.owner_state, dir);
        let replacement = neighbour_stamp
            .map(|s| {
                let mut candidates = s.pre_collapse.clone();
                candidates.intersect_with(compatible);
                candidates
            })
            .and_then(|c| c.iter().next());
        match replacement {
            Some(state) => ConflictOutcome::OverwriteNeighbour(state),
            None => ConflictOutcome::BothDegraded,
        }
    } else {
        let compatible = adjacency.support_mask(conflict.neighbour_state, dir.opposite());
        let replacement = owner_stamp
            .map(|s| {
                let mut candidates = s.pre_collapse.clone();
                candidates.intersect_with(compatible);
                candidates
            })
            .and_then(|c| c.iter().next());
        match replacement {
            Some(state) => ConflictOutcome::OverwriteOwner(state),
            None => ConflictOutcome::BothDegraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_wfc::AdjacencyBuilder;

    fn equal_only_table(num_states: u16) -> AdjacencyTable {
        let mut builder = AdjacencyBuilder::new(num_states);
        for s in 0..num_states {
            builder.allow_all_directions(s, s);
        }
        builder.build().expect("symmetric by construction")
    }

    #[test]
    fn test_sync_idempotent() {
        let mut buffer = BoundaryBuffer::new(Direction::PosX, ChunkId::next(), 4);
        let face = vec![StateSet::all(2); 4];

        assert_eq!(buffer.sync_from_face(&face), 4);
        let _ = buffer.take_dirty();
        // Second sync with no intervening mutation changes nothing.
        assert_eq!(buffer.sync_from_face(&face), 0);
        assert!(!buffer.has_dirty());
    }

    #[test]
    fn test_set_mirror_tracks_dirty() {
        let mut buffer = BoundaryBuffer::new(Direction::PosX, ChunkId::next(), 4);
        assert!(buffer.set_mirror(1, StateSet::singleton(2, 0)));
        assert!(buffer.set_mirror(2, StateSet::singleton(2, 1)));
        // Same value again: no dirt.
        assert!(!buffer.set_mirror(1, StateSet::singleton(2, 0)));
        assert_eq!(buffer.take_dirty(), vec![1, 2]);
        assert!(!buffer.has_dirty());
    }

    #[test]
    fn test_detect_conflicts() {
        let table = equal_only_table(2);
        let mut owner = CellGrid::new(4, 2);
        let mut buffer = BoundaryBuffer::new(Direction::PosX, ChunkId::next(), 16);

        // Owner face cell 0 collapses to 0; mirror says neighbour is 1.
        let cell_index = owner.face_cell_index(Direction::PosX, 0);
        owner.collapse(cell_index, 0);
        buffer.set_mirror(0, StateSet::singleton(2, 1));
        // Compatible pair on face index 1.
        let other_index = owner.face_cell_index(Direction::PosX, 1);
        owner.collapse(other_index, 1);
        buffer.set_mirror(1, StateSet::singleton(2, 1));

        let conflicts = buffer.detect_conflicts(&owner, &table);
        assert_eq!(
            conflicts,
            vec![BoundaryConflict {
                face_index: 0,
                owner_state: 0,
                neighbour_state: 1,
            }]
        );
    }

    fn stamp(counter: u64, chunk: ChunkCoord, pre: StateSet) -> FaceStamp {
        FaceStamp {
            counter,
            chunk,
            pre_collapse: pre,
        }
    }

    #[test]
    fn test_resolve_later_side_overwritten() {
        let table = equal_only_table(3);
        let conflict = BoundaryConflict {
            face_index: 0,
            owner_state: 0,
            neighbour_state: 1,
        };
        // Owner collapsed first; neighbour could have been 0.
        let owner_stamp = stamp(1, ChunkCoord::new(0, 0, 0), StateSet::all(3));
        let neighbour_stamp = stamp(2, ChunkCoord::new(1, 0, 0), StateSet::all(3));

        let outcome = resolve_conflict(
            &table,
            Direction::PosX,
            &conflict,
            Some(&owner_stamp),
            Some(&neighbour_stamp),
        );
        assert_eq!(outcome, ConflictOutcome::OverwriteNeighbour(0));
    }

    #[test]
    fn test_resolve_no_compatible_degrades_both() {
        let table = equal_only_table(3);
        let conflict = BoundaryConflict {
            face_index: 0,
            owner_state: 0,
            neighbour_state: 1,
        };
        // The loser's pre-collapse set never contained the winner's state.
        let owner_stamp = stamp(1, ChunkCoord::new(0, 0, 0), StateSet::all(3));
        let mut pre = StateSet::empty(3);
        pre.insert(1);
        pre.insert(2);
        let neighbour_stamp = stamp(2, ChunkCoord::new(1, 0, 0), pre);

        let outcome = resolve_conflict(
            &table,
            Direction::PosX,
            &conflict,
            Some(&owner_stamp),
            Some(&neighbour_stamp),
        );
        assert_eq!(outcome, ConflictOutcome::BothDegraded);
    }

    #[test]
    fn test_resolve_tie_breaks_lexicographically() {
        let table = equal_only_table(2);
        let conflict = BoundaryConflict {
            face_index: 0,
            owner_state: 0,
            neighbour_state: 1,
        };
        // Equal counters: the smaller chunk coordinate counts as earlier.
        let owner_stamp = stamp(5, ChunkCoord::new(0, 0, 0), StateSet::all(2));
        let neighbour_stamp = stamp(5, ChunkCoord::new(1, 0, 0), StateSet::all(2));

        let outcome = resolve_conflict(
            &table,
            Direction::PosX,
            &conflict,
            Some(&owner_stamp),
            Some(&neighbour_stamp),
        );
        assert_eq!(outcome, ConflictOutcome::OverwriteNeighbour(0));
    }

    #[test]
    fn test_missing_stamp_counts_as_earliest() {
        let table = equal_only_table(2);
        let conflict = BoundaryConflict {
            face_index: 0,
            owner_state: 0,
            neighbour_state: 1,
        };
        let neighbour_stamp = stamp(1, ChunkCoord::new(1, 0, 0), StateSet::all(2));

        let outcome = resolve_conflict(
            &table,
            Direction::PosX,
            &conflict,
            None,
            Some(&neighbour_stamp),
        );
        assert_eq!(outcome, ConflictOutcome::OverwriteNeighbour(0));
    }
}
