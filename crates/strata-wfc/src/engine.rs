//! Per-chunk Wave Function Collapse solver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, trace};

use strata_common::{ChunkId, Direction};

use crate::adjacency::AdjacencyTable;
use crate::grid::{CellGrid, ShrinkOutcome};
use crate::queue::{PropagationEvent, PropagationQueue};
use crate::state::{State, StateSet};

/// Effective-entropy multipliers applied at the influence thresholds below.
const INFLUENCE_MULTIPLIERS: [f32; 3] = [0.5, 0.7, 0.9];

/// Influence-magnitude thresholds, paired with `INFLUENCE_MULTIPLIERS`.
const INFLUENCE_THRESHOLDS: [f32; 3] = [0.7, 0.4, 0.2];

/// Floor for collapse weights, keeping negatively biased states drawable.
const MIN_STATE_WEIGHT: f32 = 0.1;

/// Per-state bias lookup the solver consults while observing and collapsing.
///
/// The constraint model implements this over its cached per-chunk bias maps;
/// tests use [`UniformBias`].
pub trait BiasProvider {
    /// Bias for `state` at the cell, in `[-1, 1]`.
    fn state_bias(&self, cell_index: usize, state: State) -> f32;

    /// Magnitude of the strongest bias at the cell, in `[0, 1]`. Drives the
    /// effective-entropy scaling.
    fn influence(&self, cell_index: usize) -> f32;
}

/// A bias provider with no opinion: all biases zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformBias;

impl BiasProvider for UniformBias {
    fn state_bias(&self, _cell_index: usize, _state: State) -> f32 {
        0.0
    }

    fn influence(&self, _cell_index: usize) -> f32 {
        0.0
    }
}

/// Read-only view of the boundary mirrors surrounding a chunk.
///
/// The solver never mutates a neighbour's grid; it only reads mirror
/// snapshots and reports outbound events for faces that have a neighbour.
pub trait MirrorView {
    /// True when a neighbouring chunk exists across face `dir`.
    fn has_neighbour(&self, dir: Direction) -> bool;

    /// Mirror snapshot of the neighbour's opposite-face cell, if any.
    fn mirror_possible(&self, dir: Direction, face_index: usize) -> Option<StateSet>;
}

/// Mirror view for an isolated chunk: no neighbours.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMirrors;

impl MirrorView for NoMirrors {
    fn has_neighbour(&self, _dir: Direction) -> bool {
        false
    }

    fn mirror_possible(&self, _dir: Direction, _face_index: usize) -> Option<StateSet> {
        None
    }
}

/// A possible-set change on a boundary cell, to be routed to the
/// neighbouring chunk by the scheduler.
#[derive(Debug, Clone)]
pub struct OutboundBoundaryEvent {
    /// Face of the source chunk the change happened on.
    pub dir: Direction,
    /// Face-enumeration index of the changed cell.
    pub face_index: usize,
    /// Possible set before the change.
    pub old_possible: StateSet,
    /// Possible set after the change.
    pub new_possible: StateSet,
}

/// Terminal status of a solver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every cell collapsed.
    Done,
    /// The iteration budget ran out first.
    Budget,
    /// A cell's possible set became empty.
    Contradiction,
    /// The cancellation flag was raised between iterations.
    Cancelled,
}

/// Result of one observe/collapse/propagate cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// A cell was collapsed and its consequences propagated.
    Progress,
    /// No uncollapsed cell remains.
    Complete,
    /// Propagation emptied a cell's possible set.
    Contradiction {
        /// Linear index of the contradicted cell.
        cell: usize,
    },
}

/// Summary of a solver run over one chunk.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Terminal status.
    pub status: RunStatus,
    /// Cells collapsed during the run (explicit and implicit).
    pub cells_collapsed: usize,
    /// Propagation events processed.
    pub propagations: usize,
    /// Contradictions encountered (0 or 1; the run stops at the first).
    pub contradictions: usize,
    /// Boundary changes to hand to the scheduler.
    pub outbound: Vec<OutboundBoundaryEvent>,
}

/// Errors surfaced by explicit seeding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeedError {
    /// The cell index exceeded the grid.
    #[error("Seed cell index {0} out of range")]
    CellOutOfRange(usize),
    /// The requested state is not in the cell's possible set.
    #[error("Seed state {state} not possible for cell {cell}")]
    StateNotPossible {
        /// Linear cell index
        cell: usize,
        /// Requested state
        state: State,
    },
}

/// The per-chunk solver: observe the lowest-entropy cell, collapse it by
/// biased weighted draw, and restore arc consistency.
///
/// One instance is created per job with the chunk's RNG stream, so runs are
/// reproducible per chunk regardless of worker interleaving.
#[derive(Debug)]
pub struct WfcEngine {
    adjacency: Arc<AdjacencyTable>,
    rng: fastrand::Rng,
    /// Chunk-level scale in `[0, 1]` applied to all constraint biases.
    constraint_influence: f32,
}

impl WfcEngine {
    /// Creates a solver over `adjacency` with a seeded RNG stream.
    #[must_use]
    pub fn new(adjacency: Arc<AdjacencyTable>, seed: u64, constraint_influence: f32) -> Self {
        Self {
            adjacency,
            rng: fastrand::Rng::with_seed(seed),
            constraint_influence: constraint_influence.clamp(0.0, 1.0),
        }
    }

    /// Returns the adjacency table the solver consults.
    #[must_use]
    pub fn adjacency(&self) -> &AdjacencyTable {
        &self.adjacency
    }

    /// Collapses specific cells up front and enqueues their consequences.
    ///
    /// # Errors
    ///
    /// Fails without mutating anything if any observation is out of range or
    /// not possible.
    pub fn seed(
        &mut self,
        grid: &mut CellGrid,
        queue: &mut PropagationQueue,
        source_chunk: ChunkId,
        observations: &[(usize, State)],
    ) -> Result<(), SeedError> {
        for &(cell, state) in observations {
            if cell >= grid.cell_count() {
                return Err(SeedError::CellOutOfRange(cell));
            }
            if !grid.cell(cell).possible().contains(state) {
                return Err(SeedError::StateNotPossible { cell, state });
            }
        }
        for &(cell, state) in observations {
            let old = grid.cell(cell).possible().clone();
            grid.collapse(cell, state);
            queue.push(PropagationEvent {
                target_cell: cell,
                source_chunk,
                old_possible: old,
                new_possible: grid.cell(cell).possible().clone(),
                crosses_boundary: false,
                priority: PropagationEvent::priority_for(1, false),
            });
        }
        Ok(())
    }

    /// Runs observe/collapse/propagate cycles until the chunk is done, the
    /// iteration or wall-clock budget is exhausted, a contradiction
    /// surfaces, or `cancel` is raised. Both budget exhaustions leave the
    /// grid in a consistent shrunk state.
    #[allow(clippy::too_many_arguments)]
    pub fn run<B: BiasProvider, M: MirrorView>(
        &mut self,
        grid: &mut CellGrid,
        queue: &mut PropagationQueue,
        bias: &B,
        mirrors: &M,
        source_chunk: ChunkId,
        max_iterations: u32,
        deadline: Option<Instant>,
        cancel: Option<&AtomicBool>,
    ) -> RunReport {
        let mut report = RunReport {
            status: RunStatus::Budget,
            cells_collapsed: 0,
            propagations: 0,
            contradictions: 0,
            outbound: Vec::new(),
        };

        // Settle any seeded or inbound events before the first observation.
        if !queue.is_empty() {
            if let Err(cell) = self.propagate(grid, queue, mirrors, source_chunk, &mut report) {
                report.status = RunStatus::Contradiction;
                report.contradictions += 1;
                debug!(cell, "contradiction while settling inbound events");
                return report;
            }
        }

        for _ in 0..max_iterations {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    report.status = RunStatus::Cancelled;
                    return report;
                }
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    report.status = RunStatus::Budget;
                    return report;
                }
            }

            match self.step(grid, queue, bias, mirrors, source_chunk, &mut report) {
                StepResult::Progress => {}
                StepResult::Complete => {
                    report.status = RunStatus::Done;
                    return report;
                }
                StepResult::Contradiction { cell } => {
                    report.status = RunStatus::Contradiction;
                    report.contradictions += 1;
                    debug!(cell, "contradiction during collapse");
                    return report;
                }
            }
        }

        if grid.collapsed_count() == grid.cell_count() {
            report.status = RunStatus::Done;
        }
        report
    }

    /// One observe+collapse+propagate cycle. `report` accumulates counters
    /// and outbound boundary events.
    pub fn step<B: BiasProvider, M: MirrorView>(
        &mut self,
        grid: &mut CellGrid,
        queue: &mut PropagationQueue,
        bias: &B,
        mirrors: &M,
        source_chunk: ChunkId,
        report: &mut RunReport,
    ) -> StepResult {
        let Some(cell_index) = self.observe(grid, bias) else {
            return StepResult::Complete;
        };

        let state = self.choose_state(grid, bias, cell_index);
        trace!(cell_index, state, "collapsing");

        let old = grid.cell(cell_index).possible().clone();
        grid.collapse(cell_index, state);
        report.cells_collapsed += 1;
        queue.push(PropagationEvent {
            target_cell: cell_index,
            source_chunk,
            old_possible: old,
            new_possible: grid.cell(cell_index).possible().clone(),
            crosses_boundary: false,
            priority: PropagationEvent::priority_for(1, false),
        });

        match self.propagate(grid, queue, mirrors, source_chunk, report) {
            Ok(()) => StepResult::Progress,
            Err(cell) => StepResult::Contradiction { cell },
        }
    }

    /// Finds the non-collapsed cell with minimum effective entropy.
    ///
    /// Effective entropy scales raw entropy down where constraint influence
    /// is strong, so heavily biased cells are decided early. Ties break on
    /// raw entropy, then on the strongest bias magnitude, then on cell
    /// index, keeping observation deterministic for a given seed.
    fn observe<B: BiasProvider>(&self, grid: &CellGrid, bias: &B) -> Option<usize> {
        // Candidate key: (effective entropy asc, raw entropy asc, bias
        // magnitude desc, cell index asc).
        let beats = |a: &(f32, u16, f32, usize), b: &(f32, u16, f32, usize)| {
            a.0.total_cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(b.2.total_cmp(&a.2))
                .then(a.3.cmp(&b.3))
                .is_lt()
        };

        let mut best: Option<(f32, u16, f32, usize)> = None;
        for index in 0..grid.cell_count() {
            let cell = grid.cell(index);
            if cell.is_collapsed() || cell.is_contradicted() {
                continue;
            }
            let influence = (self.constraint_influence * bias.influence(index)).clamp(0.0, 1.0);
            let effective = f32::from(cell.entropy()) * Self::entropy_multiplier(influence);
            let candidate = (effective, cell.entropy(), influence, index);
            if best.as_ref().map_or(true, |current| beats(&candidate, current)) {
                best = Some(candidate);
            }
        }
        best.map(|(_, _, _, index)| index)
    }

    fn entropy_multiplier(influence: f32) -> f32 {
        for (threshold, multiplier) in INFLUENCE_THRESHOLDS.iter().zip(INFLUENCE_MULTIPLIERS) {
            if influence >= *threshold {
                return multiplier;
            }
        }
        1.0
    }

    /// Samples a state from the cell's possible set, weighted by biases:
    /// `w(s) = max(0.1, 1 + bias(s))`.
    fn choose_state<B: BiasProvider>(
        &mut self,
        grid: &CellGrid,
        bias: &B,
        cell_index: usize,
    ) -> State {
        let possible = grid.cell(cell_index).possible();
        let mut total = 0.0f32;
        for state in possible.iter() {
            total += self.state_weight(bias, cell_index, state);
        }

        let mut draw = self.rng.f32() * total;
        let mut chosen = None;
        for state in possible.iter() {
            let weight = self.state_weight(bias, cell_index, state);
            chosen = Some(state);
            if draw < weight {
                break;
            }
            draw -= weight;
        }
        // The set is non-empty (observe skips contradicted cells), so the
        // loop always assigns; the fallback covers rounding at the far end.
        chosen.unwrap_or(0)
    }

    fn state_weight<B: BiasProvider>(&self, bias: &B, cell_index: usize, state: State) -> f32 {
        let b = self.constraint_influence * bias.state_bias(cell_index, state);
        (1.0 + b).max(MIN_STATE_WEIGHT)
    }

    /// AC-3 propagation until the queue drains. Returns the contradicted
    /// cell index on failure.
    pub fn propagate<M: MirrorView>(
        &mut self,
        grid: &mut CellGrid,
        queue: &mut PropagationQueue,
        mirrors: &M,
        source_chunk: ChunkId,
        report: &mut RunReport,
    ) -> Result<(), usize> {
        while let Some(event) = queue.pop() {
            report.propagations += 1;
            let source_possible = grid.cell(event.target_cell).possible().clone();

            for dir in Direction::ALL {
                let Some(neighbour) = grid.neighbour_index(event.target_cell, dir) else {
                    // Off-grid: the mirror, if synced, is a read-only
                    // neighbour constraining the changed cell itself.
                    if grid.cell(event.target_cell).is_collapsed() {
                        continue;
                    }
                    let face_index = grid.face_index_of(event.target_cell, dir);
                    let Some(mirror) = mirrors.mirror_possible(dir, face_index) else {
                        continue;
                    };
                    let mask = self.adjacency.neighbour_mask(&mirror, dir.opposite());
                    let old = grid.cell(event.target_cell).possible().clone();
                    match grid.intersect_possible(event.target_cell, &mask) {
                        ShrinkOutcome::Unchanged => {}
                        ShrinkOutcome::Shrunk | ShrinkOutcome::Collapsed => {
                            if grid.cell(event.target_cell).is_collapsed() {
                                report.cells_collapsed += 1;
                            }
                            let entropy = grid.cell(event.target_cell).entropy() as usize;
                            queue.push(PropagationEvent {
                                target_cell: event.target_cell,
                                source_chunk,
                                old_possible: old,
                                new_possible: grid.cell(event.target_cell).possible().clone(),
                                crosses_boundary: true,
                                priority: PropagationEvent::priority_for(entropy, true),
                            });
                        }
                        ShrinkOutcome::Contradiction => {
                            return Err(event.target_cell);
                        }
                    }
                    continue;
                };
                if grid.cell(neighbour).is_collapsed() {
                    continue;
                }
                let mask = self.adjacency.neighbour_mask(&source_possible, dir);
                let old = grid.cell(neighbour).possible().clone();
                match grid.intersect_possible(neighbour, &mask) {
                    ShrinkOutcome::Unchanged => {}
                    ShrinkOutcome::Shrunk | ShrinkOutcome::Collapsed => {
                        if grid.cell(neighbour).is_collapsed() {
                            report.cells_collapsed += 1;
                        }
                        let entropy = grid.cell(neighbour).entropy() as usize;
                        queue.push(PropagationEvent {
                            target_cell: neighbour,
                            source_chunk,
                            old_possible: old,
                            new_possible: grid.cell(neighbour).possible().clone(),
                            crosses_boundary: false,
                            priority: PropagationEvent::priority_for(entropy, false),
                        });
                    }
                    ShrinkOutcome::Contradiction => {
                        return Err(neighbour);
                    }
                }
            }

            // Boundary coupling: a change on a face with a neighbouring
            // chunk becomes an outbound event for the scheduler to route.
            for dir in Direction::ALL {
                if grid.on_face(event.target_cell, dir) && mirrors.has_neighbour(dir) {
                    let face_index = grid.face_index_of(event.target_cell, dir);
                    report.outbound.push(OutboundBoundaryEvent {
                        dir,
                        face_index,
                        old_possible: event.old_possible.clone(),
                        new_possible: source_possible.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Applies an inbound mirror snapshot to the owning face cell: the
    /// mirror acts as a read-only neighbour during arc consistency.
    ///
    /// Enqueues a boosted cross-boundary event when the owner cell shrinks.
    pub fn apply_mirror_constraint(
        &mut self,
        grid: &mut CellGrid,
        queue: &mut PropagationQueue,
        source_chunk: ChunkId,
        dir: Direction,
        face_index: usize,
        mirror: &StateSet,
    ) -> ShrinkOutcome {
        let owner = grid.face_cell_index(dir, face_index);
        if grid.cell(owner).is_collapsed() {
            return ShrinkOutcome::Unchanged;
        }
        // The owner sits opposite the mirror cell.
        let mask = self.adjacency.neighbour_mask(mirror, dir.opposite());
        let old = grid.cell(owner).possible().clone();
        let outcome = grid.intersect_possible(owner, &mask);
        if matches!(outcome, ShrinkOutcome::Shrunk | ShrinkOutcome::Collapsed) {
            let entropy = grid.cell(owner).entropy() as usize;
            queue.push(PropagationEvent {
                target_cell: owner,
                source_chunk,
                old_possible: old,
                new_possible: grid.cell(owner).possible().clone(),
                crosses_boundary: true,
                priority: PropagationEvent::priority_for(entropy, true),
            });
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjacency::AdjacencyBuilder;

    fn self_compatible_table(num_states: u16) -> Arc<AdjacencyTable> {
        let mut builder = AdjacencyBuilder::new(num_states);
        for s in 0..num_states {
            builder.allow_all_directions(s, s);
        }
        Arc::new(builder.build().expect("symmetric by construction"))
    }

    #[test]
    fn test_single_chunk_fully_collapses() {
        // C=4, S=2, both states self-compatible in all directions.
        let table = self_compatible_table(2);
        let mut engine = WfcEngine::new(table, 42, 1.0);
        let mut grid = CellGrid::new(4, 2);
        let mut queue = PropagationQueue::new();

        let report = engine.run(
            &mut grid,
            &mut queue,
            &UniformBias,
            &NoMirrors,
            ChunkId::NULL,
            64,
            None,
            None,
        );

        assert_eq!(report.status, RunStatus::Done);
        assert_eq!(grid.collapsed_count(), 64);
        assert!(queue.is_empty());
        assert!(report.outbound.is_empty());
    }

    #[test]
    fn test_seed_propagates_equal_state_constraint() {
        // Only equal states may neighbour, so one seed decides the chunk.
        let table = self_compatible_table(3);
        let mut engine = WfcEngine::new(table, 7, 1.0);
        let mut grid = CellGrid::new(4, 3);
        let mut queue = PropagationQueue::new();

        engine
            .seed(&mut grid, &mut queue, ChunkId::NULL, &[(0, 2)])
            .expect("state 2 possible at start");
        let report = engine.run(
            &mut grid,
            &mut queue,
            &UniformBias,
            &NoMirrors,
            ChunkId::NULL,
            128,
            None,
            None,
        );

        assert_eq!(report.status, RunStatus::Done);
        for cell in grid.cells() {
            assert_eq!(cell.collapsed(), Some(2));
        }
    }

    #[test]
    fn test_seed_rejects_impossible_state() {
        let table = self_compatible_table(2);
        let mut engine = WfcEngine::new(table, 0, 1.0);
        let mut grid = CellGrid::new(4, 2);
        let mut queue = PropagationQueue::new();

        let err = engine
            .seed(&mut grid, &mut queue, ChunkId::NULL, &[(0, 5)])
            .unwrap_err();
        assert_eq!(err, SeedError::StateNotPossible { cell: 0, state: 5 });
    }

    #[test]
    fn test_budget_exhaustion() {
        // Fully permissive adjacency: nothing cascades, one cell per
        // iteration, so a one-iteration budget cannot finish the chunk.
        let table = Arc::new(AdjacencyTable::fully_permissive(2));
        let mut engine = WfcEngine::new(table, 1, 1.0);
        let mut grid = CellGrid::new(8, 2);
        let mut queue = PropagationQueue::new();

        let report = engine.run(
            &mut grid,
            &mut queue,
            &UniformBias,
            &NoMirrors,
            ChunkId::NULL,
            1,
            None,
            None,
        );
        assert_eq!(report.status, RunStatus::Budget);
        assert!(grid.collapsed_count() < grid.cell_count());
    }

    #[test]
    fn test_wall_clock_budget() {
        let table = Arc::new(AdjacencyTable::fully_permissive(2));
        let mut engine = WfcEngine::new(table, 1, 1.0);
        let mut grid = CellGrid::new(8, 2);
        let mut queue = PropagationQueue::new();

        // A deadline already in the past stops the run before any step.
        let report = engine.run(
            &mut grid,
            &mut queue,
            &UniformBias,
            &NoMirrors,
            ChunkId::NULL,
            1000,
            Some(Instant::now()),
            None,
        );
        assert_eq!(report.status, RunStatus::Budget);
        assert_eq!(grid.collapsed_count(), 0);
    }

    #[test]
    fn test_cancellation_between_iterations() {
        let table = self_compatible_table(2);
        let mut engine = WfcEngine::new(table, 1, 1.0);
        let mut grid = CellGrid::new(8, 2);
        let mut queue = PropagationQueue::new();
        let cancel = AtomicBool::new(true);

        let report = engine.run(
            &mut grid,
            &mut queue,
            &UniformBias,
            &NoMirrors,
            ChunkId::NULL,
            1000,
            None,
            Some(&cancel),
        );
        assert_eq!(report.status, RunStatus::Cancelled);
        // Invariants hold on the partial result.
        for cell in grid.cells() {
            assert_eq!(cell.entropy() as usize, cell.possible().len());
            assert_eq!(cell.is_collapsed(), cell.entropy() == 1);
        }
    }

    #[test]
    fn test_determinism_per_seed() {
        let run = |seed: u64| {
            let mut engine = WfcEngine::new(self_compatible_table(4), seed, 1.0);
            let mut grid = CellGrid::new(4, 4);
            let mut queue = PropagationQueue::new();
            engine.run(
                &mut grid,
                &mut queue,
                &UniformBias,
                &NoMirrors,
                ChunkId::NULL,
                256,
                None,
                None,
            );
            grid.cells()
                .iter()
                .map(|c| c.collapsed())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(99), run(99));
    }

    #[test]
    fn test_bias_skews_selection() {
        struct FavourOne;
        impl BiasProvider for FavourOne {
            fn state_bias(&self, _cell: usize, state: State) -> f32 {
                if state == 1 {
                    0.9
                } else {
                    -0.9
                }
            }
            fn influence(&self, _cell: usize) -> f32 {
                0.9
            }
        }

        let table = self_compatible_table(2);
        let mut ones = 0usize;
        let mut total = 0usize;
        for seed in 0..100 {
            let mut engine = WfcEngine::new(Arc::clone(&table), seed, 1.0);
            let mut grid = CellGrid::new(4, 2);
            let mut queue = PropagationQueue::new();
            engine.run(
                &mut grid,
                &mut queue,
                &FavourOne,
                &NoMirrors,
                ChunkId::NULL,
                128,
                None,
                None,
            );
            for cell in grid.cells() {
                total += 1;
                if cell.collapsed() == Some(1) {
                    ones += 1;
                }
            }
        }
        // w(1) = 1.9 vs w(0) = 0.1; state 1 dominates heavily.
        assert!(ones as f32 / total as f32 > 0.8);
    }

    #[test]
    fn test_mirror_constraint_shrinks_owner() {
        // Equal-states-only table; mirror collapsed to 1 forces the owner
        // face cell to 1.
        let table = self_compatible_table(2);
        let mut engine = WfcEngine::new(table, 3, 1.0);
        let mut grid = CellGrid::new(4, 2);
        let mut queue = PropagationQueue::new();

        let mirror = StateSet::singleton(2, 1);
        let outcome = engine.apply_mirror_constraint(
            &mut grid,
            &mut queue,
            ChunkId::NULL,
            Direction::PosX,
            0,
            &mirror,
        );
        assert_eq!(outcome, ShrinkOutcome::Collapsed);

        let owner = grid.face_cell_index(Direction::PosX, 0);
        assert_eq!(grid.cell(owner).collapsed(), Some(1));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_outbound_events_on_boundary_change() {
        struct AllNeighbours;
        impl MirrorView for AllNeighbours {
            fn has_neighbour(&self, _dir: Direction) -> bool {
                true
            }
            fn mirror_possible(&self, _dir: Direction, _face_index: usize) -> Option<StateSet> {
                None
            }
        }

        let table = self_compatible_table(2);
        let mut engine = WfcEngine::new(table, 11, 1.0);
        let mut grid = CellGrid::new(4, 2);
        let mut queue = PropagationQueue::new();

        engine
            .seed(&mut grid, &mut queue, ChunkId::NULL, &[(0, 0)])
            .expect("possible");
        let report = engine.run(
            &mut grid,
            &mut queue,
            &UniformBias,
            &AllNeighbours,
            ChunkId::NULL,
            128,
            None,
            None,
        );
        assert_eq!(report.status, RunStatus::Done);
        // Every boundary cell collapsed to 0 and has a neighbour on at
        // least one face, so outbound events must exist for all six faces.
        for dir in Direction::ALL {
            assert!(
                report.outbound.iter().any(|e| e.dir == dir),
                "missing outbound events for {dir:?}"
            );
        }
    }
}
