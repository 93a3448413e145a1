//! Viewer-driven chunk scheduling and cross-boundary event routing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use glam::Vec3;
use tracing::{debug, info};

use strata_common::{ChunkCoord, ChunkId, Direction, JobId};
use strata_wfc::{AdjacencyTable, PropagationEvent, RunStatus};
use strata_world::{
    resolve_conflict, BoundaryConflict, ChunkLifecycle, ChunkStore, ConflictOutcome, FaceStamp,
};

use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventBus};
use crate::job::{Job, JobKind, JobOutput};
use crate::telemetry::{counters, Telemetry};
use crate::worker::WorkerPool;

/// Priority floor for unload jobs; they only run when nothing urgent is
/// pending.
const UNLOAD_PRIORITY: f32 = 0.05;

/// Additive boost for boundary-propagation jobs.
const BOUNDARY_JOB_BOOST: f32 = 0.5;

/// Multiplier for partially collapsed chunks resuming work.
const PARTIAL_COLLAPSE_BOOST: f32 = 1.2;

/// The control-thread scheduler: decides what loads, unloads, and runs,
/// and is the single place where one chunk's results mutate another.
pub struct ChunkScheduler {
    config: EngineConfig,
    adjacency: Arc<AdjacencyTable>,
    viewer_pos: Vec3,
    viewer_vel: Vec3,
    /// Jobs planned but not yet dispatched.
    pending: Vec<Job>,
    /// Coordinates with a pending job, to avoid duplicates.
    pending_coords: AHashSet<ChunkCoord>,
    /// Coordinates with a dispatched job, mapped to its cancel flag.
    in_flight: AHashMap<ChunkCoord, Arc<AtomicBool>>,
    /// Monotonic stamp source for boundary-collapse ordering.
    stamp_counter: u64,
    ticks: u64,
}

impl ChunkScheduler {
    /// Creates a scheduler over a validated configuration.
    #[must_use]
    pub fn new(config: EngineConfig, adjacency: Arc<AdjacencyTable>) -> Self {
        Self {
            config,
            adjacency,
            viewer_pos: Vec3::ZERO,
            viewer_vel: Vec3::ZERO,
            pending: Vec::new(),
            pending_coords: AHashSet::new(),
            in_flight: AHashMap::new(),
            stamp_counter: 0,
            ticks: 0,
        }
    }

    /// Updates the viewer position and velocity.
    pub fn update_viewer(&mut self, pos: Vec3, vel: Vec3) {
        self.viewer_pos = pos;
        self.viewer_vel = vel;
    }

    /// Ticks processed so far.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Jobs planned but not yet dispatched.
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.pending.len()
    }

    /// Jobs currently running on workers.
    #[must_use]
    pub fn in_flight_jobs(&self) -> usize {
        self.in_flight.len()
    }

    /// One non-blocking scheduler tick: pump finished jobs, plan loads and
    /// unloads around the viewer, and dispatch up to the budget.
    pub fn tick(
        &mut self,
        store: &ChunkStore,
        pool: &WorkerPool,
        bus: &EventBus,
        telemetry: &dyn Telemetry,
    ) {
        self.ticks += 1;
        self.pump(store, pool, bus, telemetry);
        self.plan(store, bus, telemetry);
        self.dispatch(store, pool, bus);
    }

    fn scheduled(&self, coord: ChunkCoord) -> bool {
        self.pending_coords.contains(&coord) || self.in_flight.contains_key(&coord)
    }

    fn next_stamp(&mut self) -> u64 {
        self.stamp_counter += 1;
        self.stamp_counter
    }

    fn queue_job(&mut self, kind: JobKind, coord: ChunkCoord, chunk: ChunkId, priority: f32) {
        self.pending.push(Job {
            id: JobId::next(),
            kind,
            coord,
            chunk,
            priority,
            wall_budget: None,
            cancel: Arc::new(AtomicBool::new(false)),
        });
        self.pending_coords.insert(coord);
    }

    /// Priority of work on the chunk at `coord`: closer chunks first,
    /// chunks ahead of the moving viewer boosted.
    fn chunk_priority(&self, coord: ChunkCoord) -> f32 {
        let center = coord.center(self.config.chunk_size);
        let dist = center.distance(self.viewer_pos);
        let towards = (center - self.viewer_pos).normalize_or_zero();
        let heading = self.viewer_vel.normalize_or_zero();
        (1.0 / (1.0 + dist)) * (1.0 + towards.dot(heading)).max(0.5)
    }

    // ---- planning ---------------------------------------------------

    fn plan(&mut self, store: &ChunkStore, bus: &EventBus, telemetry: &dyn Telemetry) {
        let predicted =
            self.viewer_pos + self.viewer_vel * self.config.scheduler.lookahead_secs;

        self.plan_loads(store, bus, telemetry);
        self.plan_followups(store);
        self.plan_unloads(store, bus, predicted);
    }

    fn plan_loads(&mut self, store: &ChunkStore, bus: &EventBus, telemetry: &dyn Telemetry) {
        let size = self.config.chunk_size as f32;
        let r_load = self.config.scheduler.load_distance;
        let span = (r_load / size).ceil() as i32 + 1;
        let center_chunk = ChunkCoord::new(
            (self.viewer_pos.x / size).floor() as i32,
            (self.viewer_pos.y / size).floor() as i32,
            (self.viewer_pos.z / size).floor() as i32,
        );

        for dz in -span..=span {
            for dy in -span..=span {
                for dx in -span..=span {
                    let coord = center_chunk.offset(dx, dy, dz);
                    let dist = coord.center(self.config.chunk_size).distance(self.viewer_pos);
                    if dist > r_load || store.is_loaded(coord) || self.scheduled(coord) {
                        continue;
                    }

                    let lod = self.config.lod_for_distance(dist);
                    let id = store.create(
                        coord,
                        lod,
                        self.config.max_iterations_for_lod(lod),
                        self.config.constraint_influence_for_lod(lod),
                    );
                    telemetry.incr_counter(counters::CHUNKS_LOADED, 1);
                    bus.publish(EngineEvent::ChunkStateChanged {
                        coord,
                        lifecycle: ChunkLifecycle::Loading,
                    });
                    self.queue_job(JobKind::CreateChunk, coord, id, self.chunk_priority(coord));
                }
            }
        }
    }

    /// Re-schedules loaded chunks that still have work: partially collapsed
    /// ones resume collapsing, dirty boundary buffers re-propagate.
    fn plan_followups(&mut self, store: &ChunkStore) {
        for coord in store.loaded_coords() {
            if self.scheduled(coord) {
                continue;
            }
            let Some(chunk_arc) = store.get(coord) else {
                continue;
            };
            let chunk = chunk_arc.read();
            if chunk.lifecycle != ChunkLifecycle::Active {
                continue;
            }
            let dirty = Direction::ALL
                .iter()
                .any(|&dir| chunk.buffer(dir).is_some_and(|b| b.has_dirty()))
                || !chunk.queue.is_empty();
            let id = chunk.id;
            // Contradicted chunks are not retried; they stay best-effort.
            let partial =
                !chunk.fully_collapsed && !chunk.degraded && chunk.partially_collapsed();
            drop(chunk);

            if dirty {
                self.queue_job(
                    JobKind::PropagateBoundary,
                    coord,
                    id,
                    self.chunk_priority(coord) + BOUNDARY_JOB_BOOST,
                );
            } else if partial {
                self.queue_job(
                    JobKind::Collapse,
                    coord,
                    id,
                    self.chunk_priority(coord) * PARTIAL_COLLAPSE_BOOST,
                );
            }
        }
    }

    fn plan_unloads(&mut self, store: &ChunkStore, bus: &EventBus, predicted: Vec3) {
        let r_unload = self.config.scheduler.unload_distance;
        for coord in store.loaded_coords() {
            if self.pending_coords.contains(&coord) {
                continue;
            }
            let center = coord.center(self.config.chunk_size);
            if center.distance(self.viewer_pos) <= r_unload
                || center.distance(predicted) <= r_unload
            {
                continue;
            }

            let Some(chunk_arc) = store.get(coord) else {
                continue;
            };
            let id = {
                let mut chunk = chunk_arc.write();
                if chunk.lifecycle == ChunkLifecycle::Unloading {
                    continue;
                }
                chunk.lifecycle = ChunkLifecycle::Unloading;
                chunk.id
            };
            bus.publish(EngineEvent::ChunkStateChanged {
                coord,
                lifecycle: ChunkLifecycle::Unloading,
            });

            // A job already running on this chunk must stop at its next
            // safe point.
            if let Some(cancel) = self.in_flight.get(&coord) {
                cancel.store(true, Ordering::SeqCst);
            }
            debug!(?coord, "scheduling unload");
            self.queue_job(JobKind::Unload, coord, id, UNLOAD_PRIORITY);
        }
    }

    // ---- dispatch ---------------------------------------------------

    fn dispatch(&mut self, store: &ChunkStore, pool: &WorkerPool, bus: &EventBus) {
        let budget = self
            .config
            .scheduler
            .max_concurrent_chunks
            .saturating_sub(self.in_flight.len());
        if budget == 0 || self.pending.is_empty() {
            return;
        }

        self.pending
            .sort_by(|a, b| b.priority.total_cmp(&a.priority));
        let take = budget.min(self.pending.len());
        let mut deferred = Vec::new();
        for job in self.pending.drain(..take) {
            // One writer per chunk: never dispatch while another job on the
            // same chunk is in flight. The job stays pending.
            if self.in_flight.contains_key(&job.coord) {
                deferred.push(job);
                continue;
            }
            self.pending_coords.remove(&job.coord);

            if matches!(job.kind, JobKind::CreateChunk | JobKind::Collapse) {
                if let Some(chunk_arc) = store.get(job.coord) {
                    chunk_arc.write().lifecycle = ChunkLifecycle::Collapsing;
                    bus.publish(EngineEvent::ChunkStateChanged {
                        coord: job.coord,
                        lifecycle: ChunkLifecycle::Collapsing,
                    });
                }
            }

            self.in_flight.insert(job.coord, Arc::clone(&job.cancel));
            pool.submit(job);
        }
        self.pending.append(&mut deferred);
    }

    // ---- result pump ------------------------------------------------

    fn pump(
        &mut self,
        store: &ChunkStore,
        pool: &WorkerPool,
        bus: &EventBus,
        telemetry: &dyn Telemetry,
    ) {
        for output in pool.drain_results() {
            self.absorb(store, bus, telemetry, &output);
        }
    }

    /// Absorbs one finished job: routes its boundary effects, settles its
    /// conflicts, and applies its status. Also used for jobs run inline on
    /// the control thread.
    pub fn absorb(
        &mut self,
        store: &ChunkStore,
        bus: &EventBus,
        telemetry: &dyn Telemetry,
        output: &JobOutput,
    ) {
        self.in_flight.remove(&output.coord);
        match output.kind {
            JobKind::Unload => {
                bus.publish(EngineEvent::ChunkUnloaded {
                    coord: output.coord,
                });
            }
            JobKind::CreateChunk | JobKind::Collapse | JobKind::PropagateBoundary => {
                self.route_outbound(store, output);
                self.settle_conflicts(store, bus, telemetry, output);
                self.apply_status(store, bus, output);
            }
        }
    }

    /// Applies a finished job's boundary changes to the neighbouring
    /// chunks' mirrors. This is the only place one chunk's work reaches
    /// another.
    fn route_outbound(&mut self, store: &ChunkStore, output: &JobOutput) {
        if output.outbound.is_empty() {
            return;
        }
        let Some(source_arc) = store.get_by_id(output.chunk) else {
            return;
        };

        // Stamp collapses on the source side, then collect routing targets.
        let mut routes: Vec<(ChunkId, Direction, usize, strata_wfc::StateSet)> = Vec::new();
        {
            let mut source = source_arc.write();
            for event in &output.outbound {
                if event.new_possible.sole_state().is_some() {
                    let counter = self.next_stamp();
                    if let Some(buffer) = source.buffer_mut(event.dir) {
                        buffer.record_stamp(
                            event.face_index,
                            FaceStamp {
                                counter,
                                chunk: output.coord,
                                pre_collapse: event.old_possible.clone(),
                            },
                        );
                    }
                }
                if let Some(neighbour_id) = source.neighbour(event.dir) {
                    routes.push((
                        neighbour_id,
                        event.dir,
                        event.face_index,
                        event.new_possible.clone(),
                    ));
                }
            }
        }

        // Update each neighbour's mirror; one lock at a time.
        for (neighbour_id, dir, face_index, possible) in routes {
            let Some(neighbour_arc) = store.get_by_id(neighbour_id) else {
                continue;
            };
            let mut neighbour = neighbour_arc.write();
            if let Some(buffer) = neighbour.buffer_mut(dir.opposite()) {
                buffer.set_mirror(face_index, possible);
            }
        }
        // plan_followups picks up the dirty mirrors next tick.
    }

    /// Re-verifies and settles the conflicts a job reported.
    fn settle_conflicts(
        &mut self,
        store: &ChunkStore,
        bus: &EventBus,
        telemetry: &dyn Telemetry,
        output: &JobOutput,
    ) {
        for (dir, conflict) in &output.conflicts {
            self.settle_conflict(store, bus, telemetry, output, *dir, conflict);
        }
    }

    fn settle_conflict(
        &mut self,
        store: &ChunkStore,
        bus: &EventBus,
        telemetry: &dyn Telemetry,
        output: &JobOutput,
        dir: Direction,
        conflict: &BoundaryConflict,
    ) {
        let Some(owner_arc) = store.get_by_id(output.chunk) else {
            return;
        };

        // Re-verify against the live cells: the pair may have been settled
        // by the other side's report in this same pump.
        let (owner_state, owner_stamp, neighbour_id) = {
            let owner = owner_arc.read();
            let cell_index = owner.grid.face_cell_index(dir, conflict.face_index);
            let state = owner.grid.cell(cell_index).collapsed();
            let stamp = owner
                .buffer(dir)
                .and_then(|b| b.stamp(conflict.face_index).cloned());
            let neighbour = owner.neighbour(dir);
            (state, stamp, neighbour)
        };
        let Some(owner_state) = owner_state else {
            return;
        };
        let Some(neighbour_id) = neighbour_id else {
            return;
        };
        let Some(neighbour_arc) = store.get_by_id(neighbour_id) else {
            return;
        };

        let (neighbour_state, neighbour_stamp) = {
            let neighbour = neighbour_arc.read();
            let cell_index = neighbour
                .grid
                .face_cell_index(dir.opposite(), conflict.face_index);
            let state = neighbour.grid.cell(cell_index).collapsed();
            let stamp = neighbour
                .buffer(dir.opposite())
                .and_then(|b| b.stamp(conflict.face_index).cloned());
            (state, stamp)
        };
        let Some(neighbour_state) = neighbour_state else {
            return;
        };
        if self.adjacency.allowed(owner_state, neighbour_state, dir) {
            return;
        }

        let live = BoundaryConflict {
            face_index: conflict.face_index,
            owner_state,
            neighbour_state,
        };
        let outcome = resolve_conflict(
            &self.adjacency,
            dir,
            &live,
            owner_stamp.as_ref(),
            neighbour_stamp.as_ref(),
        );
        telemetry.incr_counter(counters::BOUNDARY_CONFLICTS, 1);
        info!(
            coord = ?output.coord,
            ?dir,
            face_index = conflict.face_index,
            ?outcome,
            "boundary conflict"
        );

        let both_degraded = outcome == ConflictOutcome::BothDegraded;
        match outcome {
            ConflictOutcome::OverwriteOwner(state) => {
                let mut owner = owner_arc.write();
                Self::overwrite_face_cell(&mut owner, dir, conflict.face_index, state);
            }
            ConflictOutcome::OverwriteNeighbour(state) => {
                let mut neighbour = neighbour_arc.write();
                Self::overwrite_face_cell(
                    &mut neighbour,
                    dir.opposite(),
                    conflict.face_index,
                    state,
                );
            }
            ConflictOutcome::BothDegraded => {
                {
                    let mut owner = owner_arc.write();
                    Self::degrade_face_cell(&mut owner, dir, conflict.face_index);
                }
                let mut neighbour = neighbour_arc.write();
                Self::degrade_face_cell(&mut neighbour, dir.opposite(), conflict.face_index);
            }
        }

        bus.publish(EngineEvent::BoundaryConflict {
            coord: output.coord,
            dir,
            face_index: conflict.face_index,
            both_degraded,
        });
    }

    fn overwrite_face_cell(
        chunk: &mut strata_world::Chunk,
        dir: Direction,
        face_index: usize,
        state: strata_wfc::State,
    ) {
        let cell_index = chunk.grid.face_cell_index(dir, face_index);
        let cell = chunk.grid.cell_mut(cell_index);
        let old = cell.possible().clone();
        cell.overwrite_collapse(state);
        cell.degraded = true;
        chunk.degraded = true;
        // The overwrite changes the cell's support; let the next job
        // re-propagate from it.
        let new = chunk.grid.cell(cell_index).possible().clone();
        chunk.queue.push(PropagationEvent {
            target_cell: cell_index,
            source_chunk: chunk.id,
            old_possible: old,
            new_possible: new,
            crosses_boundary: true,
            priority: PropagationEvent::priority_for(1, true),
        });
    }

    fn degrade_face_cell(chunk: &mut strata_world::Chunk, dir: Direction, face_index: usize) {
        let cell_index = chunk.grid.face_cell_index(dir, face_index);
        chunk.grid.cell_mut(cell_index).degraded = true;
        chunk.degraded = true;
    }

    /// Applies a solver job's terminal status to the chunk lifecycle.
    fn apply_status(&mut self, store: &ChunkStore, bus: &EventBus, output: &JobOutput) {
        let Some(chunk_arc) = store.get(output.coord) else {
            return;
        };
        let mut chunk = chunk_arc.write();
        if chunk.id != output.chunk || chunk.lifecycle == ChunkLifecycle::Unloading {
            return;
        }
        let was_collapse_pass = matches!(output.kind, JobKind::CreateChunk | JobKind::Collapse);
        let old_lifecycle = chunk.lifecycle;

        match output.status {
            RunStatus::Done | RunStatus::Budget => {
                // A boundary-propagation pass finishing says nothing about
                // the chunk's own collapse progress.
                if was_collapse_pass {
                    chunk.fully_collapsed = true;
                    chunk.lifecycle = ChunkLifecycle::Active;
                }
            }
            RunStatus::Contradiction => {
                // Degraded, no retry: uncollapsed cells keep their last
                // reduced possible sets.
                chunk.degraded = true;
                chunk.fully_collapsed =
                    chunk.grid.collapsed_count() == chunk.grid.cell_count();
                if was_collapse_pass {
                    chunk.lifecycle = ChunkLifecycle::Active;
                }
                bus.publish(EngineEvent::Contradiction {
                    coord: output.coord,
                });
            }
            RunStatus::Cancelled => {
                return;
            }
        }
        let lifecycle = chunk.lifecycle;
        let coord = chunk.coord;
        drop(chunk);

        if lifecycle != old_lifecycle {
            bus.publish(EngineEvent::ChunkStateChanged { coord, lifecycle });
        }
        if matches!(output.kind, JobKind::CreateChunk) {
            bus.publish(EngineEvent::ChunkLoaded { coord });
        }
    }
}
