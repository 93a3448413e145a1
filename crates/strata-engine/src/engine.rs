//! The engine facade.

use std::io::{Read, Write};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use glam::Vec3;
use parking_lot::RwLock;
use tracing::info;

use strata_common::{
    ChunkCoord, FormatError, JobId, LocalCoord, StrataError, StrataResult, WorldError,
};
use strata_constraints::{
    text, ConstraintModel, ConstraintSet, GlobalConstraint, RegionConstraint,
};
use strata_wfc::{AdjacencyTable, RunStatus, SeedError, State, WfcEngine};
use strata_world::{io as dump_io, ChunkLifecycle, ChunkRecord, ChunkStore, ChunkView};

use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventBus};
use crate::job::{Job, JobKind};
use crate::scheduler::ChunkScheduler;
use crate::telemetry::{NullTelemetry, Telemetry};
use crate::worker::{self, chunk_seed, WorkerContext, WorkerPool};

/// A point-in-time summary of engine state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineStats {
    /// Chunks currently loaded.
    pub loaded_chunks: usize,
    /// Jobs planned but not dispatched.
    pub pending_jobs: usize,
    /// Jobs running on workers.
    pub in_flight_jobs: usize,
    /// Scheduler ticks processed.
    pub ticks: u64,
    /// Total cells across loaded chunks.
    pub total_cells: usize,
    /// Collapsed cells across loaded chunks.
    pub collapsed_cells: usize,
    /// Degraded cells across loaded chunks.
    pub degraded_cells: usize,
}

/// The chunked WFC terrain engine.
///
/// Owns the chunk store, the constraint model, the scheduler, and the
/// worker pool. Hosts construct it from an [`EngineConfig`], then drive it
/// with [`Engine::update_viewer`] and [`Engine::tick`] and read results
/// through [`Engine::snapshot_chunk`].
pub struct Engine {
    config: EngineConfig,
    adjacency: Arc<AdjacencyTable>,
    store: Arc<ChunkStore>,
    model: Arc<RwLock<ConstraintModel>>,
    scheduler: ChunkScheduler,
    pool: WorkerPool,
    bus: EventBus,
    subscribers: Vec<Box<dyn Fn(&EngineEvent) + Send>>,
    telemetry: Arc<dyn Telemetry>,
}

impl Engine {
    /// Builds an engine from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Config`] when the configuration is invalid;
    /// nothing is constructed in that case.
    pub fn new(config: EngineConfig) -> StrataResult<Self> {
        Self::with_telemetry(config, Arc::new(NullTelemetry))
    }

    /// Builds an engine with a custom telemetry sink.
    pub fn with_telemetry(
        config: EngineConfig,
        telemetry: Arc<dyn Telemetry>,
    ) -> StrataResult<Self> {
        let adjacency = Arc::new(config.validate()?);
        let store = Arc::new(ChunkStore::new(config.chunk_size, config.world_max_states));
        let model = Arc::new(RwLock::new(ConstraintModel::new(
            config.world_max_states,
            config.chunk_size,
            config.random_seed as u32,
        )));

        let pool = WorkerPool::new(
            WorkerContext {
                store: Arc::clone(&store),
                adjacency: Arc::clone(&adjacency),
                model: Arc::clone(&model),
                random_seed: config.random_seed,
                telemetry: Arc::clone(&telemetry),
            },
            config.scheduler.workers,
        );
        let scheduler = ChunkScheduler::new(config.clone(), Arc::clone(&adjacency));

        info!(
            states = config.world_max_states,
            chunk_size = config.chunk_size,
            workers = config.scheduler.workers,
            "engine constructed"
        );

        Ok(Self {
            config,
            adjacency,
            store,
            model,
            scheduler,
            pool,
            bus: EventBus::default(),
            subscribers: Vec::new(),
            telemetry,
        })
    }

    /// The configuration the engine was built from.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Updates the viewer position and velocity driving the scheduler.
    pub fn update_viewer(&mut self, pos: Vec3, vel: Vec3) {
        self.scheduler.update_viewer(pos, vel);
    }

    /// One non-blocking scheduler tick. Dispatches jobs, pumps finished
    /// ones, and delivers events to subscribers.
    pub fn tick(&mut self) {
        self.scheduler
            .tick(&self.store, &self.pool, &self.bus, &*self.telemetry);
        self.deliver_events();
    }

    fn deliver_events(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }
        for event in self.bus.drain() {
            for subscriber in &self.subscribers {
                subscriber(&event);
            }
        }
    }

    /// Registers an event callback. Callbacks run on the control thread
    /// during [`Engine::tick`].
    pub fn subscribe_events(&mut self, callback: impl Fn(&EngineEvent) + Send + 'static) {
        self.subscribers.push(Box::new(callback));
    }

    /// Drains pending events for polling hosts (only useful without
    /// subscribers, which consume events during `tick`).
    pub fn drain_events(&self) -> Vec<EngineEvent> {
        self.bus.drain()
    }

    /// Read-only snapshot of the chunk at `coord`, if loaded.
    #[must_use]
    pub fn snapshot_chunk(&self, coord: ChunkCoord) -> Option<ChunkView> {
        self.store.snapshot(coord)
    }

    /// Point-in-time engine statistics. Scans loaded chunks.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let mut total_cells = 0;
        let mut collapsed_cells = 0;
        let mut degraded_cells = 0;
        for coord in self.store.loaded_coords() {
            if let Some(chunk) = self.store.get(coord) {
                let chunk = chunk.read();
                total_cells += chunk.grid.cell_count();
                collapsed_cells += chunk.grid.collapsed_count();
                degraded_cells += chunk.grid.degraded_count();
            }
        }
        EngineStats {
            loaded_chunks: self.store.len(),
            pending_jobs: self.scheduler.pending_jobs(),
            in_flight_jobs: self.scheduler.in_flight_jobs(),
            ticks: self.scheduler.ticks(),
            total_cells,
            collapsed_cells,
            degraded_cells,
        }
    }

    // ---- constraints ------------------------------------------------

    /// Overrides the cross-type constraint combination weights.
    pub fn set_constraint_weights(&self, weights: strata_constraints::TypeWeights) {
        self.model.write().set_weights(weights);
    }

    /// Adds a global constraint.
    pub fn add_global_constraint(&self, constraint: GlobalConstraint) {
        self.model.write().add_global(constraint);
    }

    /// Removes a global constraint by name. Returns true if it existed.
    pub fn remove_global_constraint(&self, name: &str) -> bool {
        self.model.write().remove_global(name)
    }

    /// Adds a region constraint.
    pub fn add_region_constraint(&self, constraint: RegionConstraint) {
        self.model.write().add_region(constraint);
    }

    /// Removes a region constraint by name. Returns true if it existed.
    pub fn remove_region_constraint(&self, name: &str) -> bool {
        self.model.write().remove_region(name)
    }

    /// Sets a per-cell bias.
    pub fn set_local_constraint(
        &self,
        coord: ChunkCoord,
        cell: LocalCoord,
        state: State,
        bias: f32,
    ) {
        self.model
            .write()
            .set_local(coord, cell.to_index(self.config.chunk_size), state, bias);
    }

    /// Removes a per-cell bias. Returns true if one was present.
    pub fn remove_local_constraint(&self, coord: ChunkCoord, cell: LocalCoord, state: State) -> bool {
        self.model
            .write()
            .remove_local(coord, cell.to_index(self.config.chunk_size), state)
    }

    // ---- direct chunk access ---------------------------------------

    /// Ensures a chunk exists at `coord` (creating it at the given LOD if
    /// missing) and collapses the listed cells up front.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidSeed`] when an observation targets a
    /// missing cell or an impossible state; nothing is mutated then.
    pub fn seed_chunk(
        &mut self,
        coord: ChunkCoord,
        observations: &[(usize, State)],
    ) -> StrataResult<()> {
        let id = self.ensure_chunk(coord);
        let chunk_arc = self
            .store
            .get_by_id(id)
            .ok_or(StrataError::World(WorldError::ChunkNotFound { coord }))?;
        let mut chunk = chunk_arc.write();

        let mut engine = WfcEngine::new(
            Arc::clone(&self.adjacency),
            chunk_seed(self.config.random_seed, coord),
            chunk.constraint_influence,
        );
        let (grid, queue, _) = chunk.solver_parts();
        engine
            .seed(grid, queue, id, observations)
            .map_err(|e| match e {
                SeedError::CellOutOfRange(cell_index) => StrataError::World(
                    WorldError::InvalidSeed {
                        cell_index,
                        state: 0,
                    },
                ),
                SeedError::StateNotPossible { cell, state } => {
                    StrataError::World(WorldError::InvalidSeed {
                        cell_index: cell,
                        state,
                    })
                }
            })
    }

    /// Creates the chunk at `coord` if missing and returns its id. The
    /// LOD follows the chunk's distance from the current viewer position.
    pub fn ensure_chunk(&mut self, coord: ChunkCoord) -> strata_common::ChunkId {
        if let Some(chunk) = self.store.get(coord) {
            return chunk.read().id;
        }
        let lod = self.config.lod_for_distance(0.0);
        self.store.create(
            coord,
            lod,
            self.config.max_iterations_for_lod(lod),
            self.config.constraint_influence_for_lod(lod),
        )
    }

    /// Runs a collapse job for `coord` inline on the calling thread and
    /// absorbs its results. Synchronous alternative to the scheduler path,
    /// used by tools and tests that need determinism.
    pub fn collapse_now(&mut self, coord: ChunkCoord) -> RunStatus {
        let id = self.ensure_chunk(coord);
        let job = Job {
            id: JobId::next(),
            kind: JobKind::Collapse,
            coord,
            chunk: id,
            priority: 1.0,
            wall_budget: None,
            cancel: Arc::new(AtomicBool::new(false)),
        };
        let context = WorkerContext {
            store: Arc::clone(&self.store),
            adjacency: Arc::clone(&self.adjacency),
            model: Arc::clone(&self.model),
            random_seed: self.config.random_seed,
            telemetry: Arc::clone(&self.telemetry),
        };
        let output = worker::execute_inline(&context, job);
        let status = output.status;
        self.scheduler
            .absorb(&self.store, &self.bus, &*self.telemetry, &output);
        self.deliver_events();
        status
    }

    /// Runs inline boundary propagation for every chunk with pending
    /// inbound events, until the world settles. Synchronous companion to
    /// [`Engine::collapse_now`].
    pub fn propagate_now(&mut self) {
        loop {
            let mut worked = false;
            for coord in self.store.loaded_coords() {
                let Some(chunk_arc) = self.store.get(coord) else {
                    continue;
                };
                let (id, dirty) = {
                    let chunk = chunk_arc.read();
                    let dirty = strata_common::Direction::ALL
                        .iter()
                        .any(|&d| chunk.buffer(d).is_some_and(|b| b.has_dirty()))
                        || !chunk.queue.is_empty();
                    (chunk.id, dirty)
                };
                if !dirty {
                    continue;
                }
                worked = true;
                let job = Job {
                    id: JobId::next(),
                    kind: JobKind::PropagateBoundary,
                    coord,
                    chunk: id,
                    priority: 1.0,
                    wall_budget: None,
                    cancel: Arc::new(AtomicBool::new(false)),
                };
                let context = WorkerContext {
                    store: Arc::clone(&self.store),
                    adjacency: Arc::clone(&self.adjacency),
                    model: Arc::clone(&self.model),
                    random_seed: self.config.random_seed,
                    telemetry: Arc::clone(&self.telemetry),
                };
                let output = worker::execute_inline(&context, job);
                self.scheduler
                    .absorb(&self.store, &self.bus, &*self.telemetry, &output);
            }
            if !worked {
                break;
            }
        }
        self.deliver_events();
    }

    // ---- persistence ------------------------------------------------

    /// Writes the whole world (adjacency, chunks, constraints) as a WFCX
    /// dump.
    pub fn save_dump<W: Write>(&self, writer: &mut W) -> StrataResult<()> {
        let records: Vec<ChunkRecord> = self
            .store
            .loaded_coords()
            .into_iter()
            .filter_map(|coord| {
                self.store
                    .get(coord)
                    .map(|chunk| ChunkRecord::from_chunk(&chunk.read()))
            })
            .collect();

        let constraints_text = {
            let model = self.model.read();
            let mut set = ConstraintSet {
                globals: model.globals().to_vec(),
                regions: model.regions().to_vec(),
                locals: Vec::new(),
            };
            for (&(chunk, cell_index), biases) in model.locals().iter() {
                let local = LocalCoord::from_index(cell_index, self.config.chunk_size);
                for (&state, &bias) in biases {
                    set.locals.push((chunk, local, state, bias));
                }
            }
            text::emit(&set)
        };

        dump_io::save_dump(
            writer,
            self.config.chunk_size as u16,
            &self.adjacency,
            &records,
            &constraints_text,
        )
    }

    /// Restores a WFCX dump into this engine. The dump's chunk size and
    /// state count must match the configuration.
    pub fn load_dump<R: Read>(&mut self, reader: &mut R) -> StrataResult<()> {
        let contents = dump_io::load_dump(reader)?;
        if u32::from(contents.chunk_size) != self.config.chunk_size
            || contents.num_states != self.config.world_max_states
        {
            return Err(FormatError::InvalidField(format!(
                "dump geometry {}x{} does not match engine {}x{}",
                contents.chunk_size,
                contents.num_states,
                self.config.chunk_size,
                self.config.world_max_states
            ))
            .into());
        }

        for record in &contents.chunks {
            let id = self.ensure_chunk(record.coord);
            if let Some(chunk_arc) = self.store.get_by_id(id) {
                let mut chunk = chunk_arc.write();
                record.apply_to(&mut chunk);
                chunk.lifecycle = ChunkLifecycle::Active;
            }
        }

        let set = text::parse(&contents.constraints_text)?;
        {
            let mut model = self.model.write();
            for global in set.globals {
                model.add_global(global);
            }
            for region in set.regions {
                model.add_region(region);
            }
            for (chunk, local, state, bias) in set.locals {
                model.set_local(chunk, local.to_index(self.config.chunk_size), state, bias);
            }
        }

        info!(chunks = contents.chunks.len(), "dump restored");
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("loaded_chunks", &self.store.len())
            .field("pending_jobs", &self.scheduler.pending_jobs())
            .field("in_flight_jobs", &self.scheduler.in_flight_jobs())
            .field("ticks", &self.scheduler.ticks())
            .finish()
    }
}
