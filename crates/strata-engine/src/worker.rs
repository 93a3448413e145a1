//! Parallel worker pool.
//!
//! N OS threads pull jobs from a shared priority queue and mutate their
//! target chunk through the solver. A worker acquires exactly one chunk
//! lock for the duration of a job; cross-boundary effects are returned in
//! the job output and applied later by the scheduler on the control
//! thread.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, warn};

use strata_common::{ChunkCoord, ChunkId, Direction};
use strata_constraints::ConstraintModel;
use strata_wfc::{
    AdjacencyTable, PropagationQueue, RunReport, RunStatus, ShrinkOutcome, StateSet, WfcEngine,
};
use strata_world::ChunkStore;

use crate::job::{Job, JobKind, JobOutput};
use crate::telemetry::{counters, Telemetry};

/// Shared state the workers operate on.
#[derive(Clone)]
pub struct WorkerContext {
    /// The chunk arena.
    pub store: Arc<ChunkStore>,
    /// The adjacency table.
    pub adjacency: Arc<AdjacencyTable>,
    /// The constraint model (read-locked for bias maps).
    pub model: Arc<RwLock<ConstraintModel>>,
    /// Engine-wide random seed; each chunk derives its own stream.
    pub random_seed: u64,
    /// Telemetry sink.
    pub telemetry: Arc<dyn Telemetry>,
}

/// Derives a chunk's RNG seed from the engine seed and its coordinate, so
/// per-chunk output is reproducible regardless of worker interleaving.
#[must_use]
pub fn chunk_seed(seed: u64, coord: ChunkCoord) -> u64 {
    let mut h = seed ^ 0x9E37_79B9_7F4A_7C15;
    for v in [coord.x, coord.y, coord.z] {
        h ^= (v as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h = h.rotate_left(27).wrapping_mul(0x94D0_49BB_1331_11EB);
    }
    h
}

struct QueuedJob(Job);

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority first, earlier submission on ties.
        self.0
            .priority
            .total_cmp(&other.0.priority)
            .then_with(|| other.0.id.raw().cmp(&self.0.id.raw()))
    }
}

struct JobQueue {
    heap: Mutex<BinaryHeap<QueuedJob>>,
    available: Condvar,
}

/// The worker pool: owns the threads, the shared job queue, and the result
/// channel back to the control thread.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    queue: Arc<JobQueue>,
    results: Receiver<JobOutput>,
    shutdown: Arc<AtomicBool>,
    /// Chunks currently held in exclusive mode, for the one-writer assert.
    held: Arc<DashMap<ChunkId, ()>>,
}

impl WorkerPool {
    /// Spawns `workers` threads over the shared context.
    #[must_use]
    pub fn new(context: WorkerContext, workers: usize) -> Self {
        let queue = Arc::new(JobQueue {
            heap: Mutex::new(BinaryHeap::new()),
            available: Condvar::new(),
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        let held: Arc<DashMap<ChunkId, ()>> = Arc::new(DashMap::new());
        let (tx, rx) = unbounded();

        let handles = (0..workers)
            .map(|index| {
                let queue = Arc::clone(&queue);
                let shutdown = Arc::clone(&shutdown);
                let held = Arc::clone(&held);
                let context = context.clone();
                let tx = tx.clone();
                std::thread::Builder::new()
                    .name(format!("strata-worker-{index}"))
                    .spawn(move || worker_loop(&context, &queue, &shutdown, &held, &tx))
                    .unwrap_or_else(|e| panic!("failed to spawn worker thread: {e}"))
            })
            .collect();

        Self {
            handles,
            queue,
            results: rx,
            shutdown,
            held,
        }
    }

    /// Enqueues a job.
    pub fn submit(&self, job: Job) {
        self.queue.heap.lock().push(QueuedJob(job));
        self.queue.available.notify_one();
    }

    /// Jobs waiting in the queue (not counting running ones).
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.queue.heap.lock().len()
    }

    /// Drains all finished-job outputs without blocking.
    pub fn drain_results(&self) -> Vec<JobOutput> {
        let mut outputs = Vec::new();
        while let Ok(output) = self.results.try_recv() {
            outputs.push(output);
        }
        outputs
    }

    /// Waits up to `timeout` for one finished job. Test and shutdown aid.
    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<JobOutput> {
        self.results.recv_timeout(timeout).ok()
    }

    /// Number of chunks currently held exclusively by workers.
    #[must_use]
    pub fn held_chunks(&self) -> usize {
        self.held.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.queue.available.notify_all();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
    }
}

/// Runs one job inline on the calling thread, outside the pool. Used for
/// synchronous host calls; the caller must ensure no worker currently
/// holds the target chunk.
pub fn execute_inline(context: &WorkerContext, job: Job) -> JobOutput {
    let held = DashMap::new();
    execute_job(context, &held, job)
}

fn worker_loop(
    context: &WorkerContext,
    queue: &JobQueue,
    shutdown: &AtomicBool,
    held: &DashMap<ChunkId, ()>,
    tx: &Sender<JobOutput>,
) {
    loop {
        let job = {
            let mut heap = queue.heap.lock();
            loop {
                if shutdown.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(queued) = heap.pop() {
                    break queued.0;
                }
                queue.available.wait(&mut heap);
            }
        };
        let output = execute_job(context, held, job);
        if tx.send(output).is_err() {
            return;
        }
    }
}

/// Removes the held-chunk marker when a job's exclusive section ends.
struct HeldMarker<'a> {
    held: &'a DashMap<ChunkId, ()>,
    id: ChunkId,
}

impl<'a> HeldMarker<'a> {
    fn acquire(held: &'a DashMap<ChunkId, ()>, id: ChunkId) -> Self {
        let previous = held.insert(id, ());
        assert!(
            previous.is_none(),
            "chunk {} acquired by two workers",
            id.raw()
        );
        Self { held, id }
    }
}

impl Drop for HeldMarker<'_> {
    fn drop(&mut self) {
        self.held.remove(&self.id);
    }
}

fn execute_job(context: &WorkerContext, held: &DashMap<ChunkId, ()>, job: Job) -> JobOutput {
    let start = Instant::now();
    let output = match job.kind {
        JobKind::CreateChunk | JobKind::Collapse => run_solver_job(context, held, &job, true),
        JobKind::PropagateBoundary => run_solver_job(context, held, &job, false),
        JobKind::Unload => run_unload(context, held, &job),
    };
    context
        .telemetry
        .record_duration("job_duration", start.elapsed());
    output
}

/// Runs a collapse or boundary-propagation job. `observe` selects whether
/// the solver may pick new cells to collapse or only restores consistency.
fn run_solver_job(
    context: &WorkerContext,
    held: &DashMap<ChunkId, ()>,
    job: &Job,
    observe: bool,
) -> JobOutput {
    let start = Instant::now();
    let Some(chunk_arc) = context.store.get_by_id(job.chunk) else {
        // Unloaded before we got to it.
        return JobOutput::status_only(job, RunStatus::Cancelled, start.elapsed());
    };

    // Phase 1: read neighbour ids under our own read lock, then read each
    // neighbour's face without holding any other lock. One lock at a time.
    let neighbour_ids: Vec<(Direction, ChunkId)> = {
        let chunk = chunk_arc.read();
        Direction::ALL
            .iter()
            .filter_map(|&dir| chunk.neighbour(dir).map(|id| (dir, id)))
            .collect()
    };
    let mut neighbour_faces: Vec<(Direction, Vec<StateSet>)> = Vec::new();
    for (dir, id) in neighbour_ids {
        if let Some(neighbour) = context.store.get_by_id(id) {
            let face = neighbour.read().face_possible(dir.opposite());
            neighbour_faces.push((dir, face));
        }
    }

    let bias_map = context.model.read().chunk_bias_map(job.coord);

    // Phase 2: exclusive section. The marker lives strictly inside the
    // lock scope so the one-writer assert never fires on a handover.
    let mut chunk = chunk_arc.write();
    let marker = HeldMarker::acquire(held, job.chunk);

    for (dir, face) in &neighbour_faces {
        if let Some(buffer) = chunk.buffer_mut(*dir) {
            buffer.sync_from_face(face);
        }
    }

    // Collect inbound mirror updates before borrowing the grid.
    let mut inbound: Vec<(Direction, usize, StateSet)> = Vec::new();
    for dir in Direction::ALL {
        if let Some(buffer) = chunk.buffer_mut(dir) {
            for face_index in buffer.take_dirty() {
                if let Some(mirror) = buffer.mirror(face_index) {
                    inbound.push((dir, face_index, mirror.clone()));
                }
            }
        }
    }

    let chunk_id = chunk.id;
    let max_iterations = chunk.max_iterations;
    let constraint_influence = chunk.constraint_influence;
    let mut engine = WfcEngine::new(
        Arc::clone(&context.adjacency),
        chunk_seed(context.random_seed, job.coord),
        constraint_influence,
    );

    let (grid, queue, mirrors) = chunk.solver_parts();

    let mut report = RunReport {
        status: RunStatus::Done,
        cells_collapsed: 0,
        propagations: 0,
        contradictions: 0,
        outbound: Vec::new(),
    };

    let mut contradicted = false;
    for (dir, face_index, mirror) in &inbound {
        let outcome =
            engine.apply_mirror_constraint(grid, queue, chunk_id, *dir, *face_index, mirror);
        if outcome == ShrinkOutcome::Contradiction {
            contradicted = true;
            break;
        }
    }

    if contradicted {
        report.status = RunStatus::Contradiction;
        report.contradictions += 1;
    } else if observe {
        let deadline = job.wall_budget.map(|budget| start + budget);
        report = engine.run(
            grid,
            queue,
            &*bias_map,
            &mirrors,
            chunk_id,
            max_iterations,
            deadline,
            Some(&job.cancel),
        );
    } else {
        let mut propagate_report = RunReport {
            status: RunStatus::Done,
            cells_collapsed: 0,
            propagations: 0,
            contradictions: 0,
            outbound: Vec::new(),
        };
        match engine.propagate(grid, queue, &mirrors, chunk_id, &mut propagate_report) {
            Ok(()) => {}
            Err(cell) => {
                debug!(cell, "contradiction during boundary propagation");
                propagate_report.status = RunStatus::Contradiction;
                propagate_report.contradictions += 1;
            }
        }
        report = propagate_report;
    }

    // Conflict scan against the freshly synced mirrors.
    let mut conflicts = Vec::new();
    for dir in Direction::ALL {
        if let Some(buffer) = chunk.buffer(dir) {
            for conflict in buffer.detect_conflicts(&chunk.grid, &context.adjacency) {
                conflicts.push((dir, conflict));
            }
        }
    }

    drop(marker);
    drop(chunk);

    context
        .telemetry
        .incr_counter(counters::CELLS_COLLAPSED, report.cells_collapsed as u64);
    context
        .telemetry
        .incr_counter(counters::PROPAGATION_EVENTS, report.propagations as u64);
    if report.contradictions > 0 {
        context
            .telemetry
            .incr_counter(counters::CONTRADICTIONS, report.contradictions as u64);
    }
    if report.status == RunStatus::Cancelled {
        context.telemetry.incr_counter(counters::JOBS_CANCELLED, 1);
    }

    JobOutput {
        job_id: job.id,
        kind: job.kind,
        coord: job.coord,
        chunk: job.chunk,
        status: report.status,
        cells_collapsed: report.cells_collapsed,
        propagations: report.propagations,
        contradictions: report.contradictions,
        outbound: report.outbound,
        conflicts,
        duration: start.elapsed(),
    }
}

fn run_unload(context: &WorkerContext, held: &DashMap<ChunkId, ()>, job: &Job) -> JobOutput {
    let start = Instant::now();
    if let Some(chunk_arc) = context.store.get_by_id(job.chunk) {
        // Waiting on the write lock is the safe point: any in-flight solver
        // job has seen its cancel flag and released the chunk.
        let chunk = chunk_arc.write();
        let marker = HeldMarker::acquire(held, job.chunk);
        drop(marker);
        drop(chunk);
    }
    // Remove only if the coordinate still maps to this chunk.
    let matches = context
        .store
        .get(job.coord)
        .map(|c| c.read().id == job.chunk)
        .unwrap_or(false);
    if matches {
        context.store.remove(job.coord);
        context.telemetry.incr_counter(counters::CHUNKS_UNLOADED, 1);
    }
    JobOutput::status_only(job, RunStatus::Done, start.elapsed())
}
