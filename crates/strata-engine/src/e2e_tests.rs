//! End-to-end scenarios driving the full engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use parking_lot::RwLock;

use strata_common::{ChunkCoord, Direction, JobId, LocalCoord};
use strata_constraints::{ConstraintModel, GlobalConstraint, GlobalKind, TypeWeights};
use strata_wfc::RunStatus;
use strata_world::ChunkStore;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::events::EngineEvent;
use crate::job::{Job, JobKind};
use crate::telemetry::{counters, CountingTelemetry, Telemetry};
use crate::worker::{WorkerContext, WorkerPool};

/// Adjacency where each state only neighbours itself.
fn equal_only_config(states: u16, chunk_size: u32) -> EngineConfig {
    let s = states as usize;
    let mut adjacency = vec![false; s * s * Direction::COUNT];
    for a in 0..s {
        for d in 0..Direction::COUNT {
            adjacency[(a * s + a) * Direction::COUNT + d] = true;
        }
    }
    let mut config = EngineConfig::default();
    config.world_max_states = states;
    config.chunk_size = chunk_size;
    config.adjacency = adjacency;
    config.scheduler.workers = 1;
    config
}

/// Adjacency where every pair is allowed everywhere.
fn uniform_config(states: u16, chunk_size: u32) -> EngineConfig {
    let s = states as usize;
    let mut config = EngineConfig::default();
    config.world_max_states = states;
    config.chunk_size = chunk_size;
    config.adjacency = vec![true; s * s * Direction::COUNT];
    config.scheduler.workers = 1;
    config
}

#[test]
fn scenario_single_chunk_fully_collapses() {
    let mut engine = Engine::new(equal_only_config(2, 4)).expect("config valid");
    let coord = ChunkCoord::new(0, 0, 0);

    let status = engine.collapse_now(coord);

    assert_eq!(status, RunStatus::Done);
    let view = engine.snapshot_chunk(coord).expect("loaded");
    assert_eq!(view.cells.len(), 64);
    assert!(view.cells.iter().all(|c| c.collapsed.is_some()));
    assert!(view.fully_collapsed);
    assert!(engine.drain_events().iter().all(|e| !matches!(
        e,
        EngineEvent::Contradiction { .. } | EngineEvent::BoundaryConflict { .. }
    )));
}

#[test]
fn scenario_seed_propagates_across_boundary() {
    // Two chunks along +X, S=2, states only neighbour themselves. Seeding
    // one cell of chunk A decides chunk A entirely; the shared face then
    // decides the touching face of chunk B.
    let mut engine = Engine::new(equal_only_config(2, 4)).expect("config valid");
    let a = ChunkCoord::new(0, 0, 0);
    let b = ChunkCoord::new(1, 0, 0);
    engine.ensure_chunk(a);
    engine.ensure_chunk(b);

    engine.seed_chunk(a, &[(0, 1)]).expect("state 1 possible");
    assert_eq!(engine.collapse_now(a), RunStatus::Done);
    engine.propagate_now();

    let view = engine.snapshot_chunk(b).expect("loaded");
    for y in 0..4 {
        for z in 0..4 {
            let cell = view.get(0, y, z).expect("in range");
            assert_eq!(cell.collapsed, Some(1), "face cell ({y}, {z}) not forced");
        }
    }
}

#[test]
fn scenario_boundary_coherence_full_face() {
    // S=3, equal-only adjacency: chunk A seeded to state 2 drives chunk
    // B's opposite face to 2 after both have run.
    let mut engine = Engine::new(equal_only_config(3, 4)).expect("config valid");
    let a = ChunkCoord::new(0, 0, 0);
    let b = ChunkCoord::new(1, 0, 0);
    engine.ensure_chunk(a);
    engine.ensure_chunk(b);

    engine.seed_chunk(a, &[(0, 2)]).expect("state 2 possible");
    assert_eq!(engine.collapse_now(a), RunStatus::Done);
    engine.propagate_now();
    assert_eq!(engine.collapse_now(b), RunStatus::Done);

    let view_b = engine.snapshot_chunk(b).expect("loaded");
    assert!(view_b.cells.iter().all(|c| c.collapsed == Some(2)));
}

#[test]
fn scenario_conflict_resolution_degrades_one_side() {
    // Both chunks independently collapse their shared face cell (2, 2) to
    // incompatible states. After boundary processing exactly one side is
    // degraded and holds a value compatible with the earlier collapse.
    let mut engine = Engine::new(equal_only_config(2, 4)).expect("config valid");
    let a = ChunkCoord::new(0, 0, 0);
    let b = ChunkCoord::new(1, 0, 0);
    engine.ensure_chunk(a);
    engine.ensure_chunk(b);

    // Face (2, 2) of A's +X face is local (3, 2, 2); its partner on B's
    // -X face is local (0, 2, 2).
    let a_cell = LocalCoord::new(3, 2, 2).to_index(4);
    let b_cell = LocalCoord::new(0, 2, 2).to_index(4);
    engine.seed_chunk(a, &[(a_cell, 0)]).expect("seed a");
    engine.seed_chunk(b, &[(b_cell, 1)]).expect("seed b");

    engine.collapse_now(a);
    engine.collapse_now(b);
    engine.propagate_now();

    let view_a = engine.snapshot_chunk(a).expect("loaded");
    let view_b = engine.snapshot_chunk(b).expect("loaded");
    let cell_a = view_a.get(3, 2, 2).expect("in range");
    let cell_b = view_b.get(0, 2, 2).expect("in range");

    let degraded = usize::from(cell_a.degraded) + usize::from(cell_b.degraded);
    assert_eq!(degraded, 1, "exactly one side must be degraded");
    // The surviving pair is compatible: equal states under this table.
    assert_eq!(cell_a.collapsed, cell_b.collapsed);
}

#[test]
fn scenario_biome_bias_dominates_core() {
    // S=3, uniform adjacency, a biome region at the world centre pushing
    // state 1. Inside the core the state dominates; far outside the blend
    // radius the distribution stays near uniform.
    let core = ChunkCoord::new(0, 0, 0);
    let far = ChunkCoord::new(8, 0, 0);

    let mut core_hits = 0usize;
    let mut core_total = 0usize;
    let mut far_hits = 0usize;
    let mut far_total = 0usize;

    for seed in 0..100u64 {
        let mut config = uniform_config(3, 4);
        config.random_seed = seed;
        let mut engine = Engine::new(config).expect("config valid");
        engine.set_constraint_weights(TypeWeights {
            global: 1.0,
            region: 1.0,
            local: 1.0,
        });

        let mut biases = HashMap::new();
        biases.insert(0u16, -0.9f32);
        biases.insert(1u16, 0.9f32);
        biases.insert(2u16, -0.9f32);
        engine.add_global_constraint(GlobalConstraint::new(
            "centre-biome",
            GlobalKind::BiomeRegion,
            Vec3::splat(2.0),
            Vec3::splat(8.0),
            4.0,
            1.0,
            biases,
        ));

        engine.collapse_now(core);
        engine.collapse_now(far);

        let view = engine.snapshot_chunk(core).expect("loaded");
        for cell in &view.cells {
            core_total += 1;
            if cell.collapsed == Some(1) {
                core_hits += 1;
            }
        }
        let view = engine.snapshot_chunk(far).expect("loaded");
        for cell in &view.cells {
            far_total += 1;
            if cell.collapsed == Some(1) {
                far_hits += 1;
            }
        }
    }

    let core_rate = core_hits as f32 / core_total as f32;
    let far_rate = far_hits as f32 / far_total as f32;
    assert!(core_rate >= 0.8, "core rate {core_rate} below 0.8");
    assert!(far_rate <= 0.4, "far rate {far_rate} above 0.4");
}

#[test]
fn scenario_heightmap_prefers_state_in_lower_layers() {
    // A HeightMap biasing state 1 up and state 0 down skews the lower
    // half of the box towards state 1, well clear of the uniform 50%.
    let coord = ChunkCoord::new(0, 0, 0);
    let mut low_hits = 0usize;
    let mut low_total = 0usize;
    let mut high_rate_acc = 0.0f32;
    let mut runs = 0usize;

    for seed in 0..32u64 {
        let mut config = uniform_config(2, 4);
        config.random_seed = seed;
        let mut engine = Engine::new(config).expect("config valid");
        engine.set_constraint_weights(TypeWeights {
            global: 1.0,
            region: 1.0,
            local: 1.0,
        });

        let mut biases = HashMap::new();
        biases.insert(0u16, -0.8f32);
        biases.insert(1u16, 0.6f32);
        engine.add_global_constraint(GlobalConstraint::new(
            "bedrock",
            GlobalKind::HeightMap,
            Vec3::new(2.0, 2.0, 2.0),
            Vec3::new(8.0, 4.0, 8.0),
            0.0,
            1.0,
            biases,
        ));

        engine.collapse_now(coord);
        let view = engine.snapshot_chunk(coord).expect("loaded");

        let mut high_hits = 0usize;
        let mut high_total = 0usize;
        for y in 0..4u16 {
            for z in 0..4u16 {
                for x in 0..4u16 {
                    let cell = view.get(x, y, z).expect("in range");
                    if y < 2 {
                        low_total += 1;
                        if cell.collapsed == Some(1) {
                            low_hits += 1;
                        }
                    } else {
                        high_total += 1;
                        if cell.collapsed == Some(1) {
                            high_hits += 1;
                        }
                    }
                }
            }
        }
        high_rate_acc += high_hits as f32 / high_total as f32;
        runs += 1;
    }

    let low_rate = low_hits as f32 / low_total as f32;
    let high_rate = high_rate_acc / runs as f32;
    assert!(low_rate > 0.55, "low-layer rate {low_rate} not skewed");
    assert!(
        low_rate > high_rate,
        "low rate {low_rate} does not beat high rate {high_rate}"
    );
}

#[test]
fn scenario_scheduler_loads_ahead_and_unloads_behind() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    // Viewer at the origin moving +X; r_load=16, r_unload=24, C=8.
    let mut config = equal_only_config(2, 8);
    config.scheduler.load_distance = 16.0;
    config.scheduler.unload_distance = 24.0;
    config.scheduler.max_concurrent_chunks = 2;
    config.scheduler.workers = 1;
    let mut engine = Engine::new(config).expect("config valid");

    let loaded_order: Arc<parking_lot::Mutex<Vec<ChunkCoord>>> =
        Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&loaded_order);
    engine.subscribe_events(move |event| {
        if let EngineEvent::ChunkLoaded { coord } = event {
            sink.lock().push(*coord);
        }
    });

    engine.update_viewer(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0));
    for _ in 0..5 {
        engine.tick();
        std::thread::sleep(Duration::from_millis(20));
    }

    // Chunks within the load radius exist on both sides.
    assert!(engine.snapshot_chunk(ChunkCoord::new(0, 0, 0)).is_some());
    assert!(engine.snapshot_chunk(ChunkCoord::new(-1, 0, 0)).is_some());

    // The first chunk that finished loading was in front of the viewer,
    // not behind it.
    let first = loaded_order.lock().first().copied().expect("jobs finished");
    assert!(first.x >= 0, "first loaded chunk {first:?} was behind");

    // Teleport far away: everything near the origin leaves within a
    // couple of scheduling rounds.
    engine.update_viewer(Vec3::new(1000.0, 0.0, 0.0), Vec3::ZERO);
    let mut gone = false;
    for _ in 0..50 {
        engine.tick();
        if engine.snapshot_chunk(ChunkCoord::new(0, 0, 0)).is_none() {
            gone = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(gone, "origin chunk never unloaded");
}

#[test]
fn scenario_unload_mid_collapse_cancels_cleanly() {
    // A large chunk is mid-collapse when its cancel flag is raised; the
    // job returns Cancelled at the next iteration boundary with cell
    // invariants intact.
    let states = 8u16;
    let chunk_size = 32u32;
    let s = states as usize;
    let adjacency_flat = vec![true; s * s * Direction::COUNT];
    let adjacency = Arc::new(
        strata_wfc::AdjacencyTable::from_flat(states, &adjacency_flat).expect("symmetric"),
    );
    let store = Arc::new(ChunkStore::new(chunk_size, states));
    let telemetry = Arc::new(CountingTelemetry::new());
    let context = WorkerContext {
        store: Arc::clone(&store),
        adjacency,
        model: Arc::new(RwLock::new(ConstraintModel::new(states, chunk_size, 0))),
        random_seed: 3,
        telemetry: Arc::clone(&telemetry) as Arc<dyn Telemetry>,
    };

    let coord = ChunkCoord::new(0, 0, 0);
    let id = store.create(coord, 0, u32::MAX, 1.0);
    let pool = WorkerPool::new(context, 1);

    let cancel = Arc::new(AtomicBool::new(false));
    pool.submit(Job {
        id: JobId::next(),
        kind: JobKind::Collapse,
        coord,
        chunk: id,
        priority: 1.0,
        wall_budget: None,
        cancel: Arc::clone(&cancel),
    });

    // Let the job get going, then pull the plug.
    std::thread::sleep(Duration::from_millis(10));
    cancel.store(true, Ordering::SeqCst);

    let output = pool
        .recv_result_timeout(Duration::from_secs(30))
        .expect("job returns");
    assert_eq!(output.status, RunStatus::Cancelled);
    assert_eq!(telemetry.counter(counters::JOBS_CANCELLED), 1);

    let chunk = store.get(coord).expect("still loaded");
    let chunk = chunk.read();
    assert!(chunk.grid.collapsed_count() < chunk.grid.cell_count());
    for cell in chunk.grid.cells() {
        assert_eq!(cell.entropy() as usize, cell.possible().len());
        assert_eq!(cell.is_collapsed(), cell.entropy() == 1);
        assert!(cell.entropy() >= 1);
    }

    // The unload completes afterwards.
    pool.submit(Job {
        id: JobId::next(),
        kind: JobKind::Unload,
        coord,
        chunk: id,
        priority: 1.0,
        wall_budget: None,
        cancel: Arc::new(AtomicBool::new(false)),
    });
    let output = pool
        .recv_result_timeout(Duration::from_secs(5))
        .expect("unload returns");
    assert_eq!(output.status, RunStatus::Done);
    assert!(!store.is_loaded(coord));
}

#[test]
fn scenario_sync_is_idempotent_across_engine() {
    // Two synced neighbours: a second propagation pass with no new
    // mutations schedules no further work.
    let mut engine = Engine::new(equal_only_config(2, 4)).expect("config valid");
    let a = ChunkCoord::new(0, 0, 0);
    let b = ChunkCoord::new(1, 0, 0);
    engine.ensure_chunk(a);
    engine.ensure_chunk(b);
    engine.seed_chunk(a, &[(0, 0)]).expect("seed");
    engine.collapse_now(a);
    engine.propagate_now();
    engine.collapse_now(b);
    engine.propagate_now();

    let before_a = engine.snapshot_chunk(a).expect("loaded");
    let before_b = engine.snapshot_chunk(b).expect("loaded");
    engine.propagate_now();
    let after_a = engine.snapshot_chunk(a).expect("loaded");
    let after_b = engine.snapshot_chunk(b).expect("loaded");

    for (x, y) in before_a.cells.iter().zip(after_a.cells.iter()) {
        assert_eq!(x.possible, y.possible);
    }
    for (x, y) in before_b.cells.iter().zip(after_b.cells.iter()) {
        assert_eq!(x.possible, y.possible);
    }
}

#[test]
fn scenario_determinism_single_worker_fixed_seed() {
    // Same seed, same ordering, no viewer motion: identical output.
    let run = || {
        let mut engine = Engine::new(uniform_config(4, 4)).expect("config valid");
        let coord = ChunkCoord::new(0, 0, 0);
        engine.collapse_now(coord);
        engine
            .snapshot_chunk(coord)
            .expect("loaded")
            .cells
            .iter()
            .map(|c| c.collapsed)
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn scenario_invariants_after_scheduled_work() {
    // Drive the scheduler with several ticks, then check I1 on every
    // loaded chunk.
    let mut config = uniform_config(3, 8);
    config.scheduler.load_distance = 12.0;
    config.scheduler.unload_distance = 20.0;
    config.scheduler.workers = 2;
    config.scheduler.max_concurrent_chunks = 4;
    let mut engine = Engine::new(config).expect("config valid");

    engine.update_viewer(Vec3::ZERO, Vec3::ZERO);
    for _ in 0..20 {
        engine.tick();
        std::thread::sleep(Duration::from_millis(10));
    }

    let stats = engine.stats();
    assert!(stats.loaded_chunks > 0);
    for coord in [ChunkCoord::new(0, 0, 0), ChunkCoord::new(-1, -1, -1)] {
        if let Some(view) = engine.snapshot_chunk(coord) {
            for cell in &view.cells {
                assert_eq!(
                    cell.collapsed.is_some(),
                    cell.possible.len() == 1,
                    "I1 violated in {coord:?}"
                );
            }
        }
    }
}
