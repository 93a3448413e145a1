//! Combined constraint model with per-chunk bias caching.

use std::sync::Arc;

use ahash::AHashMap;
use glam::Vec3;
use noise::{NoiseFn, Perlin};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use strata_common::{ChunkCoord, LocalCoord};
use strata_wfc::{BiasProvider, State};

use crate::global::GlobalConstraint;
use crate::local::LocalConstraints;
use crate::region::RegionConstraint;

/// Cross-type combination weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeWeights {
    /// Weight of the global tier.
    pub global: f32,
    /// Weight of the region tier.
    pub region: f32,
    /// Weight of the local tier.
    pub local: f32,
}

impl Default for TypeWeights {
    fn default() -> Self {
        Self {
            global: 0.7,
            region: 1.0,
            local: 1.0,
        }
    }
}

/// Precomputed bias map for every cell of one chunk.
///
/// Backs the solver's [`BiasProvider`] lookups; built once per chunk and
/// memoised until an intersecting constraint changes.
#[derive(Debug)]
pub struct ChunkBiasMap {
    /// `biases[cell * S + state]`, each in `[-1, 1]`.
    biases: Vec<f32>,
    /// Strongest bias magnitude per cell, in `[0, 1]`.
    influence: Vec<f32>,
    num_states: u16,
}

impl ChunkBiasMap {
    /// An all-zero map (no constraints touch the chunk).
    #[must_use]
    pub fn neutral(cell_count: usize, num_states: u16) -> Self {
        Self {
            biases: vec![0.0; cell_count * num_states as usize],
            influence: vec![0.0; cell_count],
            num_states,
        }
    }

    /// True when no cell carries a bias.
    #[must_use]
    pub fn is_neutral(&self) -> bool {
        self.influence.iter().all(|&i| i == 0.0)
    }
}

impl BiasProvider for ChunkBiasMap {
    fn state_bias(&self, cell_index: usize, state: State) -> f32 {
        self.biases[cell_index * self.num_states as usize + state as usize]
    }

    fn influence(&self, cell_index: usize) -> f32 {
        self.influence[cell_index]
    }
}

/// Global + regional + per-cell biases, evaluated to a per-state bias map
/// for any world position.
///
/// Mutations invalidate the memoised bias maps of every chunk whose AABB
/// intersects the changed constraint's footprint.
pub struct ConstraintModel {
    num_states: u16,
    chunk_size: u32,
    weights: TypeWeights,
    globals: Vec<GlobalConstraint>,
    regions: Vec<RegionConstraint>,
    locals: LocalConstraints,
    perlin: Perlin,
    cache: RwLock<AHashMap<ChunkCoord, Arc<ChunkBiasMap>>>,
}

impl std::fmt::Debug for ConstraintModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstraintModel")
            .field("num_states", &self.num_states)
            .field("globals", &self.globals.len())
            .field("regions", &self.regions.len())
            .field("locals", &self.locals.len())
            .field("cached_chunks", &self.cache.read().len())
            .finish()
    }
}

impl ConstraintModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new(num_states: u16, chunk_size: u32, noise_seed: u32) -> Self {
        Self {
            num_states,
            chunk_size,
            weights: TypeWeights::default(),
            globals: Vec::new(),
            regions: Vec::new(),
            locals: LocalConstraints::new(),
            perlin: Perlin::new(noise_seed),
            cache: RwLock::new(AHashMap::new()),
        }
    }

    /// Overrides the cross-type weights.
    pub fn set_weights(&mut self, weights: TypeWeights) {
        self.weights = weights;
        self.cache.write().clear();
    }

    /// Registered global constraints.
    #[must_use]
    pub fn globals(&self) -> &[GlobalConstraint] {
        &self.globals
    }

    /// Registered region constraints.
    #[must_use]
    pub fn regions(&self) -> &[RegionConstraint] {
        &self.regions
    }

    /// Registered local constraints.
    #[must_use]
    pub fn locals(&self) -> &LocalConstraints {
        &self.locals
    }

    /// Adds a global constraint and invalidates intersecting chunks.
    pub fn add_global(&mut self, constraint: GlobalConstraint) {
        self.invalidate_global_footprint(&constraint);
        debug!(name = %constraint.name, "adding global constraint");
        self.globals.push(constraint);
    }

    /// Removes a global constraint by name. Returns true if it existed.
    pub fn remove_global(&mut self, name: &str) -> bool {
        let Some(index) = self.globals.iter().position(|c| c.name == name) else {
            return false;
        };
        let constraint = self.globals.remove(index);
        self.invalidate_global_footprint(&constraint);
        true
    }

    /// Adds a region constraint and invalidates covered chunks.
    pub fn add_region(&mut self, constraint: RegionConstraint) {
        self.invalidate_region_footprint(&constraint);
        debug!(name = %constraint.name, "adding region constraint");
        self.regions.push(constraint);
    }

    /// Removes a region constraint by name. Returns true if it existed.
    pub fn remove_region(&mut self, name: &str) -> bool {
        let Some(index) = self.regions.iter().position(|c| c.name == name) else {
            return false;
        };
        let constraint = self.regions.remove(index);
        self.invalidate_region_footprint(&constraint);
        true
    }

    /// Sets a per-cell bias and invalidates the chunk.
    pub fn set_local(&mut self, chunk: ChunkCoord, cell_index: usize, state: State, bias: f32) {
        self.locals.set(chunk, cell_index, state, bias);
        self.invalidate_chunk(chunk);
    }

    /// Removes a per-cell bias. Returns true if a bias was present.
    pub fn remove_local(&mut self, chunk: ChunkCoord, cell_index: usize, state: State) -> bool {
        let removed = self.locals.remove(chunk, cell_index, state);
        if removed {
            self.invalidate_chunk(chunk);
        }
        removed
    }

    /// Drops the memoised bias map of one chunk.
    pub fn invalidate_chunk(&self, chunk: ChunkCoord) {
        self.cache.write().remove(&chunk);
    }

    fn invalidate_global_footprint(&self, constraint: &GlobalConstraint) {
        let size = self.chunk_size as f32;
        self.cache.write().retain(|coord, _| {
            let min = Vec3::new(
                coord.x as f32 * size,
                coord.y as f32 * size,
                coord.z as f32 * size,
            );
            !constraint.intersects_aabb(min, min + Vec3::splat(size))
        });
    }

    fn invalidate_region_footprint(&self, constraint: &RegionConstraint) {
        self.cache
            .write()
            .retain(|coord, _| !constraint.covers_chunk(*coord));
    }

    /// Evaluates the combined per-state bias map at one position. Every
    /// entry is in `[-1, 1]`.
    #[must_use]
    pub fn biases_at(
        &self,
        world_pos: Vec3,
        chunk_coord: ChunkCoord,
        local: LocalCoord,
    ) -> Vec<f32> {
        let s = self.num_states as usize;
        let mut global_acc = TierAccumulator::new(s);
        let mut region_acc = TierAccumulator::new(s);
        let mut local_acc = TierAccumulator::new(s);

        for constraint in &self.globals {
            let mut influence = constraint.influence_at(world_pos);
            if influence <= 0.0 {
                continue;
            }
            if constraint.noise_amount > 0.0 {
                influence *= self.noise_factor(constraint, world_pos);
            }
            let scale = influence * constraint.height_factor(world_pos) * constraint.kind_damping();
            for (&state, &bias) in &constraint.state_biases {
                global_acc.add(state, scale * bias);
            }
        }

        let cell = Vec3::new(
            f32::from(local.x) + 0.5,
            f32::from(local.y) + 0.5,
            f32::from(local.z) + 0.5,
        );
        for constraint in &self.regions {
            constraint.accumulate(
                chunk_coord,
                cell,
                world_pos.y,
                self.chunk_size,
                &mut |state, bias| region_acc.add(state, bias),
            );
        }

        if let Some(cell_biases) = self.locals.get(chunk_coord, local.to_index(self.chunk_size)) {
            for (&state, &bias) in cell_biases {
                local_acc.add(state, bias);
            }
        }

        let mut out = vec![0.0f32; s];
        for (state, slot) in out.iter_mut().enumerate() {
            let g = self.weights.global * global_acc.mean(state);
            let r = self.weights.region * region_acc.mean(state);
            let l = self.weights.local * local_acc.mean(state);
            *slot = combine_pair(combine_pair(g, r), l).clamp(-1.0, 1.0);
        }
        out
    }

    fn noise_factor(&self, constraint: &GlobalConstraint, pos: Vec3) -> f32 {
        let p = pos * constraint.noise_scale;
        let n = self.perlin.get([f64::from(p.x), f64::from(p.y), f64::from(p.z)]) as f32;
        // Map [-1, 1] noise onto [1 - amount, 1].
        1.0 - constraint.noise_amount.clamp(0.0, 1.0) * 0.5 * (1.0 + n)
    }

    /// Returns the memoised bias map for a chunk, computing it on first
    /// use.
    #[must_use]
    pub fn chunk_bias_map(&self, chunk: ChunkCoord) -> Arc<ChunkBiasMap> {
        if let Some(map) = self.cache.read().get(&chunk) {
            return Arc::clone(map);
        }

        let map = Arc::new(self.compute_chunk_bias_map(chunk));
        self.cache.write().insert(chunk, Arc::clone(&map));
        map
    }

    fn compute_chunk_bias_map(&self, chunk: ChunkCoord) -> ChunkBiasMap {
        let size = self.chunk_size;
        let s = self.num_states as usize;
        let cell_count = (size * size * size) as usize;
        let base = chunk.to_world_coord(size);

        let mut map = ChunkBiasMap::neutral(cell_count, self.num_states);
        for index in 0..cell_count {
            let local = LocalCoord::from_index(index, size);
            let world_pos = Vec3::new(
                base.x as f32 + f32::from(local.x) + 0.5,
                base.y as f32 + f32::from(local.y) + 0.5,
                base.z as f32 + f32::from(local.z) + 0.5,
            );
            let biases = self.biases_at(world_pos, chunk, local);
            let mut strongest = 0.0f32;
            for (state, bias) in biases.iter().enumerate() {
                map.biases[index * s + state] = *bias;
                strongest = strongest.max(bias.abs());
            }
            map.influence[index] = strongest;
        }
        map
    }

    /// Number of chunks with a memoised bias map. Test hook.
    #[must_use]
    pub fn cached_chunk_count(&self) -> usize {
        self.cache.read().len()
    }
}

/// Within-tier accumulator: contributions to the same state combine by
/// sign-preserving mean. Positive and negative contributions are averaged
/// separately and the stronger side wins, so opposing hints never cancel
/// into a silent zero.
struct TierAccumulator {
    pos_sum: Vec<f32>,
    pos_count: Vec<u32>,
    neg_sum: Vec<f32>,
    neg_count: Vec<u32>,
}

impl TierAccumulator {
    fn new(num_states: usize) -> Self {
        Self {
            pos_sum: vec![0.0; num_states],
            pos_count: vec![0; num_states],
            neg_sum: vec![0.0; num_states],
            neg_count: vec![0; num_states],
        }
    }

    fn add(&mut self, state: State, value: f32) {
        let s = state as usize;
        if s >= self.pos_sum.len() || value == 0.0 {
            return;
        }
        if value > 0.0 {
            self.pos_sum[s] += value;
            self.pos_count[s] += 1;
        } else {
            self.neg_sum[s] += value;
            self.neg_count[s] += 1;
        }
    }

    fn mean(&self, state: usize) -> f32 {
        let pos = if self.pos_count[state] > 0 {
            self.pos_sum[state] / self.pos_count[state] as f32
        } else {
            0.0
        };
        let neg = if self.neg_count[state] > 0 {
            self.neg_sum[state] / self.neg_count[state] as f32
        } else {
            0.0
        };
        if pos.abs() >= neg.abs() {
            if pos > 0.0 {
                pos
            } else {
                neg
            }
        } else {
            neg
        }
    }
}

/// Cross-type pairwise combination: opposite signs let the larger magnitude
/// win outright; matching signs blend by magnitude-weighted mean.
fn combine_pair(a: f32, b: f32) -> f32 {
    if a == 0.0 {
        return b;
    }
    if b == 0.0 {
        return a;
    }
    if a.signum() != b.signum() {
        return if a.abs() >= b.abs() { a } else { b };
    }
    (a * a.abs() + b * b.abs()) / (a.abs() + b.abs())
}
