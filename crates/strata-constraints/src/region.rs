//! Chunk-space regional constraints.

use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use strata_common::{ChunkCoord, Direction};
use strata_wfc::State;

use crate::curve::Curve;

/// What a regional constraint expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionKind {
    /// A gradient from `source_state` to `target_state` along
    /// `transition_direction`.
    Transition,
    /// A plain bias footprint (a feature placement hint).
    Feature,
    /// A vertical band profile within the region.
    Elevation,
}

/// A constraint over a range of chunks, positioned by a normalised
/// internal AABB.
///
/// The internal AABB is expressed in `[0, 1]` coordinates over the whole
/// covered chunk range; influence falls off linearly over `gradient`
/// (in normalised units) towards the AABB boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConstraint {
    /// Unique name; removal is by name.
    pub name: String,
    /// Constraint kind.
    pub kind: RegionKind,
    /// First chunk covered.
    pub chunk_coord: ChunkCoord,
    /// Number of chunks covered along each axis (>= 1).
    pub chunk_extent: (u32, u32, u32),
    /// Minimum corner of the internal AABB, each component in `[0, 1]`.
    pub internal_origin: Vec3,
    /// Extent of the internal AABB, each component in `[0, 1]`.
    pub internal_size: Vec3,
    /// Influence multiplier in `[0, 1]`.
    pub strength: f32,
    /// Falloff width in normalised units; zero gives a hard edge.
    pub gradient: f32,
    /// Transition start state (Transition kind).
    pub source_state: State,
    /// Transition end state (Transition kind).
    pub target_state: State,
    /// Axis the transition runs along (Transition kind).
    pub transition_direction: Direction,
    /// Additional per-state biases in `[-1, 1]`.
    pub state_biases: HashMap<State, f32>,
    /// World-space height where the elevation profile starts
    /// (Elevation kind).
    pub elevation_offset: f32,
    /// World-space height span of the elevation profile (Elevation kind).
    pub elevation_scale: f32,
    /// Optional elevation profile; `1 - t` when absent.
    pub height_curve: Option<Curve>,
}

impl RegionConstraint {
    /// Creates a Feature-kind constraint covering a single chunk.
    #[must_use]
    pub fn feature(
        name: impl Into<String>,
        chunk_coord: ChunkCoord,
        internal_origin: Vec3,
        internal_size: Vec3,
        strength: f32,
        state_biases: HashMap<State, f32>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RegionKind::Feature,
            chunk_coord,
            chunk_extent: (1, 1, 1),
            internal_origin,
            internal_size,
            strength,
            gradient: 0.0,
            source_state: 0,
            target_state: 0,
            transition_direction: Direction::PosX,
            state_biases,
            elevation_offset: 0.0,
            elevation_scale: 1.0,
            height_curve: None,
        }
    }

    /// Checks whether this region covers `coord`.
    #[must_use]
    pub fn covers_chunk(&self, coord: ChunkCoord) -> bool {
        let (ex, ey, ez) = self.chunk_extent;
        coord.x >= self.chunk_coord.x
            && coord.x < self.chunk_coord.x + ex as i32
            && coord.y >= self.chunk_coord.y
            && coord.y < self.chunk_coord.y + ey as i32
            && coord.z >= self.chunk_coord.z
            && coord.z < self.chunk_coord.z + ez as i32
    }

    /// Normalised position of a cell within the covered chunk range.
    #[must_use]
    pub fn normalised_pos(&self, coord: ChunkCoord, cell: Vec3, chunk_size: u32) -> Vec3 {
        let (ex, ey, ez) = self.chunk_extent;
        let span = Vec3::new(
            ex as f32 * chunk_size as f32,
            ey as f32 * chunk_size as f32,
            ez as f32 * chunk_size as f32,
        );
        let offset = Vec3::new(
            (coord.x - self.chunk_coord.x) as f32 * chunk_size as f32,
            (coord.y - self.chunk_coord.y) as f32 * chunk_size as f32,
            (coord.z - self.chunk_coord.z) as f32 * chunk_size as f32,
        );
        (offset + cell) / span
    }

    /// Influence in `[0, 1]` at a normalised position: full strength deep
    /// inside the internal AABB, linear falloff across `gradient`, zero
    /// outside.
    #[must_use]
    pub fn influence_at(&self, norm: Vec3) -> f32 {
        let min = self.internal_origin;
        let max = self.internal_origin + self.internal_size;
        // Signed distance to the nearest AABB face, positive inside.
        let inside = (norm - min).min(max - norm);
        let depth = inside.min_element();
        if depth < 0.0 {
            return 0.0;
        }
        if self.gradient <= 0.0 {
            return self.strength;
        }
        let t = (depth / self.gradient).clamp(0.0, 1.0);
        self.strength * t
    }

    /// Transition progress in `[0, 1]` along the transition axis at a
    /// normalised position (Transition kind).
    #[must_use]
    pub fn transition_progress(&self, norm: Vec3) -> f32 {
        let min = self.internal_origin;
        let size = self.internal_size.max(Vec3::splat(f32::EPSILON));
        let t = ((norm - min) / size).clamp(Vec3::ZERO, Vec3::ONE);
        let axis_t = match self.transition_direction.axis() {
            0 => t.x,
            1 => t.y,
            _ => t.z,
        };
        if self.transition_direction.is_positive() {
            axis_t
        } else {
            1.0 - axis_t
        }
    }

    /// Elevation profile factor in `[0, 1]` at a world-space height
    /// (Elevation kind).
    #[must_use]
    pub fn elevation_factor(&self, world_y: f32) -> f32 {
        let span = self.elevation_scale.max(f32::EPSILON);
        let t = ((world_y - self.elevation_offset) / span).clamp(0.0, 1.0);
        match &self.height_curve {
            Some(curve) => curve.eval(t),
            None => 1.0 - t,
        }
    }

    /// Accumulates this region's per-state contributions at a cell.
    ///
    /// `coord`/`cell` locate the cell; `world_y` is its world-space height.
    /// Returns nothing when the region does not cover the chunk or the
    /// position falls outside the internal AABB.
    pub fn accumulate(
        &self,
        coord: ChunkCoord,
        cell: Vec3,
        world_y: f32,
        chunk_size: u32,
        out: &mut dyn FnMut(State, f32),
    ) {
        if !self.covers_chunk(coord) {
            return;
        }
        let norm = self.normalised_pos(coord, cell, chunk_size);
        let influence = self.influence_at(norm);
        if influence <= 0.0 {
            return;
        }

        match self.kind {
            RegionKind::Transition => {
                let t = self.transition_progress(norm);
                out(self.source_state, influence * (1.0 - t));
                out(self.target_state, influence * t);
                for (&state, &bias) in &self.state_biases {
                    out(state, influence * bias);
                }
            }
            RegionKind::Feature => {
                for (&state, &bias) in &self.state_biases {
                    out(state, influence * bias);
                }
            }
            RegionKind::Elevation => {
                let factor = self.elevation_factor(world_y);
                for (&state, &bias) in &self.state_biases {
                    out(state, influence * factor * bias);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_chunk_feature(biases: HashMap<State, f32>) -> RegionConstraint {
        RegionConstraint::feature(
            "feat",
            ChunkCoord::new(0, 0, 0),
            Vec3::ZERO,
            Vec3::ONE,
            1.0,
            biases,
        )
    }

    #[test]
    fn test_covers_chunk_range() {
        let mut region = full_chunk_feature(HashMap::new());
        region.chunk_extent = (2, 1, 1);
        assert!(region.covers_chunk(ChunkCoord::new(0, 0, 0)));
        assert!(region.covers_chunk(ChunkCoord::new(1, 0, 0)));
        assert!(!region.covers_chunk(ChunkCoord::new(2, 0, 0)));
        assert!(!region.covers_chunk(ChunkCoord::new(0, 1, 0)));
    }

    #[test]
    fn test_influence_hard_edge_and_gradient() {
        let mut region = full_chunk_feature(HashMap::new());
        region.internal_origin = Vec3::new(0.25, 0.0, 0.0);
        region.internal_size = Vec3::new(0.5, 1.0, 1.0);

        // Hard edge (gradient 0).
        assert_eq!(region.influence_at(Vec3::new(0.5, 0.5, 0.5)), 1.0);
        assert_eq!(region.influence_at(Vec3::new(0.1, 0.5, 0.5)), 0.0);

        // Gradient softens the rim.
        region.gradient = 0.2;
        let rim = region.influence_at(Vec3::new(0.3, 0.5, 0.5));
        assert!(rim > 0.0 && rim < 0.5);
    }

    #[test]
    fn test_transition_progress_direction() {
        let mut region = full_chunk_feature(HashMap::new());
        region.kind = RegionKind::Transition;
        region.source_state = 0;
        region.target_state = 1;
        region.transition_direction = Direction::PosX;

        assert!((region.transition_progress(Vec3::new(0.0, 0.5, 0.5))).abs() < 1e-6);
        assert!((region.transition_progress(Vec3::new(1.0, 0.5, 0.5)) - 1.0).abs() < 1e-6);

        region.transition_direction = Direction::NegX;
        assert!((region.transition_progress(Vec3::new(0.0, 0.5, 0.5)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_transition_biases_sum() {
        let mut region = full_chunk_feature(HashMap::new());
        region.kind = RegionKind::Transition;
        region.source_state = 0;
        region.target_state = 2;
        region.transition_direction = Direction::PosX;

        let mut contributions: Vec<(State, f32)> = Vec::new();
        region.accumulate(
            ChunkCoord::new(0, 0, 0),
            Vec3::new(4.0, 8.0, 8.0),
            8.0,
            16,
            &mut |s, b| contributions.push((s, b)),
        );
        let source = contributions
            .iter()
            .find(|(s, _)| *s == 0)
            .map(|(_, b)| *b)
            .expect("source contribution");
        let target = contributions
            .iter()
            .find(|(s, _)| *s == 2)
            .map(|(_, b)| *b)
            .expect("target contribution");
        assert!(source > target);
        assert!((source + target - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_elevation_profile() {
        let mut biases = HashMap::new();
        biases.insert(1, 1.0);
        let mut region = full_chunk_feature(biases);
        region.kind = RegionKind::Elevation;
        region.elevation_offset = 0.0;
        region.elevation_scale = 16.0;

        let collect = |world_y: f32| {
            let mut got = 0.0;
            region.accumulate(
                ChunkCoord::new(0, 0, 0),
                Vec3::new(8.0, 8.0, 8.0),
                world_y,
                16,
                &mut |_, b| got = b,
            );
            got
        };
        assert!(collect(0.0) > collect(8.0));
        assert!(collect(8.0) > collect(15.9));
    }
}
