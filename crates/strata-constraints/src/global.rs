//! World-space global constraints.

use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use strata_wfc::State;

use crate::curve::Curve;

/// Scale applied to HeightMap biases to keep vertical layers from striping.
const HEIGHT_MAP_DAMPING: f32 = 0.5;

/// What a global constraint expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalKind {
    /// A biome-like region: uniform biases inside the AABB.
    BiomeRegion,
    /// A vertical profile: biases weighted by height inside the AABB.
    HeightMap,
}

/// A constraint over a world-space AABB with a blend falloff.
///
/// Inside the box the influence equals `strength` (possibly modulated by
/// noise or the height profile); outside it decays over `blend_radius` to
/// zero, linearly or along `blend_curve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConstraint {
    /// Unique name; removal is by name.
    pub name: String,
    /// Constraint kind.
    pub kind: GlobalKind,
    /// Centre of the AABB in world space.
    pub world_center: Vec3,
    /// Full extent of the AABB in world space.
    pub world_size: Vec3,
    /// Distance over which influence decays outside the AABB.
    pub blend_radius: f32,
    /// Influence multiplier in `[0, 1]`.
    pub strength: f32,
    /// Per-state biases in `[-1, 1]`.
    pub state_biases: HashMap<State, f32>,
    /// Optional falloff shape outside the AABB; linear when absent.
    pub blend_curve: Option<Curve>,
    /// Optional vertical profile for HeightMap constraints; `1 - t` when
    /// absent (strongest at the bottom of the box).
    pub height_curve: Option<Curve>,
    /// Amount of noise modulation in `[0, 1]`; zero disables it.
    pub noise_amount: f32,
    /// Spatial frequency of the noise modulation.
    pub noise_scale: f32,
}

impl GlobalConstraint {
    /// Creates a constraint with no blend curve, no noise, and the given
    /// biases.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: GlobalKind,
        world_center: Vec3,
        world_size: Vec3,
        blend_radius: f32,
        strength: f32,
        state_biases: HashMap<State, f32>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            world_center,
            world_size,
            blend_radius,
            strength,
            state_biases,
            blend_curve: None,
            height_curve: None,
            noise_amount: 0.0,
            noise_scale: 0.01,
        }
    }

    /// Minimum corner of the AABB.
    #[must_use]
    pub fn aabb_min(&self) -> Vec3 {
        self.world_center - self.world_size * 0.5
    }

    /// Maximum corner of the AABB.
    #[must_use]
    pub fn aabb_max(&self) -> Vec3 {
        self.world_center + self.world_size * 0.5
    }

    /// Positional influence in `[0, 1]` before noise modulation: `strength`
    /// inside the AABB, blended to zero over `blend_radius` outside it.
    #[must_use]
    pub fn influence_at(&self, pos: Vec3) -> f32 {
        let min = self.aabb_min();
        let max = self.aabb_max();
        let outside = (min - pos).max(pos - max).max(Vec3::ZERO);
        let distance = outside.length();
        if distance <= 0.0 {
            return self.strength;
        }
        if self.blend_radius <= 0.0 || distance >= self.blend_radius {
            return 0.0;
        }
        let t = 1.0 - distance / self.blend_radius;
        let factor = match &self.blend_curve {
            Some(curve) => curve.eval(t),
            None => t,
        };
        self.strength * factor
    }

    /// Height factor in `[0, 1]` for HeightMap constraints; 1 for others.
    #[must_use]
    pub fn height_factor(&self, pos: Vec3) -> f32 {
        if self.kind != GlobalKind::HeightMap {
            return 1.0;
        }
        let min_y = self.aabb_min().y;
        let size_y = self.world_size.y.max(f32::EPSILON);
        let t = ((pos.y - min_y) / size_y).clamp(0.0, 1.0);
        match &self.height_curve {
            Some(curve) => curve.eval(t),
            None => 1.0 - t,
        }
    }

    /// Damping applied to this constraint's biases before combination.
    #[must_use]
    pub fn kind_damping(&self) -> f32 {
        match self.kind {
            GlobalKind::BiomeRegion => 1.0,
            GlobalKind::HeightMap => HEIGHT_MAP_DAMPING,
        }
    }

    /// Whether this constraint's footprint (AABB plus blend radius)
    /// intersects the given world-space box.
    #[must_use]
    pub fn intersects_aabb(&self, box_min: Vec3, box_max: Vec3) -> bool {
        let min = self.aabb_min() - Vec3::splat(self.blend_radius);
        let max = self.aabb_max() + Vec3::splat(self.blend_radius);
        min.x <= box_max.x
            && max.x >= box_min.x
            && min.y <= box_max.y
            && max.y >= box_min.y
            && min.z <= box_max.z
            && max.z >= box_min.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(kind: GlobalKind) -> GlobalConstraint {
        let mut biases = HashMap::new();
        biases.insert(0, -0.8);
        biases.insert(1, 0.6);
        GlobalConstraint::new(
            "test",
            kind,
            Vec3::new(0.0, 8.0, 0.0),
            Vec3::new(16.0, 16.0, 16.0),
            4.0,
            1.0,
            biases,
        )
    }

    #[test]
    fn test_influence_inside_equals_strength() {
        let c = constraint(GlobalKind::BiomeRegion);
        assert_eq!(c.influence_at(Vec3::new(0.0, 8.0, 0.0)), 1.0);
        assert_eq!(c.influence_at(Vec3::new(7.9, 0.1, -7.9)), 1.0);
    }

    #[test]
    fn test_influence_decays_linearly_outside() {
        let c = constraint(GlobalKind::BiomeRegion);
        // 2 units past the +X face, half the 4-unit blend radius.
        let half = c.influence_at(Vec3::new(10.0, 8.0, 0.0));
        assert!((half - 0.5).abs() < 1e-5);
        assert_eq!(c.influence_at(Vec3::new(20.0, 8.0, 0.0)), 0.0);
    }

    #[test]
    fn test_blend_curve_shapes_falloff() {
        let mut c = constraint(GlobalKind::BiomeRegion);
        c.blend_curve = Some(Curve::SmoothStep);
        let mid = c.influence_at(Vec3::new(10.0, 8.0, 0.0));
        assert!((mid - 0.5).abs() < 1e-5);
        let near = c.influence_at(Vec3::new(9.0, 8.0, 0.0));
        assert!(near > 0.75);
    }

    #[test]
    fn test_height_factor_default_profile() {
        let c = constraint(GlobalKind::HeightMap);
        assert!((c.height_factor(Vec3::new(0.0, 0.0, 0.0)) - 1.0).abs() < 1e-6);
        assert!((c.height_factor(Vec3::new(0.0, 16.0, 0.0))).abs() < 1e-6);
        assert!((c.height_factor(Vec3::new(0.0, 8.0, 0.0)) - 0.5).abs() < 1e-6);
        // Non-height-map constraints ignore height.
        let biome = constraint(GlobalKind::BiomeRegion);
        assert_eq!(biome.height_factor(Vec3::new(0.0, 16.0, 0.0)), 1.0);
    }

    #[test]
    fn test_heightmap_damping() {
        assert_eq!(constraint(GlobalKind::HeightMap).kind_damping(), 0.5);
        assert_eq!(constraint(GlobalKind::BiomeRegion).kind_damping(), 1.0);
    }

    #[test]
    fn test_intersects_includes_blend() {
        let c = constraint(GlobalKind::BiomeRegion);
        // Box just beyond the AABB but within the blend radius.
        assert!(c.intersects_aabb(Vec3::new(9.0, 0.0, 0.0), Vec3::new(11.0, 1.0, 1.0)));
        assert!(!c.intersects_aabb(Vec3::new(13.0, 0.0, 0.0), Vec3::new(14.0, 1.0, 1.0)));
    }
}
