//! Engine configuration.

use serde::{Deserialize, Serialize};
use strata_common::{ConfigError, Direction};
use strata_wfc::AdjacencyTable;

/// Per-LOD tuning arrays. Each array carries one entry per LOD level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LodConfig {
    /// Iteration budget per collapse job at each LOD.
    pub max_iterations_per_lod: Vec<u32>,
    /// Constraint influence scale in `[0, 1]` at each LOD.
    pub constraint_influence_per_lod: Vec<f32>,
    /// Viewer-distance thresholds selecting the LOD: a chunk gets the
    /// first level whose threshold exceeds its distance.
    pub distance_thresholds: Vec<f32>,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            max_iterations_per_lod: vec![4096, 1024, 256],
            constraint_influence_per_lod: vec![1.0, 0.7, 0.4],
            distance_thresholds: vec![32.0, 64.0, f32::INFINITY],
        }
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Chunks whose centre is within this distance of the viewer load.
    pub load_distance: f32,
    /// Chunks farther than this from both the viewer and its predicted
    /// position unload. Must exceed `load_distance`.
    pub unload_distance: f32,
    /// Budget of jobs dispatched per tick.
    pub max_concurrent_chunks: usize,
    /// Worker thread count.
    pub workers: usize,
    /// Look-ahead horizon in seconds for the predicted viewer position.
    pub lookahead_secs: f32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            load_distance: 48.0,
            unload_distance: 72.0,
            max_concurrent_chunks: 8,
            workers: 4,
            lookahead_secs: 1.0,
        }
    }
}

/// Immutable engine configuration, threaded through every subsystem at
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of tile states.
    pub world_max_states: u16,
    /// Cubic chunk side; a power of two >= 4.
    pub chunk_size: u32,
    /// Number of LOD levels.
    pub num_lod_levels: u8,
    /// Flat adjacency matrix, indexed `[s1 * S * 6 + s2 * 6 + dir]`.
    pub adjacency: Vec<bool>,
    /// LOD tuning.
    pub lod: LodConfig,
    /// Scheduler tuning.
    pub scheduler: SchedulerConfig,
    /// Seed for all engine randomness.
    pub random_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let states = 2u16;
        let entries = states as usize * states as usize * Direction::COUNT;
        Self {
            world_max_states: states,
            chunk_size: 8,
            num_lod_levels: 3,
            adjacency: vec![true; entries],
            lod: LodConfig::default(),
            scheduler: SchedulerConfig::default(),
            random_seed: 0,
        }
    }
}

impl EngineConfig {
    /// Validates the configuration and builds the adjacency table.
    ///
    /// # Errors
    ///
    /// Any violation is fatal: asymmetric or mis-sized adjacency, a chunk
    /// size that is not a power of two >= 4, LOD arrays of the wrong
    /// length, inverted radii, a zero worker count, or out-of-range
    /// influence values.
    pub fn validate(&self) -> Result<AdjacencyTable, ConfigError> {
        if self.world_max_states == 0 {
            return Err(ConfigError::InvalidStateCount(0));
        }
        if self.chunk_size < 4 || !self.chunk_size.is_power_of_two() {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        let levels = self.num_lod_levels as usize;
        let check_len = |name: &'static str, actual: usize| {
            if actual == levels {
                Ok(())
            } else {
                Err(ConfigError::LodArrayLength {
                    name,
                    expected: levels,
                    actual,
                })
            }
        };
        check_len(
            "max_iterations_per_lod",
            self.lod.max_iterations_per_lod.len(),
        )?;
        check_len(
            "constraint_influence_per_lod",
            self.lod.constraint_influence_per_lod.len(),
        )?;
        check_len("distance_thresholds", self.lod.distance_thresholds.len())?;

        for &influence in &self.lod.constraint_influence_per_lod {
            if !(0.0..=1.0).contains(&influence) {
                return Err(ConfigError::OutOfRange {
                    name: "constraint_influence_per_lod",
                    value: influence,
                });
            }
        }
        if self.scheduler.load_distance <= 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "load_distance",
                value: self.scheduler.load_distance,
            });
        }
        if self.scheduler.unload_distance <= self.scheduler.load_distance {
            return Err(ConfigError::RadiusOrdering {
                load: self.scheduler.load_distance,
                unload: self.scheduler.unload_distance,
            });
        }
        if self.scheduler.workers == 0 {
            return Err(ConfigError::InvalidWorkerCount(0));
        }

        AdjacencyTable::from_flat(self.world_max_states, &self.adjacency)
    }

    /// Selects the LOD level for a chunk at `distance` from the viewer.
    #[must_use]
    pub fn lod_for_distance(&self, distance: f32) -> u8 {
        for (level, &threshold) in self.lod.distance_thresholds.iter().enumerate() {
            if distance <= threshold {
                return level as u8;
            }
        }
        self.num_lod_levels.saturating_sub(1)
    }

    /// Iteration budget for a LOD level.
    #[must_use]
    pub fn max_iterations_for_lod(&self, lod: u8) -> u32 {
        self.lod
            .max_iterations_per_lod
            .get(lod as usize)
            .copied()
            .unwrap_or(1)
    }

    /// Constraint influence for a LOD level.
    #[must_use]
    pub fn constraint_influence_for_lod(&self, lod: u8) -> f32 {
        self.lod
            .constraint_influence_per_lod
            .get(lod as usize)
            .copied()
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bad_chunk_size_rejected() {
        let mut config = EngineConfig::default();
        config.chunk_size = 6;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidChunkSize(6))
        ));
        config.chunk_size = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lod_array_length_checked() {
        let mut config = EngineConfig::default();
        config.lod.max_iterations_per_lod.pop();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LodArrayLength { .. })
        ));
    }

    #[test]
    fn test_radius_ordering_checked() {
        let mut config = EngineConfig::default();
        config.scheduler.unload_distance = config.scheduler.load_distance;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RadiusOrdering { .. })
        ));
    }

    #[test]
    fn test_asymmetric_adjacency_rejected() {
        let mut config = EngineConfig::default();
        // allowed(0, 0, +X) false while allowed(0, 0, -X) stays true.
        config.adjacency[Direction::PosX.as_index()] = false;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AsymmetricAdjacency { .. })
        ));
    }

    #[test]
    fn test_lod_for_distance() {
        let config = EngineConfig::default();
        assert_eq!(config.lod_for_distance(10.0), 0);
        assert_eq!(config.lod_for_distance(40.0), 1);
        assert_eq!(config.lod_for_distance(1000.0), 2);
    }
}
