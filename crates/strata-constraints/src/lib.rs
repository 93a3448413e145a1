//! # Strata Constraints
//!
//! Hierarchical constraint model for the Strata terrain engine.
//!
//! Constraints bias state selection without hard-collapsing cells. Three
//! tiers contribute, each with its own spatial footprint:
//! - **Global** constraints cover a world-space AABB with a blend falloff
//!   (biome regions, height maps).
//! - **Region** constraints cover a chunk range with a normalised internal
//!   AABB (transitions, features, elevation bands).
//! - **Local** constraints pin biases to individual cells.
//!
//! [`ConstraintModel`] combines the tiers into a per-state bias map for any
//! world position and memoises whole-chunk bias maps for the solver.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod curve;
pub mod global;
pub mod local;
pub mod model;
pub mod region;
pub mod text;

pub use curve::Curve;
pub use global::{GlobalConstraint, GlobalKind};
pub use local::LocalConstraints;
pub use model::{ChunkBiasMap, ConstraintModel, TypeWeights};
pub use region::{RegionConstraint, RegionKind};
pub use text::ConstraintSet;
