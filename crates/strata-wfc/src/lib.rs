//! # Strata WFC
//!
//! The Wave Function Collapse core of the Strata terrain engine.
//!
//! This crate provides the per-chunk algorithm and its data structures:
//! - `State` and `StateSet` (possible-state bitsets)
//! - `AdjacencyTable` (symmetry-validated allowed-neighbour matrix)
//! - `Cell` and `CellGrid` (entropy-tracked cell field)
//! - `PropagationQueue` (prioritised constraint updates)
//! - `WfcEngine` (observe / collapse / propagate)
//!
//! The crate is deliberately ignorant of chunk scheduling and constraint
//! models; those plug in through the [`BiasProvider`] and [`MirrorView`]
//! traits.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod adjacency;
pub mod cell;
pub mod engine;
pub mod grid;
pub mod queue;
pub mod state;

pub use adjacency::{AdjacencyBuilder, AdjacencyTable};
pub use cell::Cell;
pub use engine::{
    BiasProvider, MirrorView, NoMirrors, OutboundBoundaryEvent, RunReport, RunStatus, SeedError,
    StepResult, UniformBias, WfcEngine,
};
pub use grid::{CellGrid, ShrinkOutcome};
pub use queue::{PropagationEvent, PropagationQueue};
pub use state::{State, StateSet};
