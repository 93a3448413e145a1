//! # Strata Common
//!
//! Common types, utilities, and shared abstractions for the Strata engine.
//!
//! This crate provides foundational types used across all Strata subsystems:
//! - Coordinate types (world, chunk, local)
//! - Axis-aligned directions with a fixed total order
//! - Chunk ID handles
//! - Version information for the dump format
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod direction;
pub mod error;
pub mod ids;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::direction::*;
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::version::*;
}

pub use prelude::*;
