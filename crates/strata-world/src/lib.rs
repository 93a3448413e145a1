//! # Strata World
//!
//! World management for the Strata terrain engine.
//!
//! This crate owns everything chunk-shaped:
//! - `Chunk` (lifecycle, LOD, the cell grid, neighbour links)
//! - `BoundaryBuffer` (mirrors of neighbouring faces, conflict handling)
//! - `ChunkStore` (the arena of loaded chunks, keyed by id and coordinate)
//! - `ChunkView` (read-only snapshots for meshers and visualisers)
//! - the WFCX dump format

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod boundary;
pub mod chunk;
pub mod io;
pub mod store;
pub mod view;

pub use boundary::{resolve_conflict, BoundaryBuffer, BoundaryConflict, ConflictOutcome, FaceStamp};
pub use chunk::{Chunk, ChunkLifecycle, ChunkMirrors};
pub use io::{load_dump, save_dump, ChunkRecord, DumpContents};
pub use store::ChunkStore;
pub use view::{CellView, ChunkView};
