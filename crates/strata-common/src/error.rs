//! Error types for the Strata engine.

use thiserror::Error;

use crate::coords::ChunkCoord;

/// Top-level error type for Strata operations.
#[derive(Debug, Error)]
pub enum StrataError {
    /// Configuration errors (fatal at construction)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// World/chunk errors
    #[error("World error: {0}")]
    World(#[from] WorldError),

    /// Dump format errors
    #[error("Dump format error: {0}")]
    Format(#[from] FormatError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration validation errors. All are fatal at engine construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Adjacency table violates `allowed(a,b,d) == allowed(b,a,opposite(d))`
    #[error("Adjacency table is asymmetric for states ({a}, {b}) in direction {dir}")]
    AsymmetricAdjacency {
        /// First state
        a: u16,
        /// Second state
        b: u16,
        /// Direction index where symmetry breaks
        dir: usize,
    },

    /// Adjacency table dimensions do not match the state count
    #[error("Adjacency table has wrong size: expected {expected} entries, got {actual}")]
    AdjacencySize {
        /// Expected entry count
        expected: usize,
        /// Actual entry count
        actual: usize,
    },

    /// Chunk size must be a power of two >= 4
    #[error("Invalid chunk size {0}: must be a power of two >= 4")]
    InvalidChunkSize(u32),

    /// State count must be positive
    #[error("Invalid state count {0}: must be >= 1")]
    InvalidStateCount(u32),

    /// Per-LOD arrays must have one entry per LOD level
    #[error("LOD array `{name}` has {actual} entries, expected {expected}")]
    LodArrayLength {
        /// Name of the offending array
        name: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Unload radius must exceed load radius
    #[error("Unload distance {unload} must be greater than load distance {load}")]
    RadiusOrdering {
        /// Load radius
        load: f32,
        /// Unload radius
        unload: f32,
    },

    /// Worker count must be positive
    #[error("Invalid worker count {0}: must be >= 1")]
    InvalidWorkerCount(usize),

    /// A numeric parameter was out of range
    #[error("Parameter `{name}` out of range: {value}")]
    OutOfRange {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: f32,
    },
}

/// World and chunk errors.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Chunk not found
    #[error("Chunk not found at ({}, {}, {})", coord.x, coord.y, coord.z)]
    ChunkNotFound {
        /// Chunk coordinate
        coord: ChunkCoord,
    },

    /// A cell's possible set became empty during propagation
    #[error("Contradiction at cell {cell_index} in chunk ({}, {}, {})", coord.x, coord.y, coord.z)]
    Contradiction {
        /// Chunk coordinate
        coord: ChunkCoord,
        /// Linear cell index inside the chunk
        cell_index: usize,
    },

    /// A state index exceeded the configured state count
    #[error("State {state} out of range (state count {count})")]
    StateOutOfRange {
        /// Offending state
        state: u16,
        /// Configured state count
        count: u16,
    },

    /// A seed observation targeted a missing cell or an impossible state
    #[error("Seed rejected: state {state} at cell {cell_index}")]
    InvalidSeed {
        /// Linear cell index inside the chunk
        cell_index: usize,
        /// Requested state
        state: u16,
    },
}

/// Dump (de)serialization errors.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Magic bytes did not match
    #[error("Invalid dump format (bad magic)")]
    BadMagic,

    /// Version gate failed
    #[error("Unsupported dump version {actual} (supported up to {supported})")]
    UnsupportedVersion {
        /// Version found in the header
        actual: u16,
        /// Highest supported version
        supported: u16,
    },

    /// Input ended before a complete record
    #[error("Truncated dump data: {0}")]
    Truncated(&'static str),

    /// A field held an invalid value
    #[error("Invalid dump field: {0}")]
    InvalidField(String),

    /// A constraint text block failed to parse
    #[error("Constraint parse error at line {line}: {message}")]
    ConstraintParse {
        /// 1-based line number
        line: usize,
        /// Description of the failure
        message: String,
    },
}

/// Result type alias for Strata operations.
pub type StrataResult<T> = Result<T, StrataError>;
