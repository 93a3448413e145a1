//! # Strata Engine
//!
//! The engine facade of the Strata terrain engine: viewer-driven chunk
//! scheduling, the parallel worker pool, cross-boundary event routing, and
//! the public API hosts consume.
//!
//! Construction wires the subsystems together from an immutable
//! [`EngineConfig`]; afterwards the host drives everything through
//! [`Engine::update_viewer`] and [`Engine::tick`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod engine;
pub mod events;
pub mod job;
pub mod scheduler;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
mod e2e_tests;

pub use config::{EngineConfig, LodConfig, SchedulerConfig};
pub use engine::{Engine, EngineStats};
pub use events::{EngineEvent, EventBus};
pub use job::{Job, JobKind, JobOutput};
pub use scheduler::ChunkScheduler;
pub use telemetry::{counters, CountingTelemetry, NullTelemetry, Telemetry};
pub use worker::{WorkerContext, WorkerPool};
