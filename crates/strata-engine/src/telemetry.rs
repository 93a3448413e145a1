//! Pluggable telemetry hooks.
//!
//! Counters and timers with no behavioural effect; the engine calls them
//! on the hot paths and hosts decide where the numbers go.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

/// Well-known counter names.
pub mod counters {
    /// Chunks created.
    pub const CHUNKS_LOADED: &str = "chunks_loaded";
    /// Chunks removed.
    pub const CHUNKS_UNLOADED: &str = "chunks_unloaded";
    /// Cells collapsed across all jobs.
    pub const CELLS_COLLAPSED: &str = "cells_collapsed";
    /// Propagation events processed.
    pub const PROPAGATION_EVENTS: &str = "propagation_events";
    /// Contradictions surfaced.
    pub const CONTRADICTIONS: &str = "contradictions";
    /// Boundary conflicts detected.
    pub const BOUNDARY_CONFLICTS: &str = "boundary_conflicts";
    /// Jobs cancelled before completion.
    pub const JOBS_CANCELLED: &str = "jobs_cancelled";
}

/// Telemetry sink. Implementations must be cheap; the engine calls these
/// from workers and the control thread.
pub trait Telemetry: Send + Sync {
    /// Adds `value` to a named counter.
    fn incr_counter(&self, _name: &'static str, _value: u64) {}

    /// Records a named duration (job timings).
    fn record_duration(&self, _name: &'static str, _duration: Duration) {}
}

/// Telemetry sink that discards everything. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {}

/// Telemetry sink that accumulates counters in memory. Used by tests and
/// simple hosts.
#[derive(Debug, Default)]
pub struct CountingTelemetry {
    counters: Mutex<HashMap<&'static str, u64>>,
    durations: Mutex<HashMap<&'static str, (u64, Duration)>>,
}

impl CountingTelemetry {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    /// Number of samples and total time recorded for a duration.
    #[must_use]
    pub fn duration(&self, name: &str) -> (u64, Duration) {
        self.durations
            .lock()
            .get(name)
            .copied()
            .unwrap_or((0, Duration::ZERO))
    }
}

impl Telemetry for CountingTelemetry {
    fn incr_counter(&self, name: &'static str, value: u64) {
        *self.counters.lock().entry(name).or_insert(0) += value;
    }

    fn record_duration(&self, name: &'static str, duration: Duration) {
        let mut durations = self.durations.lock();
        let entry = durations.entry(name).or_insert((0, Duration::ZERO));
        entry.0 += 1;
        entry.1 += duration;
    }
}
