//! Job and result types exchanged between the scheduler and the workers.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use strata_common::{ChunkCoord, ChunkId, Direction, JobId};
use strata_wfc::{OutboundBoundaryEvent, RunStatus};
use strata_world::BoundaryConflict;

/// What a job does to its target chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// First collapse pass of a freshly created chunk (syncs boundary
    /// mirrors from existing neighbours first).
    CreateChunk,
    /// Resume collapsing a partially collapsed chunk.
    Collapse,
    /// Apply inbound boundary events and re-propagate; no observation.
    PropagateBoundary,
    /// Mark the chunk unloading and remove it from the store.
    Unload,
}

/// A unit of work targeting exactly one chunk.
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique id, for tracing and result matching.
    pub id: JobId,
    /// What to do.
    pub kind: JobKind,
    /// Target chunk coordinate.
    pub coord: ChunkCoord,
    /// Target chunk id.
    pub chunk: ChunkId,
    /// Scheduler priority; larger runs first.
    pub priority: f32,
    /// Optional wall-clock budget; the solver returns `Budget` when it
    /// runs out, leaving the chunk in a consistent shrunk state.
    pub wall_budget: Option<Duration>,
    /// Raised by the scheduler to cancel the job at the next iteration
    /// boundary.
    pub cancel: Arc<AtomicBool>,
}

/// What a worker reports back for one finished job.
#[derive(Debug)]
pub struct JobOutput {
    /// Id of the finished job.
    pub job_id: JobId,
    /// Kind of the finished job.
    pub kind: JobKind,
    /// Target chunk coordinate.
    pub coord: ChunkCoord,
    /// Target chunk id.
    pub chunk: ChunkId,
    /// Terminal solver status (`Done` for non-solver jobs).
    pub status: RunStatus,
    /// Cells collapsed by this job.
    pub cells_collapsed: usize,
    /// Propagation events processed.
    pub propagations: usize,
    /// Contradictions encountered.
    pub contradictions: usize,
    /// Boundary changes for the scheduler to route to neighbours.
    pub outbound: Vec<OutboundBoundaryEvent>,
    /// Collapsed/collapsed incompatibilities found against the mirrors,
    /// per face.
    pub conflicts: Vec<(Direction, BoundaryConflict)>,
    /// Wall-clock time the job took.
    pub duration: Duration,
}

impl JobOutput {
    /// A result carrying only a status, for jobs with no solver work.
    #[must_use]
    pub fn status_only(job: &Job, status: RunStatus, duration: Duration) -> Self {
        Self {
            job_id: job.id,
            kind: job.kind,
            coord: job.coord,
            chunk: job.chunk,
            status,
            cells_collapsed: 0,
            propagations: 0,
            contradictions: 0,
            outbound: Vec::new(),
            conflicts: Vec::new(),
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_carries_identity() {
        let job = Job {
            id: JobId::next(),
            kind: JobKind::Unload,
            coord: ChunkCoord::new(1, 2, 3),
            chunk: ChunkId::next(),
            priority: 0.5,
            wall_budget: None,
            cancel: Arc::new(AtomicBool::new(false)),
        };
        let output = JobOutput::status_only(&job, RunStatus::Done, Duration::ZERO);
        assert_eq!(output.job_id, job.id);
        assert_eq!(output.kind, JobKind::Unload);
        assert_eq!(output.coord, job.coord);
        assert_eq!(output.cells_collapsed, 0);
    }
}
