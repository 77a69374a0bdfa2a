//! Notifications emitted by the job lifecycle tracker.
//!
//! Delivered over a [`tokio::sync::broadcast`] channel; call
//! [`JobTracker::subscribe`](crate::tracker::JobTracker::subscribe) to
//! receive them.

use serde::Serialize;

use greetcard_core::job::{JobResult, JobStatus};
use greetcard_core::progress::DisplayStage;
use greetcard_core::types::JobId;

/// A tracker-level state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TrackerEvent {
    /// The job's status moved (e.g. `queued` -> `generating`).
    StatusChanged { job_id: JobId, status: JobStatus },

    /// New progress arrived, already translated for display.
    Progress {
        job_id: JobId,
        stages: Vec<DisplayStage>,
    },

    /// The job finished; emitted exactly once per job.
    Completed { job_id: JobId, result: JobResult },

    /// The backend reported the job failed; emitted exactly once per job.
    Failed { job_id: JobId, reason: String },

    /// The tracker was reset to idle.
    Reset,
}

impl TrackerEvent {
    /// Job this event refers to, if any.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::StatusChanged { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. } => Some(job_id),
            Self::Reset => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}
