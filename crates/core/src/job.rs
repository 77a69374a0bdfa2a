//! Job status, handle, and snapshot types.

use serde::{Deserialize, Serialize};

use crate::progress::TaskProgress;
use crate::types::JobId;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Backend-reported status of a generation job.
///
/// Transitions are monotonic: `Queued -> Generating -> {Completed, Failed}`.
/// The two terminal states never change once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Generating,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Position in the lifecycle; a status may only move to an equal or
    /// higher rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Generating => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` respects monotonicity.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobHandle
// ---------------------------------------------------------------------------

/// Identity of a submitted job plus the status it was submitted with.
///
/// The id is assigned once by submission and has no setter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    id: JobId,
    status: JobStatus,
}

impl JobHandle {
    pub fn new(id: impl Into<JobId>, status: JobStatus) -> Self {
        Self {
            id: id.into(),
            status,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }
}

// ---------------------------------------------------------------------------
// JobResult / JobSnapshot
// ---------------------------------------------------------------------------

/// Output of a completed job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub preview_text: Option<String>,
    pub word_count: Option<u32>,
    /// Filled in after banner generation, never by the status endpoint.
    pub banner_url: Option<String>,
}

/// Latest known state of a job.
///
/// `result` is only ever present while `status` is
/// [`JobStatus::Completed`]; the constructors and [`JobSnapshot::set_status`]
/// keep that invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    status: JobStatus,
    progress: Option<TaskProgress>,
    result: Option<JobResult>,
}

impl JobSnapshot {
    /// Snapshot for a non-completed status with no progress yet.
    pub fn pending(status: JobStatus) -> Self {
        debug_assert!(status != JobStatus::Completed);
        Self {
            status,
            progress: None,
            result: None,
        }
    }

    /// Snapshot for a completed job. Progress is always cleared.
    pub fn completed(result: JobResult) -> Self {
        Self {
            status: JobStatus::Completed,
            progress: None,
            result: Some(result),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> Option<&TaskProgress> {
        self.progress.as_ref()
    }

    pub fn result(&self) -> Option<&JobResult> {
        self.result.as_ref()
    }

    pub fn result_mut(&mut self) -> Option<&mut JobResult> {
        self.result.as_mut()
    }

    /// Move to a non-completed status. Leaving `Completed` is impossible
    /// through monotonic transitions, so any stored result is dropped.
    pub fn set_status(&mut self, status: JobStatus) {
        debug_assert!(status != JobStatus::Completed);
        self.status = status;
        self.result = None;
        if status.is_terminal() {
            self.progress = None;
        }
    }

    /// Replace the stored progress. `None` is ignored so an update without a
    /// progress payload keeps the previous snapshot.
    pub fn update_progress(&mut self, progress: Option<TaskProgress>) {
        if let Some(progress) = progress {
            self.progress = Some(progress);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
