//! Hierarchical task progress and its display translation.
//!
//! The backend decomposes a card into ordered stages, each of which may
//! carry its own sub-stages.  [`translate`] flattens that tree
//! depth-first into the sequence a progress list renders.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Raw progress (wire shape)
// ---------------------------------------------------------------------------

/// Raw progress payload as reported by the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    #[serde(default)]
    pub stages: Vec<TaskStage>,
}

/// One node of the progress tree.
///
/// `status` is kept as the raw string the backend sent; interpretation
/// happens in [`StageStatus::from_raw`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStage {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, alias = "subtasks", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaskStage>,
}

impl TaskProgress {
    /// Total number of stages across all levels of the tree.
    pub fn stage_count(&self) -> usize {
        fn count(stages: &[TaskStage]) -> usize {
            stages.iter().map(|s| 1 + count(&s.children)).sum()
        }
        count(&self.stages)
    }
}

// ---------------------------------------------------------------------------
// Display types
// ---------------------------------------------------------------------------

/// Display state of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Active,
    Done,
    Failed,
}

impl StageStatus {
    /// Interpret a raw status value. Missing or unrecognized values map
    /// to [`StageStatus::Pending`].
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("active") => Self::Active,
            Some("done") => Self::Done,
            Some("failed") => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// A flattened, display-ready stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayStage {
    pub name: String,
    pub status: StageStatus,
    /// Nesting level in the original tree; top-level stages are `0`.
    pub depth: usize,
}

// ---------------------------------------------------------------------------
// Translation
// ---------------------------------------------------------------------------

/// Flatten `raw` into display order.
///
/// Pre-order traversal: each stage is followed by its children.  Stage
/// order is exactly the backend's; nothing is sorted or de-duplicated.
pub fn translate(raw: &TaskProgress) -> Vec<DisplayStage> {
    let mut out = Vec::with_capacity(raw.stage_count());
    flatten_into(&raw.stages, 0, &mut out);
    out
}

fn flatten_into(stages: &[TaskStage], depth: usize, out: &mut Vec<DisplayStage>) {
    for stage in stages {
        out.push(DisplayStage {
            name: stage.name.clone(),
            status: StageStatus::from_raw(stage.status.as_deref()),
            depth,
        });
        flatten_into(&stage.children, depth + 1, out);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
