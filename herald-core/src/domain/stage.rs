//! Derived stage state
//!
//! Stage state is never stored. It is computed from a pipeline's `current_stage`
//! and `status`, either at bootstrap or incrementally on the live path.

use serde::{Deserialize, Serialize};

use crate::template::StageOrdinal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl StageStatus {
    /// Success and failed have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, StageStatus::Success | StageStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Success => "success",
            StageStatus::Failed => "failed",
        }
    }
}

/// One entry of a pipeline's stage timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageView {
    pub ordinal: StageOrdinal,
    pub name: String,
    pub status: StageStatus,
}
