//! Trigger DTOs
//!
//! A trigger hands a project off to the external runner. The runner's answer
//! may or may not identify the pipeline it created.

use serde::{Deserialize, Serialize};

use crate::domain::pipeline::TriggerKind;
use crate::domain::{PipelineId, ProjectId};

/// Manual trigger request (also used for rollbacks, with an explicit commit)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub project_id: ProjectId,
    #[serde(default)]
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

/// Payload posted to the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRequest {
    pub project_id: ProjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub trigger: TriggerKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum TriggerOutcome {
    /// The pipeline is known and carries the trigger's provenance.
    Attributed { pipeline_id: PipelineId },
    /// The runner accepted the trigger but no pipeline could be attributed yet.
    AttributionPending { project_id: ProjectId },
}

impl TriggerOutcome {
    pub fn pipeline_id(&self) -> Option<&PipelineId> {
        match self {
            TriggerOutcome::Attributed { pipeline_id } => Some(pipeline_id),
            TriggerOutcome::AttributionPending { .. } => None,
        }
    }
}
