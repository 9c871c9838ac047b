//! Pipeline DTOs
//!
//! Registration requests from the runner, deployment history rows, per-project
//! statistics and the bootstrap payload an observer starts from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::pipeline::{Pipeline, PipelineStatus, TriggerKind};
use crate::domain::{PipelineId, ProjectId};
use crate::template::TemplateRegistry;
use crate::view::PipelineView;

/// Runner-side registration of a pipeline it is about to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPipeline {
    pub id: PipelineId,
    pub project_id: ProjectId,
    #[serde(default)]
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

/// One row of a project's deployment history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub id: PipelineId,
    pub status: PipelineStatus,
    pub commit_hash: Option<String>,
    pub author: Option<String>,
    pub trigger: Option<TriggerKind>,
    pub created_at: DateTime<Utc>,
    pub duration_secs: Option<i64>,
}

impl From<&Pipeline> for PipelineSummary {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            id: pipeline.id.clone(),
            status: pipeline.status,
            commit_hash: pipeline.commit_hash.clone(),
            author: pipeline.author.clone(),
            trigger: pipeline.trigger,
            created_at: pipeline.created_at,
            duration_secs: pipeline.duration_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub in_progress: usize,
    /// Percentage of finished pipelines that succeeded.
    pub success_rate: Option<f64>,
    pub average_duration_secs: Option<i64>,
}

impl ProjectStats {
    pub fn from_pipelines(pipelines: &[Pipeline]) -> Self {
        let succeeded = count(pipelines, PipelineStatus::Success);
        let failed = count(pipelines, PipelineStatus::Failed);
        let finished = succeeded + failed;

        let durations: Vec<i64> = pipelines
            .iter()
            .filter(|p| p.status.is_terminal())
            .filter_map(Pipeline::duration_secs)
            .collect();

        Self {
            total: pipelines.len(),
            succeeded,
            failed,
            in_progress: pipelines.len() - finished,
            success_rate: (finished > 0).then(|| succeeded as f64 * 100.0 / finished as f64),
            average_duration_secs: (!durations.is_empty())
                .then(|| durations.iter().sum::<i64>() / durations.len() as i64),
        }
    }
}

fn count(pipelines: &[Pipeline], status: PipelineStatus) -> usize {
    pipelines.iter().filter(|p| p.status == status).count()
}

/// A commit that deployed successfully and can be deployed again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackCandidate {
    pub commit_hash: String,
    pub latest: PipelineSummary,
    pub deployments: usize,
}

/// Successful commits, most recently deployed first.
///
/// `pipelines` must already be ordered most recent first.
pub fn rollback_candidates(pipelines: &[Pipeline]) -> Vec<RollbackCandidate> {
    let mut candidates: Vec<RollbackCandidate> = Vec::new();
    for pipeline in pipelines
        .iter()
        .filter(|p| p.status == PipelineStatus::Success)
    {
        let Some(commit) = pipeline.commit_hash.as_deref() else {
            continue;
        };
        match candidates.iter_mut().find(|c| c.commit_hash == commit) {
            Some(existing) => existing.deployments += 1,
            None => candidates.push(RollbackCandidate {
                commit_hash: commit.to_string(),
                latest: PipelineSummary::from(pipeline),
                deployments: 1,
            }),
        }
    }
    candidates
}

/// Everything an observer needs to render a project from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBootstrap {
    pub project_id: ProjectId,
    pub history: Vec<PipelineSummary>,
    /// Views of every pipeline still PENDING or RUNNING, most recent first.
    pub active: Vec<PipelineView>,
    pub stats: ProjectStats,
}

impl ProjectBootstrap {
    /// Build from a project's pipelines, ordered most recent first.
    pub fn build(
        project_id: ProjectId,
        pipelines: &[Pipeline],
        templates: &TemplateRegistry,
    ) -> Self {
        Self {
            project_id,
            history: pipelines.iter().map(PipelineSummary::from).collect(),
            active: pipelines
                .iter()
                .filter(|p| !p.status.is_terminal())
                .map(|p| PipelineView::bootstrap(p, templates.get(p.template_version)))
                .collect(),
            stats: ProjectStats::from_pipelines(pipelines),
        }
    }
}
