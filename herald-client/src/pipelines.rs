//! Pipeline-related API endpoints

use crate::HeraldClient;
use crate::error::Result;
use herald_core::domain::pipeline::Pipeline;
use herald_core::domain::{PipelineId, ProjectId};
use herald_core::dto::pipeline::PipelineSummary;
use herald_core::dto::trigger::{TriggerOutcome, TriggerRequest};
use herald_core::view::PipelineView;

impl HeraldClient {
    // =============================================================================
    // Pipeline History
    // =============================================================================

    /// A project's pipelines, most recent first
    pub async fn list_pipelines(&self, project_id: &ProjectId) -> Result<Vec<PipelineSummary>> {
        let url = self.endpoint(&["api", "pipelines", "project", project_id.as_str()])?;
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        self.handle_response(response).await
    }

    /// Get a pipeline by ID, with its logs
    pub async fn get_pipeline(&self, pipeline_id: &PipelineId) -> Result<Pipeline> {
        let url = self.endpoint(&["api", "pipelines", pipeline_id.as_str()])?;
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        self.handle_response(response).await
    }

    /// Stage timeline of a pipeline, as observers see it
    pub async fn pipeline_view(&self, pipeline_id: &PipelineId) -> Result<PipelineView> {
        let url = self.endpoint(&["api", "pipelines", pipeline_id.as_str(), "view"])?;
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Triggers
    // =============================================================================

    /// Hand a project off to the runner.
    ///
    /// With a `commit_hash` this redeploys that commit, which is how rollbacks
    /// are done.
    pub async fn trigger(&self, req: TriggerRequest) -> Result<TriggerOutcome> {
        let url = self.endpoint(&["webhooks", "trigger"])?;
        tracing::debug!("POST {} for project {}", url, req.project_id);
        let response = self.client.post(url).json(&req).send().await?;

        self.handle_response(response).await
    }
}
