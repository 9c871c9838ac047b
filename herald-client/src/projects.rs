//! Project-related API endpoints

use crate::HeraldClient;
use crate::error::Result;
use herald_core::domain::ProjectId;
use herald_core::domain::project::Project;
use herald_core::dto::pipeline::{ProjectBootstrap, RollbackCandidate};
use herald_core::dto::project::RegisterProject;

impl HeraldClient {
    /// Register a project, or update it if it exists
    pub async fn register_project(
        &self,
        project_id: &ProjectId,
        req: RegisterProject,
    ) -> Result<Project> {
        let url = self.endpoint(&["api", "projects", project_id.as_str()])?;
        tracing::debug!("PUT {}", url);
        let response = self.client.put(url).json(&req).send().await?;

        self.handle_response(response).await
    }

    pub async fn get_project(&self, project_id: &ProjectId) -> Result<Project> {
        let url = self.endpoint(&["api", "projects", project_id.as_str()])?;
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        self.handle_response(response).await
    }

    /// History, active pipeline views and stats in one call
    pub async fn bootstrap(&self, project_id: &ProjectId) -> Result<ProjectBootstrap> {
        let url = self.endpoint(&["api", "projects", project_id.as_str(), "bootstrap"])?;
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        self.handle_response(response).await
    }

    /// Commits that deployed successfully, newest first
    pub async fn rollback_candidates(&self, project_id: &ProjectId) -> Result<Vec<RollbackCandidate>> {
        let url = self.endpoint(&["api", "projects", project_id.as_str(), "rollback-candidates"])?;
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        self.handle_response(response).await
    }
}
