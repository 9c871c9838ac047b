//! Project Service

use chrono::Utc;
use herald_core::domain::ProjectId;
use herald_core::domain::project::Project;
use herald_core::dto::project::RegisterProject;
use herald_core::template::{TemplateRegistry, TemplateVersion};

use crate::repository::{ProjectStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("project {0} not found")]
    NotFound(ProjectId),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ProjectError>;

/// Register a project, or update it in place.
///
/// Changing the template only affects pipelines created afterwards.
pub async fn register_project(
    projects: &dyn ProjectStore,
    templates: &TemplateRegistry,
    default_template: TemplateVersion,
    id: ProjectId,
    req: RegisterProject,
) -> Result<Project> {
    validate_project_request(&req)?;

    let template_version = req.template_version.unwrap_or(default_template);
    if !templates.contains(template_version) {
        return Err(ProjectError::Validation(format!(
            "Unknown stage template {}",
            template_version.0
        )));
    }

    let now = Utc::now();
    let project = projects
        .upsert_project(&Project {
            id,
            name: req.name.trim().to_string(),
            repo_url: req.repo_url.trim().to_string(),
            branch: req.branch.trim().to_string(),
            auto_deploy: req.auto_deploy,
            template_version,
            created_at: now,
            updated_at: now,
        })
        .await?;

    tracing::info!("Project registered: {} ({})", project.name, project.id);

    Ok(project)
}

pub async fn get_project(projects: &dyn ProjectStore, id: &ProjectId) -> Result<Project> {
    projects
        .find_project(id)
        .await?
        .ok_or_else(|| ProjectError::NotFound(id.clone()))
}

// =============================================================================
// Validation
// =============================================================================

fn validate_project_request(req: &RegisterProject) -> Result<()> {
    if req.name.trim().is_empty() {
        return Err(ProjectError::Validation(
            "Project name cannot be empty".to_string(),
        ));
    }

    if req.name.len() > 255 {
        return Err(ProjectError::Validation(
            "Project name is too long (max 255 characters)".to_string(),
        ));
    }

    if req.repo_url.trim().is_empty() {
        return Err(ProjectError::Validation(
            "Repository URL cannot be empty".to_string(),
        ));
    }

    if req.branch.trim().is_empty() {
        return Err(ProjectError::Validation("Branch cannot be empty".to_string()));
    }

    Ok(())
}
