//! Project API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use herald_core::domain::ProjectId;
use herald_core::domain::project::Project;
use herald_core::dto::pipeline::{ProjectBootstrap, RollbackCandidate};
use herald_core::dto::project::RegisterProject;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::{pipeline_service, project_service};

/// PUT /api/projects/{id}
pub async fn register_project(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
    Json(req): Json<RegisterProject>,
) -> ApiResult<Json<Project>> {
    tracing::info!("Registering project: {}", id);

    let project = project_service::register_project(
        state.projects.as_ref(),
        &state.templates,
        state.default_template,
        id,
        req,
    )
    .await?;

    Ok(Json(project))
}

/// GET /api/projects/{id}
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
) -> ApiResult<Json<Project>> {
    tracing::debug!("Getting project: {}", id);

    let project = project_service::get_project(state.projects.as_ref(), &id).await?;
    Ok(Json(project))
}

/// GET /api/projects/{id}/bootstrap
/// Deployment history, views of active pipelines and stats
pub async fn bootstrap(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
) -> ApiResult<Json<ProjectBootstrap>> {
    tracing::debug!("Bootstrapping project: {}", id);

    let bootstrap =
        pipeline_service::bootstrap(state.pipelines.as_ref(), &state.templates, &id).await?;
    Ok(Json(bootstrap))
}

/// GET /api/projects/{id}/rollback-candidates
pub async fn rollback_candidates(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
) -> ApiResult<Json<Vec<RollbackCandidate>>> {
    let candidates = pipeline_service::rollback_targets(state.pipelines.as_ref(), &id).await?;
    Ok(Json(candidates))
}
