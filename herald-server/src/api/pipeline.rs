//! Pipeline API Handlers
//!
//! Runner-side registration and observer read paths.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use herald_core::domain::pipeline::Pipeline;
use herald_core::domain::{PipelineId, ProjectId};
use herald_core::dto::pipeline::{PipelineSummary, RegisterPipeline};
use herald_core::view::PipelineView;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::pipeline_service;

/// POST /api/pipelines
/// Register a pipeline before (or while) the runner executes it
pub async fn register_pipeline(
    State(state): State<AppState>,
    Json(req): Json<RegisterPipeline>,
) -> ApiResult<(StatusCode, Json<Pipeline>)> {
    tracing::info!("Registering pipeline {} for project {}", req.id, req.project_id);

    let pipeline = pipeline_service::register_pipeline(
        state.pipelines.as_ref(),
        state.projects.as_ref(),
        state.default_template,
        req,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(pipeline)))
}

/// GET /api/pipelines/project/{project_id}
/// Most recent first
pub async fn list_by_project(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
) -> ApiResult<Json<Vec<PipelineSummary>>> {
    tracing::debug!("Listing pipelines for project: {}", project_id);

    let pipelines = pipeline_service::list_by_project(state.pipelines.as_ref(), &project_id).await?;
    Ok(Json(pipelines))
}

/// GET /api/pipelines/{id}
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<PipelineId>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Getting pipeline: {}", id);

    let pipeline = pipeline_service::get_pipeline(state.pipelines.as_ref(), &id).await?;
    Ok(Json(pipeline))
}

/// GET /api/pipelines/{id}/view
pub async fn get_view(
    State(state): State<AppState>,
    Path(id): Path<PipelineId>,
) -> ApiResult<Json<PipelineView>> {
    let view = pipeline_service::pipeline_view(state.pipelines.as_ref(), &state.templates, &id).await?;
    Ok(Json(view))
}
