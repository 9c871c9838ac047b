//! Pipeline Service
//!
//! Runner-side registration and the read paths observers bootstrap from.

use chrono::Utc;
use herald_core::domain::pipeline::{Pipeline, Provenance};
use herald_core::domain::{PipelineId, ProjectId};
use herald_core::dto::pipeline::{
    PipelineSummary, ProjectBootstrap, RegisterPipeline, RollbackCandidate, rollback_candidates,
};
use herald_core::template::{TemplateRegistry, TemplateVersion};
use herald_core::view::PipelineView;

use crate::repository::{PipelineStore, ProjectStore, StoreError};

const TRACING_TARGET: &str = "herald_server::service::pipeline";

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline {0} not found")]
    NotFound(PipelineId),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Register a pipeline the runner is about to execute.
///
/// Idempotent: a second registration only fills provenance that is still empty.
/// The template comes from the project when it is known here.
pub async fn register_pipeline(
    pipelines: &dyn PipelineStore,
    projects: &dyn ProjectStore,
    default_template: TemplateVersion,
    req: RegisterPipeline,
) -> Result<Pipeline> {
    validate_pipeline_id(&req.id)?;

    let template_version = match projects.find_project(&req.project_id).await? {
        Some(project) => project.template_version,
        None => {
            tracing::warn!(
                target: TRACING_TARGET,
                project_id = %req.project_id,
                "registering pipeline for unknown project, using default template"
            );
            default_template
        }
    };

    let now = Utc::now();
    let pipeline = Pipeline::new(req.id.clone(), req.project_id.clone(), template_version, now);
    if pipelines.insert(&pipeline).await? {
        tracing::info!(
            target: TRACING_TARGET,
            pipeline_id = %req.id,
            project_id = %req.project_id,
            "pipeline registered"
        );
    }

    let provenance = Provenance {
        commit_hash: req.commit_hash,
        author: req.author,
        trigger: None,
    };
    pipelines.record_provenance(&req.id, &provenance, now).await?;

    get_pipeline(pipelines, &req.id).await
}

/// Get a pipeline by ID, with logs
pub async fn get_pipeline(pipelines: &dyn PipelineStore, id: &PipelineId) -> Result<Pipeline> {
    pipelines
        .find(id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(id.clone()))
}

/// A project's pipelines, most recent first
pub async fn list_by_project(
    pipelines: &dyn PipelineStore,
    project_id: &ProjectId,
) -> Result<Vec<PipelineSummary>> {
    let listed = pipelines.list_by_project(project_id).await?;
    Ok(listed.iter().map(PipelineSummary::from).collect())
}

/// Reconciled view of one pipeline, as an observer would render it
pub async fn pipeline_view(
    pipelines: &dyn PipelineStore,
    templates: &TemplateRegistry,
    id: &PipelineId,
) -> Result<PipelineView> {
    let pipeline = get_pipeline(pipelines, id).await?;
    let template = templates.get(pipeline.template_version);
    if template.is_none() {
        tracing::warn!(
            target: TRACING_TARGET,
            pipeline_id = %id,
            template_version = pipeline.template_version.0,
            "unknown stage template, rendering without stages"
        );
    }
    Ok(PipelineView::bootstrap(&pipeline, template))
}

/// History, active views and stats for a project
pub async fn bootstrap(
    pipelines: &dyn PipelineStore,
    templates: &TemplateRegistry,
    project_id: &ProjectId,
) -> Result<ProjectBootstrap> {
    let mut listed = pipelines.list_by_project(project_id).await?;

    // Only active pipelines are rendered with their log panel.
    let active: Vec<PipelineId> = listed
        .iter()
        .filter(|p| !p.status.is_terminal())
        .map(|p| p.id.clone())
        .collect();
    let mut logs = pipelines.find_logs(&active).await?;
    for pipeline in &mut listed {
        pipeline.logs = logs.remove(&pipeline.id).unwrap_or_default();
    }

    Ok(ProjectBootstrap::build(project_id.clone(), &listed, templates))
}

/// Successful commits that can be redeployed, newest first
pub async fn rollback_targets(
    pipelines: &dyn PipelineStore,
    project_id: &ProjectId,
) -> Result<Vec<RollbackCandidate>> {
    let listed = pipelines.list_by_project(project_id).await?;
    Ok(rollback_candidates(&listed))
}

// =============================================================================
// Validation
// =============================================================================

fn validate_pipeline_id(id: &PipelineId) -> Result<()> {
    let raw = id.as_str();
    if raw.trim().is_empty() {
        return Err(PipelineError::Validation(
            "Pipeline id cannot be empty".to_string(),
        ));
    }

    if raw.len() > 255 {
        return Err(PipelineError::Validation(
            "Pipeline id is too long (max 255 characters)".to_string(),
        ));
    }

    if raw.contains('|') {
        return Err(PipelineError::Validation(
            "Pipeline id cannot contain '|'".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryStore;
    use herald_core::domain::log::{LogEvent, LogLevel};
    use herald_core::domain::pipeline::PipelineStatus;
    use herald_core::domain::project::Project;
    use herald_core::template::{EIGHT_STAGE, FIVE_STAGE};

    fn register(id: &str, commit: Option<&str>) -> RegisterPipeline {
        RegisterPipeline {
            id: PipelineId::new(id),
            project_id: ProjectId::new("shop"),
            commit_hash: commit.map(str::to_string),
            author: None,
        }
    }

    #[test]
    fn test_validate_pipeline_id() {
        assert!(validate_pipeline_id(&PipelineId::new("run-1")).is_ok());
        assert!(validate_pipeline_id(&PipelineId::new("  ")).is_err());
        assert!(validate_pipeline_id(&PipelineId::new("a|b")).is_err());
        assert!(validate_pipeline_id(&PipelineId::new("x".repeat(256))).is_err());
    }

    #[tokio::test]
    async fn test_registration_uses_project_template_and_is_idempotent() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .upsert_project(&Project {
                id: ProjectId::new("shop"),
                name: "shop".to_string(),
                repo_url: "https://github.com/acme/shop.git".to_string(),
                branch: "main".to_string(),
                auto_deploy: true,
                template_version: EIGHT_STAGE,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let first = register_pipeline(&store, &store, FIVE_STAGE, register("run-1", Some("abc")))
            .await
            .unwrap();
        assert_eq!(first.template_version, EIGHT_STAGE);
        assert_eq!(first.status, PipelineStatus::Pending);

        let again = register_pipeline(&store, &store, FIVE_STAGE, register("run-1", Some("zzz")))
            .await
            .unwrap();
        assert_eq!(again.commit_hash.as_deref(), Some("abc"));
        assert_eq!(again.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_unknown_project_falls_back_to_default_template() {
        let store = InMemoryStore::new();
        let registered = register_pipeline(&store, &store, FIVE_STAGE, register("run-1", None))
            .await
            .unwrap();
        assert_eq!(registered.template_version, FIVE_STAGE);
    }

    #[tokio::test]
    async fn test_view_of_unknown_template_keeps_logs_and_status() {
        let store = InMemoryStore::new();
        let mut pipeline = Pipeline::new(
            PipelineId::new("legacy"),
            ProjectId::new("shop"),
            TemplateVersion(99),
            Utc::now(),
        );
        pipeline.status = PipelineStatus::Running;
        pipeline.current_stage = Some(2);
        store.insert(&pipeline).await.unwrap();

        let view = pipeline_view(
            &store,
            &TemplateRegistry::builtin().unwrap(),
            &PipelineId::new("legacy"),
        )
        .await
        .unwrap();
        assert!(view.stages.is_empty());
        assert_eq!(view.status, PipelineStatus::Running);
    }

    #[tokio::test]
    async fn test_bootstrap_loads_logs_of_active_pipelines_only() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let line = |id: &str| LogEvent {
            id: id.to_string(),
            timestamp: None,
            level: LogLevel::Info,
            message: format!("line {}", id),
            stage: None,
        };

        let mut done = Pipeline::new(PipelineId::new("done"), ProjectId::new("shop"), FIVE_STAGE, now);
        done.status = PipelineStatus::Success;
        store.insert(&done).await.unwrap();
        store.append_log(&done.id, &line("d1"), now).await.unwrap();

        let live = Pipeline::new(
            PipelineId::new("live"),
            ProjectId::new("shop"),
            FIVE_STAGE,
            now + chrono::Duration::seconds(1),
        );
        store.insert(&live).await.unwrap();
        store.append_log(&live.id, &line("l1"), now).await.unwrap();
        store.append_log(&live.id, &line("l2"), now).await.unwrap();

        let listed = store.list_by_project(&ProjectId::new("shop")).await.unwrap();
        assert!(listed.iter().all(|p| p.logs.is_empty()));

        let snapshot = bootstrap(&store, &TemplateRegistry::builtin().unwrap(), &ProjectId::new("shop"))
            .await
            .unwrap();
        assert_eq!(snapshot.history.len(), 2);
        assert_eq!(snapshot.active.len(), 1);
        let ids: Vec<_> = snapshot.active[0].logs.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["l1", "l2"]);
    }

    #[tokio::test]
    async fn test_missing_pipeline() {
        let store = InMemoryStore::new();
        let err = get_pipeline(&store, &PipelineId::new("nope")).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }
}
