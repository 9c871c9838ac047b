//! Pipeline Repository
//!
//! Handles all database operations on the `pipelines` table. Logs live in
//! their own table, see [`super::log`].

use chrono::{DateTime, Utc};
use herald_core::domain::pipeline::{Pipeline, PipelineStatus, Provenance, TriggerKind};
use herald_core::domain::{PipelineId, ProjectId};
use herald_core::template::TemplateVersion;
use sqlx::PgPool;

use super::{StoreError, StoreResult};

const COLUMNS: &str = r#"
    id, project_id, status, current_stage, commit_hash, author, trigger,
    template_version, created_at, updated_at, started_at, finished_at
"#;

/// Insert a pipeline, leaving an existing row untouched
pub async fn insert(pool: &PgPool, pipeline: &Pipeline) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO pipelines (
            id, project_id, status, current_stage, commit_hash, author, trigger,
            template_version, created_at, updated_at, started_at, finished_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(pipeline.id.as_str())
    .bind(pipeline.project_id.as_str())
    .bind(pipeline.status.as_str())
    .bind(pipeline.current_stage.map(|s| s as i32))
    .bind(&pipeline.commit_hash)
    .bind(&pipeline.author)
    .bind(pipeline.trigger.map(TriggerKind::as_str))
    .bind(pipeline.template_version.0 as i32)
    .bind(pipeline.created_at)
    .bind(pipeline.updated_at)
    .bind(pipeline.started_at)
    .bind(pipeline.finished_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Find a pipeline by ID, without logs
pub async fn find_by_id(pool: &PgPool, id: &PipelineId) -> StoreResult<Option<Pipeline>> {
    let row = sqlx::query_as::<_, PipelineRow>(&format!(
        "SELECT {COLUMNS} FROM pipelines WHERE id = $1"
    ))
    .bind(id.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(Pipeline::try_from).transpose()
}

/// List a project's pipelines, most recent first, without logs
pub async fn list_by_project(pool: &PgPool, project_id: &ProjectId) -> StoreResult<Vec<Pipeline>> {
    let rows = sqlx::query_as::<_, PipelineRow>(&format!(
        "SELECT {COLUMNS} FROM pipelines WHERE project_id = $1 ORDER BY created_at DESC, id DESC"
    ))
    .bind(project_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Pipeline::try_from).collect()
}

/// Newest pipeline of a project created at or after `since`
pub async fn latest_since(
    pool: &PgPool,
    project_id: &ProjectId,
    since: DateTime<Utc>,
) -> StoreResult<Option<Pipeline>> {
    let row = sqlx::query_as::<_, PipelineRow>(&format!(
        r#"
        SELECT {COLUMNS} FROM pipelines
        WHERE project_id = $1 AND created_at >= $2
        ORDER BY created_at DESC
        LIMIT 1
        "#
    ))
    .bind(project_id.as_str())
    .bind(since)
    .fetch_optional(pool)
    .await?;

    row.map(Pipeline::try_from).transpose()
}

/// Write status, stage and timestamps.
///
/// The WHERE clause refuses to touch a terminal row, so a late writer can never
/// reopen a finished pipeline. Timestamps are only filled once.
pub async fn update_status(pool: &PgPool, pipeline: &Pipeline) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE pipelines
        SET status = $2,
            current_stage = $3,
            started_at = COALESCE(started_at, $4),
            finished_at = COALESCE(finished_at, $5),
            updated_at = $6
        WHERE id = $1 AND status NOT IN ('SUCCESS', 'FAILED')
        "#,
    )
    .bind(pipeline.id.as_str())
    .bind(pipeline.status.as_str())
    .bind(pipeline.current_stage.map(|s| s as i32))
    .bind(pipeline.started_at)
    .bind(pipeline.finished_at)
    .bind(pipeline.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fill empty provenance columns
pub async fn record_provenance(
    pool: &PgPool,
    id: &PipelineId,
    provenance: &Provenance,
    now: DateTime<Utc>,
) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE pipelines
        SET commit_hash = COALESCE(commit_hash, $2),
            author = COALESCE(author, $3),
            trigger = COALESCE(trigger, $4),
            updated_at = $5
        WHERE id = $1
          AND ((commit_hash IS NULL AND $2 IS NOT NULL)
            OR (author IS NULL AND $3 IS NOT NULL)
            OR (trigger IS NULL AND $4 IS NOT NULL))
        "#,
    )
    .bind(id.as_str())
    .bind(&provenance.commit_hash)
    .bind(&provenance.author)
    .bind(provenance.trigger.map(TriggerKind::as_str))
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Bump `updated_at` after a log append
pub async fn touch(pool: &PgPool, id: &PipelineId, now: DateTime<Utc>) -> StoreResult<()> {
    sqlx::query("UPDATE pipelines SET updated_at = GREATEST(updated_at, $2) WHERE id = $1")
        .bind(id.as_str())
        .bind(now)
        .execute(pool)
        .await?;

    Ok(())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: String,
    project_id: String,
    status: String,
    current_stage: Option<i32>,
    commit_hash: Option<String>,
    author: Option<String>,
    trigger: Option<String>,
    template_version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<PipelineRow> for Pipeline {
    type Error = StoreError;

    fn try_from(row: PipelineRow) -> Result<Self, Self::Error> {
        let status = PipelineStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!("pipeline {} has status {:?}", row.id, row.status))
        })?;

        Ok(Pipeline {
            id: PipelineId::new(row.id),
            project_id: ProjectId::new(row.project_id),
            status,
            current_stage: row.current_stage.map(|s| s as u32),
            logs: Vec::new(),
            commit_hash: row.commit_hash,
            author: row.author,
            trigger: row.trigger.as_deref().and_then(TriggerKind::parse),
            template_version: TemplateVersion(row.template_version as u32),
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}
