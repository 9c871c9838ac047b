//! Repository Module
//!
//! Data access layer for the relay. The traits are the seams services depend on;
//! [`PgStore`] backs them with Postgres and [`memory::InMemoryStore`] with a map
//! for development and tests.

pub mod log;
pub mod memory;
pub mod pipeline;
pub mod project;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::domain::log::LogEvent;
use herald_core::domain::pipeline::{Pipeline, Provenance};
use herald_core::domain::project::Project;
use herald_core::domain::{PipelineId, ProjectId};
use sqlx::PgPool;

pub use log as log_repository;
pub use pipeline as pipeline_repository;
pub use project as project_repository;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable pipeline state.
///
/// Every write is an idempotent upsert so redelivered bus messages are harmless.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Insert a pipeline unless one with the same id exists. Returns true if inserted.
    async fn insert(&self, pipeline: &Pipeline) -> StoreResult<bool>;

    /// Pipeline with its logs, in arrival order.
    async fn find(&self, id: &PipelineId) -> StoreResult<Option<Pipeline>>;

    /// Pipeline without its logs.
    async fn find_state(&self, id: &PipelineId) -> StoreResult<Option<Pipeline>>;

    /// All pipelines of a project without their logs, most recent first.
    async fn list_by_project(&self, project_id: &ProjectId) -> StoreResult<Vec<Pipeline>>;

    /// Logs of the given pipelines, in arrival order. Pipelines with no logs are absent.
    async fn find_logs(
        &self,
        ids: &[PipelineId],
    ) -> StoreResult<HashMap<PipelineId, Vec<LogEvent>>>;

    /// Most recently created pipeline of a project created at or after `since`.
    async fn latest_since(
        &self,
        project_id: &ProjectId,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<Pipeline>>;

    /// Append a log unless its id is already stored. Returns true if appended.
    async fn append_log(
        &self,
        id: &PipelineId,
        log: &LogEvent,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Persist status, stage and timestamps. Terminal rows are never overwritten.
    async fn save_status(&self, pipeline: &Pipeline) -> StoreResult<bool>;

    /// Fill provenance fields that are still empty.
    async fn record_provenance(
        &self,
        id: &PipelineId,
        provenance: &Provenance,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn upsert_project(&self, project: &Project) -> StoreResult<Project>;

    async fn find_project(&self, id: &ProjectId) -> StoreResult<Option<Project>>;

    async fn list_projects(&self) -> StoreResult<Vec<Project>>;
}

/// Postgres-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineStore for PgStore {
    async fn insert(&self, pipeline: &Pipeline) -> StoreResult<bool> {
        pipeline_repository::insert(&self.pool, pipeline).await
    }

    async fn find(&self, id: &PipelineId) -> StoreResult<Option<Pipeline>> {
        let Some(mut pipeline) = pipeline_repository::find_by_id(&self.pool, id).await? else {
            return Ok(None);
        };
        pipeline.logs = log_repository::find_by_pipeline(&self.pool, id).await?;
        Ok(Some(pipeline))
    }

    async fn find_state(&self, id: &PipelineId) -> StoreResult<Option<Pipeline>> {
        pipeline_repository::find_by_id(&self.pool, id).await
    }

    async fn list_by_project(&self, project_id: &ProjectId) -> StoreResult<Vec<Pipeline>> {
        pipeline_repository::list_by_project(&self.pool, project_id).await
    }

    async fn find_logs(
        &self,
        ids: &[PipelineId],
    ) -> StoreResult<HashMap<PipelineId, Vec<LogEvent>>> {
        log_repository::find_by_pipelines(&self.pool, ids).await
    }

    async fn latest_since(
        &self,
        project_id: &ProjectId,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<Pipeline>> {
        pipeline_repository::latest_since(&self.pool, project_id, since).await
    }

    async fn append_log(
        &self,
        id: &PipelineId,
        log: &LogEvent,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let appended = log_repository::insert(&self.pool, id, log).await?;
        if appended {
            pipeline_repository::touch(&self.pool, id, now).await?;
        }
        Ok(appended)
    }

    async fn save_status(&self, pipeline: &Pipeline) -> StoreResult<bool> {
        pipeline_repository::update_status(&self.pool, pipeline).await
    }

    async fn record_provenance(
        &self,
        id: &PipelineId,
        provenance: &Provenance,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        pipeline_repository::record_provenance(&self.pool, id, provenance, now).await
    }
}

#[async_trait]
impl ProjectStore for PgStore {
    async fn upsert_project(&self, project: &Project) -> StoreResult<Project> {
        project_repository::upsert(&self.pool, project).await
    }

    async fn find_project(&self, id: &ProjectId) -> StoreResult<Option<Project>> {
        project_repository::find_by_id(&self.pool, id).await
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        project_repository::list_all(&self.pool).await
    }
}
