//! Log Repository
//!
//! Handles all database operations related to pipeline logs.

use std::collections::HashMap;

use herald_core::domain::PipelineId;
use herald_core::domain::log::{LogEvent, LogLevel};
use sqlx::PgPool;

use super::StoreResult;

/// Insert a log entry; a second insert with the same log id is ignored
pub async fn insert(pool: &PgPool, pipeline_id: &PipelineId, log: &LogEvent) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO pipeline_logs (pipeline_id, log_id, timestamp, level, message, stage)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (pipeline_id, log_id) DO NOTHING
        "#,
    )
    .bind(pipeline_id.as_str())
    .bind(&log.id)
    .bind(log.timestamp)
    .bind(log.level.as_str())
    .bind(&log.message)
    .bind(&log.stage)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// All log entries of a pipeline, in arrival order
pub async fn find_by_pipeline(pool: &PgPool, pipeline_id: &PipelineId) -> StoreResult<Vec<LogEvent>> {
    let rows = sqlx::query_as::<_, LogRow>(
        r#"
        SELECT pipeline_id, log_id, timestamp, level, message, stage
        FROM pipeline_logs
        WHERE pipeline_id = $1
        ORDER BY seq ASC
        "#,
    )
    .bind(pipeline_id.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(LogEvent::from).collect())
}

/// Logs of several pipelines in one round trip, grouped by pipeline
pub async fn find_by_pipelines(
    pool: &PgPool,
    pipeline_ids: &[PipelineId],
) -> StoreResult<HashMap<PipelineId, Vec<LogEvent>>> {
    if pipeline_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let ids: Vec<&str> = pipeline_ids.iter().map(PipelineId::as_str).collect();
    let rows = sqlx::query_as::<_, LogRow>(
        r#"
        SELECT pipeline_id, log_id, timestamp, level, message, stage
        FROM pipeline_logs
        WHERE pipeline_id = ANY($1)
        ORDER BY seq ASC
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<PipelineId, Vec<LogEvent>> = HashMap::new();
    for row in rows {
        grouped
            .entry(PipelineId::new(row.pipeline_id.clone()))
            .or_default()
            .push(row.into());
    }
    Ok(grouped)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct LogRow {
    pipeline_id: String,
    log_id: String,
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
    level: String,
    message: String,
    stage: Option<String>,
}

impl From<LogRow> for LogEvent {
    fn from(row: LogRow) -> Self {
        LogEvent {
            id: row.log_id,
            timestamp: row.timestamp,
            level: LogLevel::parse(&row.level).unwrap_or_else(|| LogLevel::infer(&row.message)),
            message: row.message,
            stage: row.stage,
        }
    }
}
