use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id VARCHAR(255) PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            repo_url TEXT NOT NULL,
            branch VARCHAR(255) NOT NULL,
            auto_deploy BOOLEAN NOT NULL DEFAULT TRUE,
            template_version INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Pipelines are keyed by the runner's id; there is no FK to projects
    // because the runner may register a pipeline before the project exists here.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            id VARCHAR(255) PRIMARY KEY,
            project_id VARCHAR(255) NOT NULL,
            status VARCHAR(20) NOT NULL,
            current_stage INTEGER,
            commit_hash VARCHAR(255),
            author VARCHAR(255),
            trigger VARCHAR(20),
            template_version INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            finished_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // `seq` preserves arrival order; the unique key makes appends idempotent.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_logs (
            seq BIGSERIAL PRIMARY KEY,
            pipeline_id VARCHAR(255) NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
            log_id VARCHAR(255) NOT NULL,
            timestamp TIMESTAMPTZ,
            level VARCHAR(20) NOT NULL,
            message TEXT NOT NULL,
            stage VARCHAR(255),
            UNIQUE (pipeline_id, log_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipelines_project_created ON pipelines(project_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_logs_pipeline ON pipeline_logs(pipeline_id, seq)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
