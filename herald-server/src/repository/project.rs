//! Project Repository

use herald_core::domain::ProjectId;
use herald_core::domain::project::Project;
use herald_core::template::TemplateVersion;
use sqlx::PgPool;

use super::StoreResult;

/// Insert a project or update everything but its creation time
pub async fn upsert(pool: &PgPool, project: &Project) -> StoreResult<Project> {
    let row = sqlx::query_as::<_, ProjectRow>(
        r#"
        INSERT INTO projects (
            id, name, repo_url, branch, auto_deploy, template_version, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name,
            repo_url = EXCLUDED.repo_url,
            branch = EXCLUDED.branch,
            auto_deploy = EXCLUDED.auto_deploy,
            template_version = EXCLUDED.template_version,
            updated_at = EXCLUDED.updated_at
        RETURNING id, name, repo_url, branch, auto_deploy, template_version, created_at, updated_at
        "#,
    )
    .bind(project.id.as_str())
    .bind(&project.name)
    .bind(&project.repo_url)
    .bind(&project.branch)
    .bind(project.auto_deploy)
    .bind(project.template_version.0 as i32)
    .bind(project.created_at)
    .bind(project.updated_at)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Find a project by ID
pub async fn find_by_id(pool: &PgPool, id: &ProjectId) -> StoreResult<Option<Project>> {
    let row = sqlx::query_as::<_, ProjectRow>(
        r#"
        SELECT id, name, repo_url, branch, auto_deploy, template_version, created_at, updated_at
        FROM projects
        WHERE id = $1
        "#,
    )
    .bind(id.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List all projects
pub async fn list_all(pool: &PgPool) -> StoreResult<Vec<Project>> {
    let rows = sqlx::query_as::<_, ProjectRow>(
        r#"
        SELECT id, name, repo_url, branch, auto_deploy, template_version, created_at, updated_at
        FROM projects
        ORDER BY created_at ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: String,
    name: String,
    repo_url: String,
    branch: String,
    auto_deploy: bool,
    template_version: i32,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: ProjectId::new(row.id),
            name: row.name,
            repo_url: row.repo_url,
            branch: row.branch,
            auto_deploy: row.auto_deploy,
            template_version: TemplateVersion(row.template_version as u32),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
