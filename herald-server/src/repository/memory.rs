//! In-memory store for development and tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::domain::log::LogEvent;
use herald_core::domain::pipeline::{Pipeline, Provenance};
use herald_core::domain::project::Project;
use herald_core::domain::{PipelineId, ProjectId};

use super::{PipelineStore, ProjectStore, StoreError, StoreResult};

/// Thread-safe in-memory pipeline and project store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<InMemoryState>>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    pipelines: HashMap<PipelineId, Stored>,
    projects: HashMap<ProjectId, Project>,
    next_seq: u64,
}

#[derive(Debug)]
struct Stored {
    seq: u64,
    pipeline: Pipeline,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, InMemoryState>> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, InMemoryState>> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }
}

fn without_logs(pipeline: &Pipeline) -> Pipeline {
    Pipeline {
        logs: Vec::new(),
        ..pipeline.clone()
    }
}

/// Most recent first; insertion order breaks ties.
fn by_recency<'a>(state: &'a InMemoryState, project_id: &ProjectId) -> Vec<&'a Stored> {
    let mut stored: Vec<&Stored> = state
        .pipelines
        .values()
        .filter(|s| &s.pipeline.project_id == project_id)
        .collect();
    stored.sort_by(|a, b| {
        b.pipeline
            .created_at
            .cmp(&a.pipeline.created_at)
            .then(b.seq.cmp(&a.seq))
    });
    stored
}

#[async_trait]
impl PipelineStore for InMemoryStore {
    async fn insert(&self, pipeline: &Pipeline) -> StoreResult<bool> {
        let mut state = self.write()?;
        if state.pipelines.contains_key(&pipeline.id) {
            return Ok(false);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pipelines.insert(
            pipeline.id.clone(),
            Stored {
                seq,
                pipeline: pipeline.clone(),
            },
        );
        Ok(true)
    }

    async fn find(&self, id: &PipelineId) -> StoreResult<Option<Pipeline>> {
        Ok(self.read()?.pipelines.get(id).map(|s| s.pipeline.clone()))
    }

    async fn find_state(&self, id: &PipelineId) -> StoreResult<Option<Pipeline>> {
        Ok(self
            .read()?
            .pipelines
            .get(id)
            .map(|s| without_logs(&s.pipeline)))
    }

    async fn list_by_project(&self, project_id: &ProjectId) -> StoreResult<Vec<Pipeline>> {
        let state = self.read()?;
        Ok(by_recency(&state, project_id)
            .into_iter()
            .map(|s| without_logs(&s.pipeline))
            .collect())
    }

    async fn find_logs(
        &self,
        ids: &[PipelineId],
    ) -> StoreResult<HashMap<PipelineId, Vec<LogEvent>>> {
        let state = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.pipelines.get(id))
            .filter(|s| !s.pipeline.logs.is_empty())
            .map(|s| (s.pipeline.id.clone(), s.pipeline.logs.clone()))
            .collect())
    }

    async fn latest_since(
        &self,
        project_id: &ProjectId,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<Pipeline>> {
        let state = self.read()?;
        Ok(by_recency(&state, project_id)
            .into_iter()
            .find(|s| s.pipeline.created_at >= since)
            .map(|s| without_logs(&s.pipeline)))
    }

    async fn append_log(
        &self,
        id: &PipelineId,
        log: &LogEvent,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.write()?;
        Ok(match state.pipelines.get_mut(id) {
            Some(stored) => stored.pipeline.append_log(log.clone(), now),
            None => false,
        })
    }

    async fn save_status(&self, pipeline: &Pipeline) -> StoreResult<bool> {
        let mut state = self.write()?;
        let Some(stored) = state.pipelines.get_mut(&pipeline.id) else {
            return Ok(false);
        };
        let current = &mut stored.pipeline;
        if current.status.is_terminal() {
            return Ok(false);
        }
        current.status = pipeline.status;
        current.current_stage = pipeline.current_stage;
        current.started_at = current.started_at.or(pipeline.started_at);
        current.finished_at = current.finished_at.or(pipeline.finished_at);
        current.updated_at = pipeline.updated_at;
        Ok(true)
    }

    async fn record_provenance(
        &self,
        id: &PipelineId,
        provenance: &Provenance,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.write()?;
        Ok(match state.pipelines.get_mut(id) {
            Some(stored) => stored.pipeline.record_provenance(provenance, now),
            None => false,
        })
    }
}

#[async_trait]
impl ProjectStore for InMemoryStore {
    async fn upsert_project(&self, project: &Project) -> StoreResult<Project> {
        let mut state = self.write()?;
        let stored = match state.projects.get(&project.id) {
            Some(existing) => Project {
                created_at: existing.created_at,
                ..project.clone()
            },
            None => project.clone(),
        };
        state.projects.insert(project.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_project(&self, id: &ProjectId) -> StoreResult<Option<Project>> {
        Ok(self.read()?.projects.get(id).cloned())
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let mut projects: Vec<Project> = self.read()?.projects.values().cloned().collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(projects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::domain::log::LogLevel;
    use herald_core::domain::pipeline::{PipelineStatus, TriggerKind};
    use herald_core::template::FIVE_STAGE;

    fn pipeline(id: &str, created_at: DateTime<Utc>) -> Pipeline {
        Pipeline::new(PipelineId::new(id), ProjectId::new("proj"), FIVE_STAGE, created_at)
    }

    fn log(id: &str) -> LogEvent {
        LogEvent {
            id: id.to_string(),
            timestamp: None,
            level: LogLevel::Info,
            message: format!("line {id}"),
            stage: None,
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        assert!(store.insert(&pipeline("p1", now)).await.unwrap());

        let mut again = pipeline("p1", now);
        again.status = PipelineStatus::Running;
        assert!(!store.insert(&again).await.unwrap());

        let stored = store.find(&PipelineId::new("p1")).await.unwrap().unwrap();
        assert_eq!(stored.status, PipelineStatus::Pending);
    }

    #[tokio::test]
    async fn test_append_log_dedupes_and_keeps_order() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let id = PipelineId::new("p1");
        store.insert(&pipeline("p1", now)).await.unwrap();

        assert!(store.append_log(&id, &log("a"), now).await.unwrap());
        assert!(store.append_log(&id, &log("b"), now).await.unwrap());
        assert!(!store.append_log(&id, &log("a"), now).await.unwrap());
        assert!(!store
            .append_log(&PipelineId::new("missing"), &log("a"), now)
            .await
            .unwrap());

        let stored = store.find(&id).await.unwrap().unwrap();
        let ids: Vec<_> = stored.logs.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(store.find_state(&id).await.unwrap().unwrap().logs.is_empty());
    }

    #[tokio::test]
    async fn test_save_status_never_reopens_terminal() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut p = pipeline("p1", now);
        store.insert(&p).await.unwrap();

        p.status = PipelineStatus::Success;
        p.finished_at = Some(now);
        assert!(store.save_status(&p).await.unwrap());

        p.status = PipelineStatus::Running;
        assert!(!store.save_status(&p).await.unwrap());
        let stored = store.find_state(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PipelineStatus::Success);
    }

    #[tokio::test]
    async fn test_list_and_latest_since_order_by_recency() {
        let store = InMemoryStore::new();
        let t0 = Utc::now() - chrono::Duration::seconds(60);
        store.insert(&pipeline("old", t0)).await.unwrap();
        store
            .insert(&pipeline("new", t0 + chrono::Duration::seconds(50)))
            .await
            .unwrap();

        let listed = store.list_by_project(&ProjectId::new("proj")).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        let since = t0 + chrono::Duration::seconds(40);
        let latest = store
            .latest_since(&ProjectId::new("proj"), since)
            .await
            .unwrap();
        assert_eq!(latest.map(|p| p.id.as_str().to_string()), Some("new".to_string()));

        let none = store
            .latest_since(&ProjectId::new("proj"), Utc::now())
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_provenance_is_write_once() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let id = PipelineId::new("p1");
        store.insert(&pipeline("p1", now)).await.unwrap();

        let first = Provenance {
            commit_hash: Some("abc".to_string()),
            author: None,
            trigger: Some(TriggerKind::Manual),
        };
        assert!(store.record_provenance(&id, &first, now).await.unwrap());

        let second = Provenance {
            commit_hash: Some("def".to_string()),
            author: None,
            trigger: Some(TriggerKind::Github),
        };
        assert!(!store.record_provenance(&id, &second, now).await.unwrap());

        let stored = store.find_state(&id).await.unwrap().unwrap();
        assert_eq!(stored.commit_hash.as_deref(), Some("abc"));
        assert_eq!(stored.trigger, Some(TriggerKind::Manual));
    }

    #[tokio::test]
    async fn test_upsert_project_keeps_creation_time() {
        let store = InMemoryStore::new();
        let created = Utc::now() - chrono::Duration::days(1);
        let project = Project {
            id: ProjectId::new("proj"),
            name: "shop".to_string(),
            repo_url: "https://github.com/acme/shop.git".to_string(),
            branch: "main".to_string(),
            auto_deploy: true,
            template_version: FIVE_STAGE,
            created_at: created,
            updated_at: created,
        };
        store.upsert_project(&project).await.unwrap();

        let renamed = Project {
            name: "storefront".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            ..project.clone()
        };
        let stored = store.upsert_project(&renamed).await.unwrap();
        assert_eq!(stored.name, "storefront");
        assert_eq!(stored.created_at, created);
        assert_eq!(store.list_projects().await.unwrap().len(), 1);
    }
}
