//! Trigger service
//!
//! Hands a project off to the external runner and attributes the pipeline the
//! runner starts. The runner's acknowledgement may name the pipeline; when it
//! does not, the newest unclaimed pipeline of the project created shortly
//! before the hand-off is adopted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use herald_core::domain::pipeline::{Pipeline, Provenance, TriggerKind};
use herald_core::domain::project::Project;
use herald_core::domain::{PipelineId, ProjectId};
use herald_core::dto::observer::ObserverEvent;
use herald_core::dto::trigger::{HandoffRequest, TriggerOutcome, TriggerRequest};

use crate::repository::{PipelineStore, ProjectStore, StoreError};
use crate::service::dispatcher::BroadcastDispatcher;

const TRACING_TARGET: &str = "herald_server::service::trigger";

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),

    #[error("no pipeline runner is configured")]
    RunnerNotConfigured,

    #[error("runner hand-off failed: {0}")]
    Handoff(String),

    #[error("runner rejected the trigger with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, TriggerError>;

/// What the runner answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandoffAck {
    pub pipeline_id: Option<PipelineId>,
}

impl HandoffAck {
    /// Read a pipeline id from the acknowledgement body, if it carries one.
    pub fn from_body(body: &str) -> Self {
        let pipeline_id = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                ["_id", "id", "pipelineId"]
                    .iter()
                    .find_map(|key| match value.get(*key)? {
                        serde_json::Value::String(s) if !s.trim().is_empty() => {
                            Some(s.trim().to_string())
                        }
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
            })
            .map(PipelineId::new);
        Self { pipeline_id }
    }
}

/// Outbound port to the external runner
#[async_trait]
pub trait RunnerHandoff: Send + Sync {
    async fn hand_off(&self, request: &HandoffRequest) -> Result<HandoffAck>;
}

/// Runner reached over HTTP
pub struct HttpRunnerHandoff {
    client: reqwest::Client,
    url: String,
}

impl HttpRunnerHandoff {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TriggerError::Handoff(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RunnerHandoff for HttpRunnerHandoff {
    async fn hand_off(&self, request: &HandoffRequest) -> Result<HandoffAck> {
        tracing::debug!(
            target: TRACING_TARGET,
            url = %self.url,
            project_id = %request.project_id,
            "handing off to runner"
        );

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| TriggerError::Handoff(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TriggerError::Handoff(e.to_string()))?;

        if !status.is_success() {
            return Err(TriggerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(HandoffAck::from_body(&body))
    }
}

/// Stand-in used when no runner URL is configured.
pub struct UnconfiguredRunner;

#[async_trait]
impl RunnerHandoff for UnconfiguredRunner {
    async fn hand_off(&self, _request: &HandoffRequest) -> Result<HandoffAck> {
        Err(TriggerError::RunnerNotConfigured)
    }
}

pub struct TriggerService {
    projects: Arc<dyn ProjectStore>,
    pipelines: Arc<dyn PipelineStore>,
    runner: Arc<dyn RunnerHandoff>,
    dispatcher: BroadcastDispatcher,
    window: chrono::Duration,
}

impl TriggerService {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        pipelines: Arc<dyn PipelineStore>,
        runner: Arc<dyn RunnerHandoff>,
        dispatcher: BroadcastDispatcher,
        window: chrono::Duration,
    ) -> Self {
        Self {
            projects,
            pipelines,
            runner,
            dispatcher,
            window,
        }
    }

    /// Manual trigger (and rollback, when a commit is given).
    pub async fn trigger(&self, request: TriggerRequest) -> Result<TriggerOutcome> {
        let project = self
            .projects
            .find_project(&request.project_id)
            .await?
            .ok_or_else(|| TriggerError::ProjectNotFound(request.project_id.clone()))?;

        self.trigger_project(&project, request.commit_hash, request.author, TriggerKind::Manual)
            .await
    }

    pub async fn trigger_project(
        &self,
        project: &Project,
        commit_hash: Option<String>,
        author: Option<String>,
        kind: TriggerKind,
    ) -> Result<TriggerOutcome> {
        let handed_off_at = Utc::now();
        let request = HandoffRequest {
            project_id: project.id.clone(),
            commit_hash,
            author,
            trigger: kind,
        };

        let ack = self.runner.hand_off(&request).await?;

        let provenance = Provenance {
            commit_hash: request.commit_hash.clone(),
            author: request.author.clone(),
            trigger: Some(kind),
        };

        let pipeline_id = match ack.pipeline_id {
            Some(id) => {
                // The runner may not have registered it yet.
                let pipeline =
                    Pipeline::new(id.clone(), project.id.clone(), project.template_version, Utc::now());
                if self.pipelines.insert(&pipeline).await? {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        pipeline_id = %id,
                        "created pipeline record from runner acknowledgement"
                    );
                }
                Some(id)
            }
            None => self.adopt_recent(&project.id, handed_off_at).await?,
        };

        if let Some(id) = &pipeline_id {
            self.pipelines
                .record_provenance(id, &provenance, Utc::now())
                .await?;
        }

        self.dispatcher.publish(ObserverEvent::PipelineStarted {
            project_id: project.id.clone(),
            pipeline_id: pipeline_id.clone(),
        });

        let outcome = match pipeline_id {
            Some(pipeline_id) => TriggerOutcome::Attributed { pipeline_id },
            None => TriggerOutcome::AttributionPending {
                project_id: project.id.clone(),
            },
        };

        tracing::info!(
            target: TRACING_TARGET,
            project_id = %project.id,
            trigger = kind.as_str(),
            pipeline_id = ?outcome.pipeline_id().map(PipelineId::as_str),
            "pipeline triggered"
        );

        Ok(outcome)
    }

    async fn adopt_recent(
        &self,
        project_id: &ProjectId,
        handed_off_at: chrono::DateTime<Utc>,
    ) -> Result<Option<PipelineId>> {
        let candidate = self
            .pipelines
            .latest_since(project_id, handed_off_at - self.window)
            .await?;

        Ok(candidate
            .filter(|p| p.trigger.is_none())
            .map(|p| p.id))
    }
}
