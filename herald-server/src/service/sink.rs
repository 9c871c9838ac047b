//! Persistence sink
//!
//! Applies canonical events to the durable store and hands successful writes to
//! the dispatcher. Callers must serialize events per pipeline id; the ingest
//! workers guarantee that.

use std::sync::Arc;

use chrono::Utc;
use herald_core::domain::PipelineId;
use herald_core::domain::log::LogEvent;
use herald_core::domain::pipeline::{JobReport, PipelineStatus};
use herald_core::event::PipelineEvent;
use herald_core::template::TemplateRegistry;

use crate::repository::{PipelineStore, StoreError};
use crate::service::dispatcher::BroadcastDispatcher;

const TRACING_TARGET: &str = "herald_server::service::sink";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// No record yet; redelivery completes the event once it is registered.
    #[error("unknown pipeline {0}")]
    UnknownPipeline(PipelineId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SinkError>;

/// What a write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    Written,
    /// Duplicate or stale; nothing changed and nothing was published.
    Unchanged,
}

pub struct PersistenceSink {
    store: Arc<dyn PipelineStore>,
    templates: Arc<TemplateRegistry>,
    dispatcher: BroadcastDispatcher,
}

impl PersistenceSink {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        templates: Arc<TemplateRegistry>,
        dispatcher: BroadcastDispatcher,
    ) -> Self {
        Self {
            store,
            templates,
            dispatcher,
        }
    }

    pub async fn apply(&self, event: PipelineEvent) -> Result<SinkOutcome> {
        match event {
            PipelineEvent::LogAppended { pipeline_id, log } => {
                self.append_log(&pipeline_id, log).await
            }
            PipelineEvent::StatusChanged {
                pipeline_id,
                status,
                jobs,
            } => self.change_status(&pipeline_id, status, &jobs).await,
        }
    }

    async fn append_log(&self, pipeline_id: &PipelineId, log: LogEvent) -> Result<SinkOutcome> {
        let pipeline = self
            .store
            .find_state(pipeline_id)
            .await?
            .ok_or_else(|| SinkError::UnknownPipeline(pipeline_id.clone()))?;

        if !self.store.append_log(pipeline_id, &log, Utc::now()).await? {
            tracing::debug!(
                target: TRACING_TARGET,
                pipeline_id = %pipeline_id,
                log_id = %log.id,
                "duplicate log ignored"
            );
            return Ok(SinkOutcome::Unchanged);
        }

        self.dispatcher.log_appended(&pipeline, log);
        Ok(SinkOutcome::Written)
    }

    async fn change_status(
        &self,
        pipeline_id: &PipelineId,
        status: PipelineStatus,
        jobs: &[JobReport],
    ) -> Result<SinkOutcome> {
        let mut pipeline = self
            .store
            .find_state(pipeline_id)
            .await?
            .ok_or_else(|| SinkError::UnknownPipeline(pipeline_id.clone()))?;

        if !self.templates.contains(pipeline.template_version) {
            tracing::warn!(
                target: TRACING_TARGET,
                pipeline_id = %pipeline_id,
                template_version = pipeline.template_version.0,
                "pipeline uses an unknown stage template, stages will not advance"
            );
        }

        let transition = pipeline.apply_status(status, jobs, &self.templates, Utc::now());

        if !transition.unmapped.is_empty() {
            tracing::warn!(
                target: TRACING_TARGET,
                pipeline_id = %pipeline_id,
                jobs = ?transition.unmapped,
                "unmapped stage names in status report"
            );
        }

        if !transition.changed() {
            tracing::debug!(
                target: TRACING_TARGET,
                pipeline_id = %pipeline_id,
                status = %status,
                current = %pipeline.status,
                "status report changed nothing"
            );
            return Ok(SinkOutcome::Unchanged);
        }

        if !self.store.save_status(&pipeline).await? {
            // Already terminal in storage; the stored state wins.
            return Ok(SinkOutcome::Unchanged);
        }

        tracing::info!(
            target: TRACING_TARGET,
            pipeline_id = %pipeline_id,
            status = %pipeline.status,
            current_stage = ?pipeline.current_stage,
            "pipeline status written"
        );

        self.dispatcher.status_written(&pipeline, &transition);
        Ok(SinkOutcome::Written)
    }
}
