//! Observer events
//!
//! The UI-facing projection of persisted writes, pushed to every observer
//! subscribed to a project.

use serde::{Deserialize, Serialize};

use crate::domain::log::LogEvent;
use crate::domain::pipeline::{Pipeline, PipelineStatus, StatusTransition};
use crate::domain::stage::StageStatus;
use crate::domain::{PipelineId, ProjectId};
use crate::template::{StageOrdinal, StageTemplate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ObserverEvent {
    LogAppended {
        project_id: ProjectId,
        pipeline_id: PipelineId,
        log: LogEvent,
    },
    /// `ordinal` is absent when the pipeline status moved before any stage resolved.
    StageStatusChanged {
        project_id: ProjectId,
        pipeline_id: PipelineId,
        ordinal: Option<StageOrdinal>,
        stage: Option<String>,
        status: StageStatus,
        pipeline_status: PipelineStatus,
    },
    PipelineTerminal {
        project_id: ProjectId,
        pipeline_id: PipelineId,
        status: PipelineStatus,
        current_stage: Option<StageOrdinal>,
    },
    /// A trigger was handed off to the runner.
    PipelineStarted {
        project_id: ProjectId,
        pipeline_id: Option<PipelineId>,
    },
    /// The observer fell behind and lost events; it should bootstrap again.
    ResyncRequired { project_id: ProjectId, skipped: u64 },
}

impl ObserverEvent {
    pub fn project_id(&self) -> &ProjectId {
        match self {
            ObserverEvent::LogAppended { project_id, .. }
            | ObserverEvent::StageStatusChanged { project_id, .. }
            | ObserverEvent::PipelineTerminal { project_id, .. }
            | ObserverEvent::PipelineStarted { project_id, .. }
            | ObserverEvent::ResyncRequired { project_id, .. } => project_id,
        }
    }

    pub fn pipeline_id(&self) -> Option<&PipelineId> {
        match self {
            ObserverEvent::LogAppended { pipeline_id, .. }
            | ObserverEvent::StageStatusChanged { pipeline_id, .. }
            | ObserverEvent::PipelineTerminal { pipeline_id, .. } => Some(pipeline_id),
            ObserverEvent::PipelineStarted { pipeline_id, .. } => pipeline_id.as_ref(),
            ObserverEvent::ResyncRequired { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ObserverEvent::LogAppended { .. } => "log-appended",
            ObserverEvent::StageStatusChanged { .. } => "stage-status-changed",
            ObserverEvent::PipelineTerminal { .. } => "pipeline-terminal",
            ObserverEvent::PipelineStarted { .. } => "pipeline-started",
            ObserverEvent::ResyncRequired { .. } => "resync-required",
        }
    }

    /// Projection of an accepted log append.
    pub fn log_appended(pipeline: &Pipeline, log: LogEvent) -> Self {
        ObserverEvent::LogAppended {
            project_id: pipeline.project_id.clone(),
            pipeline_id: pipeline.id.clone(),
            log,
        }
    }

    /// Projection of a status write, taken from the persisted state after the write.
    ///
    /// No-op writes project nothing. Non-terminal writes project the current stage
    /// as running, or only the pipeline status while no stage is known; the terminal
    /// write carries the final stage so observers re-derive the same timeline a
    /// bootstrap would.
    pub fn status_written(
        pipeline: &Pipeline,
        transition: &StatusTransition,
        template: Option<&StageTemplate>,
    ) -> Option<Self> {
        if !transition.changed() {
            return None;
        }

        if pipeline.status.is_terminal() {
            return Some(ObserverEvent::PipelineTerminal {
                project_id: pipeline.project_id.clone(),
                pipeline_id: pipeline.id.clone(),
                status: pipeline.status,
                current_stage: pipeline.current_stage,
            });
        }

        let ordinal = pipeline.current_stage;
        Some(ObserverEvent::StageStatusChanged {
            project_id: pipeline.project_id.clone(),
            pipeline_id: pipeline.id.clone(),
            ordinal,
            stage: ordinal
                .zip(template)
                .and_then(|(o, t)| t.stage_name(o))
                .map(str::to_string),
            status: if ordinal.is_some() {
                StageStatus::Running
            } else {
                StageStatus::Pending
            },
            pipeline_status: pipeline.status,
        })
    }
}
