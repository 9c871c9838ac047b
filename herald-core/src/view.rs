//! Observer view reconciliation
//!
//! A [`PipelineView`] is what an observer renders: the stage timeline and the
//! log panel of one pipeline. It is built in one of two ways that must agree:
//!
//! - bootstrap, from the persisted record alone; `current_stage` is enough to
//!   derive the whole timeline, no log replay needed
//! - live, by applying [`ObserverEvent`]s on top of an earlier view
//!
//! Bootstrapping after k events and then applying the rest reaches the same
//! timeline and log list as applying every event live from an empty view.

use serde::{Deserialize, Serialize};

use crate::domain::log::LogEvent;
use crate::domain::pipeline::{Pipeline, PipelineStatus};
use crate::domain::stage::{StageStatus, StageView};
use crate::domain::{PipelineId, ProjectId};
use crate::dto::observer::ObserverEvent;
use crate::template::{StageOrdinal, StageTemplate, TemplateVersion};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineView {
    pub pipeline_id: PipelineId,
    pub project_id: ProjectId,
    pub template_version: TemplateVersion,
    pub status: PipelineStatus,
    pub current_stage: Option<StageOrdinal>,
    pub stages: Vec<StageView>,
    pub logs: Vec<LogEvent>,
}

/// Derive a stage timeline from `current_stage` and `status`.
///
/// Without a template (unknown version) the timeline is empty.
pub fn derive_stages(
    template: Option<&StageTemplate>,
    current_stage: Option<StageOrdinal>,
    status: PipelineStatus,
) -> Vec<StageView> {
    let mut stages: Vec<StageView> = template
        .map(|t| {
            t.stages()
                .map(|(ordinal, def)| StageView {
                    ordinal,
                    name: def.name.clone(),
                    status: StageStatus::Pending,
                })
                .collect()
        })
        .unwrap_or_default();
    reconcile(&mut stages, current_stage, status);
    stages
}

/// Overwrite every stage from the (current stage, status) pair.
fn reconcile(stages: &mut [StageView], current_stage: Option<StageOrdinal>, status: PipelineStatus) {
    for stage in stages.iter_mut() {
        stage.status = match current_stage {
            Some(current) if stage.ordinal < current => StageStatus::Success,
            Some(current) if stage.ordinal == current => StageStatus::Running,
            _ => StageStatus::Pending,
        };
        stage.status = match (status, stage.status) {
            (PipelineStatus::Success, _) => StageStatus::Success,
            (PipelineStatus::Failed, StageStatus::Running) => StageStatus::Failed,
            (_, s) => s,
        };
    }
}

impl PipelineView {
    /// An empty view: nothing observed yet, every stage pending.
    pub fn empty(
        pipeline_id: PipelineId,
        project_id: ProjectId,
        template_version: TemplateVersion,
        template: Option<&StageTemplate>,
    ) -> Self {
        Self {
            pipeline_id,
            project_id,
            template_version,
            status: PipelineStatus::Pending,
            current_stage: None,
            stages: derive_stages(template, None, PipelineStatus::Pending),
            logs: Vec::new(),
        }
    }

    /// Rebuild a view from a persisted pipeline.
    ///
    /// `template` must be the one registered for `pipeline.template_version`.
    pub fn bootstrap(pipeline: &Pipeline, template: Option<&StageTemplate>) -> Self {
        let mut logs: Vec<LogEvent> = Vec::with_capacity(pipeline.logs.len());
        for log in &pipeline.logs {
            if !logs.iter().any(|l| l.id == log.id) {
                logs.push(log.clone());
            }
        }

        Self {
            pipeline_id: pipeline.id.clone(),
            project_id: pipeline.project_id.clone(),
            template_version: pipeline.template_version,
            status: pipeline.status,
            current_stage: pipeline.current_stage,
            stages: derive_stages(template, pipeline.current_stage, pipeline.status),
            logs,
        }
    }

    pub fn stage(&self, ordinal: StageOrdinal) -> Option<&StageView> {
        self.stages.iter().find(|s| s.ordinal == ordinal)
    }

    pub fn stage_statuses(&self) -> Vec<StageStatus> {
        self.stages.iter().map(|s| s.status).collect()
    }

    /// Apply one live event. Returns whether the view changed.
    ///
    /// Events for other pipelines are ignored.
    pub fn apply(&mut self, event: &ObserverEvent) -> bool {
        if event.pipeline_id() != Some(&self.pipeline_id) {
            return false;
        }

        match event {
            ObserverEvent::LogAppended { log, .. } => {
                if self.logs.iter().any(|l| l.id == log.id) {
                    return false;
                }
                self.logs.push(log.clone());
                true
            }
            ObserverEvent::StageStatusChanged {
                ordinal,
                status,
                pipeline_status,
                ..
            } => self.apply_stage(*ordinal, *status, *pipeline_status),
            ObserverEvent::PipelineTerminal {
                status,
                current_stage,
                ..
            } => self.apply_terminal(*status, *current_stage),
            ObserverEvent::PipelineStarted { .. } | ObserverEvent::ResyncRequired { .. } => false,
        }
    }

    fn apply_stage(
        &mut self,
        ordinal: Option<StageOrdinal>,
        status: StageStatus,
        pipeline_status: PipelineStatus,
    ) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        let mut changed = false;
        if !pipeline_status.is_terminal() && self.status == PipelineStatus::Pending {
            changed |= pipeline_status != self.status;
            self.status = pipeline_status;
        }

        let Some(ordinal) = ordinal else {
            return changed;
        };

        match status {
            StageStatus::Running => {
                if self.current_stage.is_some_and(|current| ordinal < current) {
                    return changed;
                }
                changed |= self.current_stage != Some(ordinal);
                self.current_stage = Some(ordinal);
                for stage in self.stages.iter_mut().filter(|s| !s.status.is_terminal()) {
                    let next = if stage.ordinal < ordinal {
                        StageStatus::Success
                    } else if stage.ordinal == ordinal {
                        StageStatus::Running
                    } else {
                        continue;
                    };
                    changed |= stage.status != next;
                    stage.status = next;
                }
            }
            StageStatus::Success | StageStatus::Failed => {
                if let Some(stage) = self
                    .stages
                    .iter_mut()
                    .find(|s| s.ordinal == ordinal && !s.status.is_terminal())
                {
                    stage.status = status;
                    changed = true;
                }
            }
            StageStatus::Pending => {}
        }
        changed
    }

    fn apply_terminal(
        &mut self,
        status: PipelineStatus,
        current_stage: Option<StageOrdinal>,
    ) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        if current_stage.is_some() {
            self.current_stage = current_stage;
        }
        reconcile(&mut self.stages, self.current_stage, status);
        true
    }
}
