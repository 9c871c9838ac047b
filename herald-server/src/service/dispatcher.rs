//! Broadcast dispatcher
//!
//! Turns persisted writes into observer events. Projections are always taken
//! from the state after the write, never from the incoming event, so observers
//! see exactly what a later bootstrap would read back.

use std::sync::Arc;

use herald_core::domain::log::LogEvent;
use herald_core::domain::pipeline::{Pipeline, StatusTransition};
use herald_core::dto::observer::ObserverEvent;
use herald_core::template::TemplateRegistry;

use crate::broadcast::BroadcastPort;

#[derive(Clone)]
pub struct BroadcastDispatcher {
    port: Arc<dyn BroadcastPort>,
    templates: Arc<TemplateRegistry>,
}

impl BroadcastDispatcher {
    pub fn new(port: Arc<dyn BroadcastPort>, templates: Arc<TemplateRegistry>) -> Self {
        Self { port, templates }
    }

    pub fn log_appended(&self, pipeline: &Pipeline, log: LogEvent) {
        self.port.publish(ObserverEvent::log_appended(pipeline, log));
    }

    pub fn status_written(&self, pipeline: &Pipeline, transition: &StatusTransition) {
        let template = self.templates.get(pipeline.template_version);
        if let Some(event) = ObserverEvent::status_written(pipeline, transition, template) {
            self.port.publish(event);
        }
    }

    /// Pass-through for events that do not come from a pipeline write.
    pub fn publish(&self, event: ObserverEvent) {
        self.port.publish(event);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingPort;
    use super::*;
    use chrono::Utc;
    use herald_core::domain::pipeline::{JobReport, PipelineStatus};
    use herald_core::domain::{PipelineId, ProjectId};
    use herald_core::template::FIVE_STAGE;

    #[test]
    fn test_no_op_write_publishes_nothing() {
        let port = Arc::new(RecordingPort::default());
        let dispatcher =
            BroadcastDispatcher::new(port.clone(), Arc::new(TemplateRegistry::builtin().unwrap()));
        let pipeline = Pipeline::new(
            PipelineId::new("p1"),
            ProjectId::new("proj"),
            FIVE_STAGE,
            Utc::now(),
        );

        dispatcher.status_written(&pipeline, &StatusTransition::default());
        assert!(port.events().is_empty());
    }

    #[test]
    fn test_stage_event_names_the_template_stage() {
        let templates = Arc::new(TemplateRegistry::builtin().unwrap());
        let port = Arc::new(RecordingPort::default());
        let dispatcher = BroadcastDispatcher::new(port.clone(), templates.clone());
        let mut pipeline = Pipeline::new(
            PipelineId::new("p1"),
            ProjectId::new("proj"),
            FIVE_STAGE,
            Utc::now(),
        );

        let jobs = vec![JobReport {
            name: "docker-build".to_string(),
            status: PipelineStatus::Running,
        }];
        let transition =
            pipeline.apply_status(PipelineStatus::Running, &jobs, &templates, Utc::now());
        dispatcher.status_written(&pipeline, &transition);

        match port.events().as_slice() {
            [ObserverEvent::StageStatusChanged { ordinal, stage, .. }] => {
                assert_eq!(*ordinal, Some(4));
                assert_eq!(stage.as_deref(), Some("Docker"));
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }
}
