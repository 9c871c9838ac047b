//! Canonical pipeline events
//!
//! Every raw bus message that survives normalization becomes exactly one
//! [`PipelineEvent`]. The set of variants is closed; consumers match exhaustively.

use crate::domain::PipelineId;
use crate::domain::log::LogEvent;
use crate::domain::pipeline::{JobReport, PipelineStatus};

/// Logical bus channel a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Logs,
    Status,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Logs, Channel::Status];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Logs => "pipeline-logs",
            Channel::Status => "pipeline-status",
        }
    }

    /// Look a channel up by name, ignoring any subject prefix (`runner.pipeline-logs`).
    pub fn from_subject(subject: &str) -> Option<Self> {
        let name = subject.rsplit('.').next().unwrap_or(subject);
        Channel::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    LogAppended {
        pipeline_id: PipelineId,
        log: LogEvent,
    },
    StatusChanged {
        pipeline_id: PipelineId,
        status: PipelineStatus,
        jobs: Vec<JobReport>,
    },
}

impl PipelineEvent {
    pub fn pipeline_id(&self) -> &PipelineId {
        match self {
            PipelineEvent::LogAppended { pipeline_id, .. } => pipeline_id,
            PipelineEvent::StatusChanged { pipeline_id, .. } => pipeline_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::LogAppended { .. } => "log-appended",
            PipelineEvent::StatusChanged { .. } => "status-changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_from_subject() {
        assert_eq!(Channel::from_subject("pipeline-logs"), Some(Channel::Logs));
        assert_eq!(
            Channel::from_subject("runner.pipeline-status"),
            Some(Channel::Status)
        );
        assert_eq!(Channel::from_subject("runner.heartbeat"), None);
    }
}
