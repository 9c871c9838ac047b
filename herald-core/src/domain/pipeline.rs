//! Pipeline domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::log::LogEvent;
use super::{PipelineId, ProjectId};
use crate::template::{StageOrdinal, TemplateRegistry, TemplateVersion};

/// One runner execution of a project's deployment process.
///
/// Structure shared between the relay (persists) and observers (render).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: PipelineId,
    pub project_id: ProjectId,
    pub status: PipelineStatus,
    pub current_stage: Option<StageOrdinal>,
    pub logs: Vec<LogEvent>,
    pub commit_hash: Option<String>,
    pub author: Option<String>,
    pub trigger: Option<TriggerKind>,
    pub template_version: TemplateVersion,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Pipeline status
///
/// Monotonic: PENDING → RUNNING → SUCCESS | FAILED. Skipping ahead is allowed,
/// going back is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Pending,
    Running,
    Success,
    Failed,
}

/// What started a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Manual,
    Github,
}

/// A job as reported by the runner inside a status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub name: String,
    pub status: PipelineStatus,
}

/// Provenance written once, near creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub commit_hash: Option<String>,
    pub author: Option<String>,
    pub trigger: Option<TriggerKind>,
}

/// Result of applying a status report to a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusTransition {
    pub status_changed: bool,
    pub stage_changed: bool,
    /// Job names the pipeline's template could not resolve.
    pub unmapped: Vec<String>,
}

impl PipelineStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStatus::Success | PipelineStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            PipelineStatus::Pending => 0,
            PipelineStatus::Running => 1,
            PipelineStatus::Success | PipelineStatus::Failed => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStatus::Pending => "PENDING",
            PipelineStatus::Running => "RUNNING",
            PipelineStatus::Success => "SUCCESS",
            PipelineStatus::Failed => "FAILED",
        }
    }

    /// Parse a runner status string, case-insensitively.
    ///
    /// Accepts the spellings seen across runner versions.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "QUEUED" | "WAITING" => Some(PipelineStatus::Pending),
            "RUNNING" | "IN_PROGRESS" | "STARTED" => Some(PipelineStatus::Running),
            "SUCCESS" | "SUCCEEDED" | "COMPLETED" | "PASSED" => Some(PipelineStatus::Success),
            "FAILED" | "FAILURE" | "ERROR" => Some(PipelineStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Manual => "manual",
            TriggerKind::Github => "github",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "manual" => Some(TriggerKind::Manual),
            "github" => Some(TriggerKind::Github),
            _ => None,
        }
    }
}

impl StatusTransition {
    pub fn changed(&self) -> bool {
        self.status_changed || self.stage_changed
    }
}

impl Pipeline {
    /// A fresh PENDING pipeline with no logs.
    pub fn new(
        id: PipelineId,
        project_id: ProjectId,
        template_version: TemplateVersion,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            project_id,
            status: PipelineStatus::Pending,
            current_stage: None,
            logs: Vec::new(),
            commit_hash: None,
            author: None,
            trigger: None,
            template_version,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn has_log(&self, log_id: &str) -> bool {
        self.logs.iter().any(|l| l.id == log_id)
    }

    /// Append a log unless one with the same id is already present.
    ///
    /// Terminal pipelines still accept tail logs.
    pub fn append_log(&mut self, log: LogEvent, now: DateTime<Utc>) -> bool {
        if self.has_log(&log.id) {
            return false;
        }
        self.logs.push(log);
        self.updated_at = now;
        true
    }

    /// Fill provenance fields that are still empty. Returns true if anything was written.
    pub fn record_provenance(&mut self, provenance: &Provenance, now: DateTime<Utc>) -> bool {
        let mut written = false;
        if self.commit_hash.is_none() && provenance.commit_hash.is_some() {
            self.commit_hash = provenance.commit_hash.clone();
            written = true;
        }
        if self.author.is_none() && provenance.author.is_some() {
            self.author = provenance.author.clone();
            written = true;
        }
        if self.trigger.is_none() && provenance.trigger.is_some() {
            self.trigger = provenance.trigger;
            written = true;
        }
        if written {
            self.updated_at = now;
        }
        written
    }

    /// Apply a status report from the runner.
    ///
    /// - a terminal pipeline ignores the report entirely
    /// - the status never moves backwards
    /// - a RUNNING job that resolves against this pipeline's template moves
    ///   `current_stage` forward, or anywhere when the report is terminal
    /// - the FAILED job of a failing pipeline only moves it forward
    /// - names that do not resolve are returned as unmapped
    pub fn apply_status(
        &mut self,
        status: PipelineStatus,
        jobs: &[JobReport],
        templates: &TemplateRegistry,
        now: DateTime<Utc>,
    ) -> StatusTransition {
        if self.status.is_terminal() {
            return StatusTransition::default();
        }

        let next = if status.rank() >= self.status.rank() {
            status
        } else {
            self.status
        };

        let mut unmapped = Vec::new();
        let mut running: Option<StageOrdinal> = None;
        let mut failed: Option<StageOrdinal> = None;
        for job in jobs {
            match templates.resolve(self.template_version, &job.name) {
                Some(ordinal) => match job.status {
                    PipelineStatus::Running => running = running.max(Some(ordinal)),
                    PipelineStatus::Failed if next == PipelineStatus::Failed => {
                        failed = failed.max(Some(ordinal))
                    }
                    _ => {}
                },
                None => unmapped.push(job.name.clone()),
            }
        }

        let previous = self.current_stage;
        let next_stage = match running {
            Some(ordinal) if next.is_terminal() => Some(ordinal),
            _ => running
                .into_iter()
                .chain(failed)
                .filter(|ordinal| previous.is_none_or(|p| *ordinal >= p))
                .max()
                .or(previous),
        };

        let transition = StatusTransition {
            status_changed: next != self.status,
            stage_changed: next_stage != self.current_stage,
            unmapped,
        };

        if transition.changed() {
            self.status = next;
            self.current_stage = next_stage;
            self.updated_at = now;
            if next != PipelineStatus::Pending && self.started_at.is_none() {
                self.started_at = Some(now);
            }
            if next.is_terminal() {
                self.finished_at = Some(now);
            }
        }

        transition
    }

    /// Wall-clock run time, once both ends are known.
    pub fn duration_secs(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds().max(0)),
            _ => None,
        }
    }
}
