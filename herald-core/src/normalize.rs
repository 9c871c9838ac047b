//! Event normalization
//!
//! Turns a raw bus message of unknown shape into one [`PipelineEvent`].
//! Decoders are plain functions tried in the order of [`DECODERS`]; the first
//! that succeeds wins. Every decoder is pure: the same bytes always produce the
//! same event, which is what makes redelivery idempotent downstream.
//!
//! Two shapes are understood:
//!
//! - structured: `{"type": "log" | "status" | "completed", "data": {...}}`
//! - legacy delimited: `<pipelineId>|<rest>`, where `rest` depends on the channel

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::PipelineId;
use crate::domain::log::{LogEvent, LogLevel};
use crate::domain::pipeline::{JobReport, PipelineStatus};
use crate::event::{Channel, PipelineEvent};

/// Separator of the legacy delimited format.
pub const SEPARATOR: char = '|';

pub type Decoder = fn(Channel, &str) -> Result<PipelineEvent, DecodeError>;

/// Decoders in priority order.
pub const DECODERS: &[(&str, Decoder)] = &[
    ("structured", decode_structured),
    ("legacy", decode_legacy),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("message is not valid UTF-8")]
    InvalidEncoding,

    #[error("not a structured record: {0}")]
    NotStructured(String),

    #[error("unsupported record type '{0}'")]
    UnknownType(String),

    #[error("invalid '{kind}' payload: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("no '|' separator")]
    NoSeparator,

    #[error("invalid pipeline id '{0}'")]
    InvalidPipelineId(String),

    #[error("empty log message")]
    EmptyMessage,

    #[error("unrecognised status '{0}'")]
    UnknownStatus(String),

    #[error("invalid job list: {0}")]
    InvalidJobs(String),
}

/// A message no decoder accepted, with each decoder's reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected: {}", describe(.reasons))]
pub struct Rejection {
    pub reasons: Vec<(&'static str, DecodeError)>,
}

fn describe(reasons: &[(&'static str, DecodeError)]) -> String {
    reasons
        .iter()
        .map(|(decoder, err)| format!("{}: {}", decoder, err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Normalize one raw message.
pub fn normalize(channel: Channel, raw: &[u8]) -> Result<PipelineEvent, Rejection> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text.trim(),
        Err(_) => {
            return Err(Rejection {
                reasons: vec![("utf8", DecodeError::InvalidEncoding)],
            });
        }
    };

    let mut reasons = Vec::with_capacity(DECODERS.len());
    for (name, decode) in DECODERS {
        match decode(channel, text) {
            Ok(event) => return Ok(event),
            Err(err) => reasons.push((*name, err)),
        }
    }
    Err(Rejection { reasons })
}

/// Deterministic log id for messages that carry none.
pub fn content_id(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    format!("log-{}", &hex::encode(digest)[..16])
}

// =============================================================================
// Structured records
// =============================================================================

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    data: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogData {
    #[serde(alias = "pipeline_id")]
    pipeline_id: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    level: Option<String>,
    message: String,
    #[serde(default, alias = "step")]
    stage: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusData {
    #[serde(alias = "pipeline_id")]
    pipeline_id: String,
    status: String,
    #[serde(default)]
    jobs: Option<JobsField>,
    #[serde(default, alias = "stageId", alias = "job")]
    stage: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletedData {
    #[serde(alias = "pipeline_id")]
    pipeline_id: String,
    success: bool,
}

/// `jobs` arrives as a bare name, a single descriptor or a list of either.
#[derive(Deserialize)]
#[serde(untagged)]
enum JobsField {
    Many(Vec<JobEntry>),
    One(JobEntry),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JobEntry {
    Name(String),
    Report {
        name: String,
        #[serde(default)]
        status: Option<String>,
    },
}

pub fn decode_structured(_channel: Channel, text: &str) -> Result<PipelineEvent, DecodeError> {
    if !text.starts_with('{') {
        return Err(DecodeError::NotStructured("not a JSON object".to_string()));
    }
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| DecodeError::NotStructured(e.to_string()))?;

    match envelope.kind.to_ascii_lowercase().as_str() {
        "log" => {
            let data: LogData = payload(&envelope)?;
            let pipeline_id = pipeline_id(&data.pipeline_id)?;
            let level = data
                .level
                .as_deref()
                .and_then(LogLevel::parse)
                .unwrap_or_else(|| LogLevel::infer(&data.message));
            let log = LogEvent {
                id: data
                    .id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| content_id(text)),
                timestamp: data.timestamp.as_ref().and_then(parse_timestamp),
                level,
                message: data.message,
                stage: data.stage,
            };
            Ok(PipelineEvent::LogAppended { pipeline_id, log })
        }
        "status" => {
            let data: StatusData = payload(&envelope)?;
            let pipeline_id = pipeline_id(&data.pipeline_id)?;
            let status = parse_status(&data.status)?;
            let mut entries = match data.jobs {
                None => Vec::new(),
                Some(JobsField::One(entry)) => vec![entry],
                Some(JobsField::Many(entries)) => entries,
            };
            if let Some(stage) = data.stage {
                entries.push(JobEntry::Name(stage));
            }
            let jobs = job_reports(entries, Some(status))?;
            Ok(PipelineEvent::StatusChanged {
                pipeline_id,
                status,
                jobs,
            })
        }
        "completed" => {
            let data: CompletedData = payload(&envelope)?;
            let status = if data.success {
                PipelineStatus::Success
            } else {
                PipelineStatus::Failed
            };
            Ok(PipelineEvent::StatusChanged {
                pipeline_id: pipeline_id(&data.pipeline_id)?,
                status,
                jobs: Vec::new(),
            })
        }
        other => Err(DecodeError::UnknownType(other.to_string())),
    }
}

fn payload<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> Result<T, DecodeError> {
    serde_json::from_value(envelope.data.clone()).map_err(|e| DecodeError::InvalidPayload {
        kind: envelope.kind.clone(),
        reason: e.to_string(),
    })
}

/// RFC 3339 strings or epoch milliseconds; anything else is dropped.
fn parse_timestamp(value: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    match value {
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&chrono::Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis),
        _ => None,
    }
}

// =============================================================================
// Legacy delimited messages
// =============================================================================

pub fn decode_legacy(channel: Channel, text: &str) -> Result<PipelineEvent, DecodeError> {
    let (id, rest) = text
        .split_once(SEPARATOR)
        .ok_or(DecodeError::NoSeparator)?;
    let pipeline_id = pipeline_id(id)?;
    let rest = rest.trim();

    match channel {
        Channel::Logs => {
            if rest.is_empty() {
                return Err(DecodeError::EmptyMessage);
            }
            let log = LogEvent {
                id: content_id(text),
                timestamp: None,
                level: LogLevel::infer(rest),
                message: rest.to_string(),
                stage: None,
            };
            Ok(PipelineEvent::LogAppended { pipeline_id, log })
        }
        Channel::Status => {
            let (status, jobs) = legacy_status(rest)?;
            Ok(PipelineEvent::StatusChanged {
                pipeline_id,
                status,
                jobs,
            })
        }
    }
}

/// `RUNNING`, `docker-build|RUNNING` or `[{"name": ..., "status": ...}]`.
fn legacy_status(rest: &str) -> Result<(PipelineStatus, Vec<JobReport>), DecodeError> {
    if rest.starts_with('[') {
        let entries: Vec<JobEntry> =
            serde_json::from_str(rest).map_err(|e| DecodeError::InvalidJobs(e.to_string()))?;
        let jobs = job_reports(entries, None)?;
        return Ok((derive_status(&jobs), jobs));
    }

    if let Some((name, status)) = rest.rsplit_once(SEPARATOR) {
        let name = name.trim();
        if name.is_empty() {
            return Err(DecodeError::InvalidJobs("empty job name".to_string()));
        }
        let job_status = parse_status(status)?;
        let status = if job_status == PipelineStatus::Failed {
            PipelineStatus::Failed
        } else {
            PipelineStatus::Running
        };
        let jobs = vec![JobReport {
            name: name.to_string(),
            status: job_status,
        }];
        return Ok((status, jobs));
    }

    Ok((parse_status(rest)?, Vec::new()))
}

/// Overall status implied by a job list alone.
fn derive_status(jobs: &[JobReport]) -> PipelineStatus {
    if jobs.iter().any(|j| j.status == PipelineStatus::Failed) {
        PipelineStatus::Failed
    } else if jobs.iter().any(|j| j.status != PipelineStatus::Pending) {
        PipelineStatus::Running
    } else {
        PipelineStatus::Pending
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

fn pipeline_id(raw: &str) -> Result<PipelineId, DecodeError> {
    let id = raw.trim();
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
    if valid {
        Ok(PipelineId::new(id))
    } else {
        Err(DecodeError::InvalidPipelineId(id.to_string()))
    }
}

fn parse_status(raw: &str) -> Result<PipelineStatus, DecodeError> {
    PipelineStatus::parse(raw).ok_or_else(|| DecodeError::UnknownStatus(raw.trim().to_string()))
}

/// Entries without a status take `inherited`; without one either, they are invalid.
fn job_reports(
    entries: Vec<JobEntry>,
    inherited: Option<PipelineStatus>,
) -> Result<Vec<JobReport>, DecodeError> {
    entries
        .into_iter()
        .map(|entry| {
            let (name, status) = match entry {
                JobEntry::Name(name) => (name, None),
                JobEntry::Report { name, status } => (name, status),
            };
            let status = match status {
                Some(raw) => parse_status(&raw)?,
                None => inherited
                    .ok_or_else(|| DecodeError::InvalidJobs(format!("job '{}' has no status", name)))?,
            };
            Ok(JobReport { name, status })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_event(raw: &str) -> PipelineEvent {
        normalize(Channel::Status, raw.as_bytes()).unwrap()
    }

    fn running(name: &str) -> JobReport {
        JobReport {
            name: name.to_string(),
            status: PipelineStatus::Running,
        }
    }

    #[test]
    fn test_structured_log() {
        let raw = r#"{"type":"log","data":{"pipelineId":"p1","id":"l-7","timestamp":"2025-01-10T08:30:00Z","level":"warn","message":"slow mirror","stage":"npm-install"}}"#;

        match normalize(Channel::Logs, raw.as_bytes()).unwrap() {
            PipelineEvent::LogAppended { pipeline_id, log } => {
                assert_eq!(pipeline_id.as_str(), "p1");
                assert_eq!(log.id, "l-7");
                assert_eq!(log.level, LogLevel::Warn);
                assert_eq!(log.stage.as_deref(), Some("npm-install"));
                assert!(log.timestamp.is_some());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_structured_log_without_id_is_deterministic() {
        let raw = r#"{"type":"log","data":{"pipeline_id":"p1","message":"build failed","timestamp":"10:55:01 AM"}}"#;

        let first = normalize(Channel::Logs, raw.as_bytes()).unwrap();
        let second = normalize(Channel::Logs, raw.as_bytes()).unwrap();
        assert_eq!(first, second);

        match first {
            PipelineEvent::LogAppended { log, .. } => {
                assert!(log.id.starts_with("log-"));
                assert_eq!(log.level, LogLevel::Error);
                assert_eq!(log.timestamp, None);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_legacy_log() {
        match normalize(Channel::Logs, b"p1|Cloning repository...").unwrap() {
            PipelineEvent::LogAppended { pipeline_id, log } => {
                assert_eq!(pipeline_id.as_str(), "p1");
                assert_eq!(log.message, "Cloning repository...");
                assert_eq!(log.level, LogLevel::Info);
                assert_eq!(log.id, content_id("p1|Cloning repository..."));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_legacy_log_keeps_separators_in_message() {
        match normalize(Channel::Logs, b"p1|a | b | c").unwrap() {
            PipelineEvent::LogAppended { log, .. } => assert_eq!(log.message, "a | b | c"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_completed_record() {
        let event = status_event(r#"{"type":"completed","data":{"pipelineId":"p1","success":false}}"#);
        assert_eq!(
            event,
            PipelineEvent::StatusChanged {
                pipeline_id: PipelineId::new("p1"),
                status: PipelineStatus::Failed,
                jobs: vec![],
            }
        );
    }

    #[test]
    fn test_jobs_field_shapes_normalize_alike() {
        let bare = status_event(
            r#"{"type":"status","data":{"pipelineId":"p1","status":"RUNNING","jobs":"docker-build"}}"#,
        );
        let list = status_event(
            r#"{"type":"status","data":{"pipelineId":"p1","status":"RUNNING","jobs":["docker-build"]}}"#,
        );
        let reports = status_event(
            r#"{"type":"status","data":{"pipelineId":"p1","status":"RUNNING","jobs":[{"name":"docker-build","status":"RUNNING"}]}}"#,
        );
        let stage = status_event(
            r#"{"type":"status","data":{"pipelineId":"p1","status":"RUNNING","stage":"docker-build"}}"#,
        );

        let expected = PipelineEvent::StatusChanged {
            pipeline_id: PipelineId::new("p1"),
            status: PipelineStatus::Running,
            jobs: vec![running("docker-build")],
        };
        assert_eq!(bare, expected);
        assert_eq!(list, expected);
        assert_eq!(reports, expected);
        assert_eq!(stage, expected);
    }

    #[test]
    fn test_structured_and_legacy_status_are_equivalent() {
        let pairs = [
            (
                r#"{"type":"status","data":{"pipelineId":"p1","status":"SUCCESS"}}"#,
                "p1|SUCCESS",
            ),
            (
                r#"{"type":"status","data":{"pipelineId":"p1","status":"RUNNING","jobs":"eslint"}}"#,
                "p1|eslint|RUNNING",
            ),
            (
                r#"{"type":"status","data":{"pipelineId":"p1","status":"FAILED","jobs":[{"name":"unit-tests","status":"FAILED"}]}}"#,
                "p1|unit-tests|failed",
            ),
            (
                r#"{"type":"status","data":{"pipelineId":"p1","status":"RUNNING","jobs":[{"name":"clone","status":"SUCCESS"},{"name":"npm-install","status":"RUNNING"}]}}"#,
                r#"p1|[{"name":"clone","status":"SUCCESS"},{"name":"npm-install","status":"RUNNING"}]"#,
            ),
        ];

        for (structured, legacy) in pairs {
            assert_eq!(status_event(structured), status_event(legacy), "{}", legacy);
        }
    }

    #[test]
    fn test_legacy_job_array_derives_status() {
        match status_event(r#"p1|[{"name":"lint","status":"PENDING"}]"#) {
            PipelineEvent::StatusChanged { status, .. } => {
                assert_eq!(status, PipelineStatus::Pending)
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match status_event(r#"p1|[{"name":"lint","status":"SUCCESS"},{"name":"tests","status":"FAILED"}]"#) {
            PipelineEvent::StatusChanged { status, .. } => {
                assert_eq!(status, PipelineStatus::Failed)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_messages_are_rejected_with_reasons() {
        let rejection = normalize(Channel::Logs, br#"{"type":"log","data":"#).unwrap_err();
        assert_eq!(rejection.reasons.len(), 2);
        assert_eq!(rejection.reasons[0].0, "structured");
        assert_eq!(rejection.reasons[1], ("legacy", DecodeError::NoSeparator));

        let rejection = normalize(Channel::Status, b"p1|HALFWAY").unwrap_err();
        assert_eq!(
            rejection.reasons[1],
            ("legacy", DecodeError::UnknownStatus("HALFWAY".to_string()))
        );
    }

    #[test]
    fn test_json_with_separator_is_not_a_pipeline_id() {
        let rejection =
            normalize(Channel::Logs, br#"{"type":"log","data":{"message":"a|b"}}"#).unwrap_err();
        assert!(matches!(
            rejection.reasons[1].1,
            DecodeError::InvalidPipelineId(_)
        ));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let rejection = normalize(Channel::Logs, &[0xff, 0xfe, b'|']).unwrap_err();
        assert_eq!(rejection.reasons, vec![("utf8", DecodeError::InvalidEncoding)]);
    }

    #[test]
    fn test_unknown_record_type() {
        let rejection =
            normalize(Channel::Status, br#"{"type":"heartbeat","data":{}}"#).unwrap_err();
        assert_eq!(
            rejection.reasons[0],
            ("structured", DecodeError::UnknownType("heartbeat".to_string()))
        );
    }
}
