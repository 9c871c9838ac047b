//! Runner Event Intake
//!
//! Runners that cannot reach the bus post their raw messages here. The body is
//! published unchanged; decoding happens in the relay like for any other
//! delivery, so a malformed body is still accepted.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use herald_core::event::Channel;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /api/events/{channel}
pub async fn publish_event(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let channel = Channel::from_subject(&channel).ok_or_else(|| {
        ApiError::NotFound(format!(
            "Unknown channel '{}', expected {} or {}",
            channel,
            Channel::Logs,
            Channel::Status
        ))
    })?;

    tracing::debug!(channel = %channel, size = body.len(), "Publishing runner event");

    state.publisher.publish(channel, body.to_vec()).await?;
    Ok(StatusCode::ACCEPTED)
}
