//! Observer WebSocket
//!
//! Each connection subscribes to one project's broadcast channel and runs two
//! tasks joined with `tokio::select!`:
//! - the sender forwards every observer event as a JSON text frame,
//! - the receiver watches for the client closing the socket.
//!
//! When either side finishes the other is aborted. Protocol-level ping/pong is
//! answered by axum.

use std::ops::ControlFlow;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use herald_core::domain::ProjectId;
use herald_core::dto::observer::ObserverEvent;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::api::AppState;
use crate::broadcast::ProjectChannels;

const TRACING_TARGET: &str = "herald_server::api::ws";

/// GET /ws/projects/{id}
pub async fn project_socket(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, project_id, state.channels))
}

async fn handle_socket(socket: WebSocket, project_id: ProjectId, channels: Arc<ProjectChannels>) {
    let connection_id = Uuid::new_v4();
    let mut rx = channels.subscribe(&project_id);

    tracing::info!(
        target: TRACING_TARGET,
        connection_id = %connection_id,
        project_id = %project_id,
        "observer connected"
    );

    let (mut sender, mut receiver) = socket.split();

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if process_message(connection_id, message).is_break() {
                break;
            }
        }
    });

    let send_project = project_id.clone();
    let mut send_task = tokio::spawn(async move {
        let mut sent = 0u64;
        while let Some(event) = next_event(&mut rx, &send_project).await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(
                        target: TRACING_TARGET,
                        connection_id = %connection_id,
                        error = %e,
                        "failed to serialize observer event"
                    );
                    continue;
                }
            };

            if sender.send(Message::Text(text.into())).await.is_err() {
                tracing::debug!(
                    target: TRACING_TARGET,
                    connection_id = %connection_id,
                    "observer went away"
                );
                break;
            }
            sent += 1;
        }
        sent
    });

    tokio::select! {
        _ = (&mut recv_task) => send_task.abort(),
        sent = (&mut send_task) => {
            if let Ok(sent) = sent {
                tracing::debug!(
                    target: TRACING_TARGET,
                    connection_id = %connection_id,
                    events_sent = sent,
                    "send task completed"
                );
            }
            recv_task.abort();
        }
    }

    tracing::info!(
        target: TRACING_TARGET,
        connection_id = %connection_id,
        project_id = %project_id,
        "observer disconnected"
    );
}

/// Next event for an observer, or `None` once the channel is gone.
///
/// Lagging turns into a `resync-required` event so the observer can bootstrap
/// again; the stream keeps going.
async fn next_event(
    rx: &mut broadcast::Receiver<ObserverEvent>,
    project_id: &ProjectId,
) -> Option<ObserverEvent> {
    match rx.recv().await {
        Ok(event) => Some(event),
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::warn!(
                target: TRACING_TARGET,
                project_id = %project_id,
                skipped,
                "observer lagged behind, asking it to resync"
            );
            Some(ObserverEvent::ResyncRequired {
                project_id: project_id.clone(),
                skipped,
            })
        }
        Err(broadcast::error::RecvError::Closed) => None,
    }
}

/// Observers only listen; anything but a close frame is ignored.
fn process_message(connection_id: Uuid, message: Message) -> ControlFlow<()> {
    match message {
        Message::Close(frame) => {
            tracing::debug!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                close_code = frame.as_ref().map(|f| f.code),
                "observer sent close frame"
            );
            ControlFlow::Break(())
        }
        Message::Text(_) | Message::Binary(_) => {
            tracing::trace!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                "ignoring message from observer"
            );
            ControlFlow::Continue(())
        }
        Message::Ping(_) | Message::Pong(_) => ControlFlow::Continue(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastPort;
    use herald_core::domain::PipelineId;

    fn started(project: &str, pipeline: &str) -> ObserverEvent {
        ObserverEvent::PipelineStarted {
            project_id: ProjectId::new(project),
            pipeline_id: Some(PipelineId::new(pipeline)),
        }
    }

    #[tokio::test]
    async fn test_lag_becomes_resync_and_stream_continues() {
        let channels = ProjectChannels::new(2);
        let project = ProjectId::new("shop");
        let mut rx = channels.subscribe(&project);

        for i in 0..5 {
            channels.publish(started("shop", &format!("run-{}", i)));
        }

        assert_eq!(
            next_event(&mut rx, &project).await,
            Some(ObserverEvent::ResyncRequired {
                project_id: project.clone(),
                skipped: 3
            })
        );
        assert_eq!(next_event(&mut rx, &project).await, Some(started("shop", "run-3")));
        assert_eq!(next_event(&mut rx, &project).await, Some(started("shop", "run-4")));
    }

    #[tokio::test]
    async fn test_closed_channel_ends_stream() {
        let (tx, mut rx) = broadcast::channel::<ObserverEvent>(4);
        drop(tx);
        assert_eq!(next_event(&mut rx, &ProjectId::new("shop")).await, None);
    }

    #[test]
    fn test_close_frame_ends_session() {
        let id = Uuid::new_v4();
        assert!(process_message(id, Message::Close(None)).is_break());
        assert!(process_message(id, Message::Text("hello".into())).is_continue());
        assert!(process_message(id, Message::Ping(Vec::new().into())).is_continue());
    }

    #[test]
    fn test_frame_shape() {
        let text = serde_json::to_value(ObserverEvent::ResyncRequired {
            project_id: ProjectId::new("shop"),
            skipped: 7,
        })
        .unwrap();
        assert_eq!(
            text,
            serde_json::json!({ "type": "resync-required", "projectId": "shop", "skipped": 7 })
        );
    }
}
