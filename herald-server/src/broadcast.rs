//! Observer fan-out
//!
//! One `tokio::sync::broadcast` channel per project, created when the first
//! observer subscribes. Publishing never waits: with no subscribers the event is
//! dropped, and a subscriber that falls more than `capacity` events behind loses
//! the oldest ones and learns about it through `RecvError::Lagged`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use herald_core::domain::ProjectId;
use herald_core::dto::observer::ObserverEvent;
use tokio::sync::broadcast;

const TRACING_TARGET: &str = "herald_server::broadcast";

/// Outbound port for observer events.
///
/// Implementations must return immediately; ingestion calls this inline.
pub trait BroadcastPort: Send + Sync {
    fn publish(&self, event: ObserverEvent);
}

/// Per-project broadcast channels
#[derive(Debug)]
pub struct ProjectChannels {
    capacity: usize,
    channels: RwLock<HashMap<ProjectId, broadcast::Sender<ObserverEvent>>>,
}

impl ProjectChannels {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to a project's events, creating its channel if needed.
    pub fn subscribe(&self, project_id: &ProjectId) -> broadcast::Receiver<ObserverEvent> {
        {
            let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(sender) = channels.get(project_id) {
                return sender.subscribe();
            }
        }

        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        // Another subscriber may have created it in between.
        if let Some(sender) = channels.get(project_id) {
            return sender.subscribe();
        }

        let (sender, receiver) = broadcast::channel(self.capacity);
        channels.insert(project_id.clone(), sender);

        tracing::debug!(
            target: TRACING_TARGET,
            project_id = %project_id,
            "created broadcast channel for project"
        );

        receiver
    }

    pub fn subscriber_count(&self, project_id: &ProjectId) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Drop the channel of a project nobody observes anymore.
    fn prune(&self, project_id: &ProjectId) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        if channels
            .get(project_id)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(project_id);
            tracing::debug!(
                target: TRACING_TARGET,
                project_id = %project_id,
                "removed idle broadcast channel"
            );
        }
    }
}

impl BroadcastPort for ProjectChannels {
    fn publish(&self, event: ObserverEvent) {
        let project_id = event.project_id().clone();
        let kind = event.kind();

        let sender = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&project_id)
            .cloned();

        let Some(sender) = sender else {
            tracing::trace!(
                target: TRACING_TARGET,
                project_id = %project_id,
                kind,
                "no observers for project"
            );
            return;
        };

        match sender.send(event) {
            Ok(receivers) => tracing::trace!(
                target: TRACING_TARGET,
                project_id = %project_id,
                kind,
                receivers,
                "published observer event"
            ),
            Err(_) => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    project_id = %project_id,
                    kind,
                    "failed to broadcast event (no receivers)"
                );
                self.prune(&project_id);
            }
        }
    }
}
