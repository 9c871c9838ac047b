//! Ingest relay
//!
//! Pulls raw messages off the bus, normalizes them, and routes each canonical
//! event to the worker that owns its pipeline id. One worker per id keeps the
//! store single-writer per pipeline while different pipelines proceed in
//! parallel. Workers are spawned on demand and exit after sitting idle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use herald_core::domain::PipelineId;
use herald_core::event::PipelineEvent;
use herald_core::normalize::normalize;
use tokio::sync::mpsc::{self, error::SendError};
use tokio::task::JoinHandle;

use crate::bus::{BusSubscriber, Delivery};
use crate::service::sink::{PersistenceSink, SinkError, SinkOutcome};

const TRACING_TARGET: &str = "herald_server::service::ingest";

/// Time a worker waits for more work before exiting.
const WORKER_IDLE: Duration = Duration::from_secs(30);

/// Redelivery delay requested when persistence fails.
const NAK_DELAY: Duration = Duration::from_secs(1);

/// Pause after a receive error so a broken connection does not spin the loop.
const RECEIVE_BACKOFF: Duration = Duration::from_millis(500);

struct Work {
    event: PipelineEvent,
    delivery: Delivery,
}

struct Worker {
    tx: mpsc::UnboundedSender<Work>,
    handle: JoinHandle<()>,
}

pub struct Relay {
    sink: Arc<PersistenceSink>,
    workers: HashMap<PipelineId, Worker>,
    idle: Duration,
}

impl Relay {
    pub fn new(sink: Arc<PersistenceSink>) -> Self {
        Self {
            sink,
            workers: HashMap::new(),
            idle: WORKER_IDLE,
        }
    }

    #[cfg(test)]
    fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Runs until the bus closes. Failures on single messages never stop it.
    pub async fn run<S: BusSubscriber>(mut self, mut subscriber: S) {
        tracing::info!(target: TRACING_TARGET, "relay loop started");

        while let Some(next) = subscriber.next_delivery().await {
            match next {
                Ok(delivery) => self.route(delivery).await,
                Err(e) => {
                    tracing::error!(target: TRACING_TARGET, error = %e, "bus receive failed");
                    tokio::time::sleep(RECEIVE_BACKOFF).await;
                }
            }
        }

        tracing::info!(target: TRACING_TARGET, "bus closed, relay loop stopped");
    }

    async fn route(&mut self, delivery: Delivery) {
        let Some(channel) = delivery.channel() else {
            tracing::warn!(
                target: TRACING_TARGET,
                subject = %delivery.subject,
                "message on unknown channel dropped"
            );
            settle_ack(delivery).await;
            return;
        };

        match normalize(channel, &delivery.payload) {
            Ok(event) => self.dispatch(Work { event, delivery }),
            Err(rejection) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    channel = %channel,
                    payload = %String::from_utf8_lossy(&delivery.payload),
                    reasons = %rejection,
                    "malformed message dropped"
                );
                settle_ack(delivery).await;
            }
        }
    }

    fn dispatch(&mut self, work: Work) {
        let pipeline_id = work.event.pipeline_id().clone();

        let work = match self.workers.get(&pipeline_id) {
            Some(worker) => match worker.tx.send(work) {
                Ok(()) => return,
                // The worker went idle and closed its queue; start a new one.
                Err(SendError(work)) => work,
            },
            None => work,
        };

        // A closed worker may still be draining, so its replacement waits on it.
        let previous = self.workers.remove(&pipeline_id).map(|w| w.handle);
        self.workers.retain(|_, w| !w.handle.is_finished());

        let worker = spawn_worker(
            pipeline_id.clone(),
            Arc::clone(&self.sink),
            self.idle,
            previous,
        );
        if let Err(SendError(work)) = worker.tx.send(work) {
            tracing::error!(
                target: TRACING_TARGET,
                pipeline_id = %pipeline_id,
                "fresh worker rejected work"
            );
            tokio::spawn(settle_nak(work.delivery));
            return;
        }
        self.workers.insert(pipeline_id, worker);
    }

    #[cfg(test)]
    fn live_workers(&self) -> usize {
        self.workers.values().filter(|w| !w.tx.is_closed()).count()
    }
}

fn spawn_worker(
    pipeline_id: PipelineId,
    sink: Arc<PersistenceSink>,
    idle: Duration,
    previous: Option<JoinHandle<()>>,
) -> Worker {
    let (tx, mut rx) = mpsc::unbounded_channel::<Work>();

    let handle = tokio::spawn(async move {
        if let Some(previous) = previous {
            if let Err(e) = previous.await {
                tracing::error!(
                    target: TRACING_TARGET,
                    pipeline_id = %pipeline_id,
                    error = %e,
                    "previous worker did not finish cleanly"
                );
            }
        }
        tracing::debug!(target: TRACING_TARGET, pipeline_id = %pipeline_id, "worker started");

        loop {
            match tokio::time::timeout(idle, rx.recv()).await {
                Ok(Some(work)) => process(&sink, work).await,
                Ok(None) => break,
                Err(_) => {
                    // Refuse new work, then finish whatever raced in.
                    rx.close();
                    while let Ok(work) = rx.try_recv() {
                        process(&sink, work).await;
                    }
                    break;
                }
            }
        }

        tracing::debug!(target: TRACING_TARGET, pipeline_id = %pipeline_id, "worker idle, exiting");
    });

    Worker { tx, handle }
}

async fn process(sink: &PersistenceSink, work: Work) {
    let Work { event, delivery } = work;
    let pipeline_id = event.pipeline_id().clone();
    let kind = event.kind();

    match sink.apply(event).await {
        Ok(outcome) => {
            tracing::debug!(
                target: TRACING_TARGET,
                pipeline_id = %pipeline_id,
                kind,
                written = outcome == SinkOutcome::Written,
                "event applied"
            );
            settle_ack(delivery).await;
        }
        Err(SinkError::UnknownPipeline(_)) => {
            tracing::warn!(
                target: TRACING_TARGET,
                pipeline_id = %pipeline_id,
                kind,
                "event for unregistered pipeline, requesting redelivery"
            );
            settle_nak(delivery).await;
        }
        Err(e) => {
            tracing::error!(
                target: TRACING_TARGET,
                pipeline_id = %pipeline_id,
                kind,
                error = %e,
                "failed to persist event, requesting redelivery"
            );
            settle_nak(delivery).await;
        }
    }
}

async fn settle_ack(delivery: Delivery) {
    if let Err(e) = delivery.ack().await {
        tracing::error!(target: TRACING_TARGET, error = %e, "failed to ack message");
    }
}

async fn settle_nak(delivery: Delivery) {
    if let Err(e) = delivery.nak(NAK_DELAY).await {
        tracing::error!(target: TRACING_TARGET, error = %e, "failed to nak message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusPublisher, Settlement};
    use crate::bus::memory::MemoryBus;
    use crate::repository::PipelineStore;
    use crate::repository::memory::InMemoryStore;
    use crate::service::dispatcher::BroadcastDispatcher;
    use crate::service::dispatcher::testing::RecordingPort;
    use chrono::Utc;
    use herald_core::domain::ProjectId;
    use herald_core::domain::pipeline::{Pipeline, PipelineStatus};
    use herald_core::event::Channel;
    use herald_core::template::{FIVE_STAGE, SEVEN_STAGE, TemplateRegistry, TemplateVersion};

    struct Harness {
        store: Arc<InMemoryStore>,
        port: Arc<RecordingPort>,
        bus: MemoryBus,
    }

    async fn start(pipelines: &[(&str, TemplateVersion)], idle: Duration) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        for (id, version) in pipelines {
            store
                .insert(&Pipeline::new(
                    PipelineId::new(*id),
                    ProjectId::new("proj"),
                    *version,
                    Utc::now(),
                ))
                .await
                .unwrap();
        }
        let port = Arc::new(RecordingPort::default());
        let templates = Arc::new(TemplateRegistry::builtin().unwrap());
        let dispatcher = BroadcastDispatcher::new(port.clone(), templates.clone());
        let sink = Arc::new(PersistenceSink::new(store.clone(), templates, dispatcher));

        let (bus, subscriber) = MemoryBus::new();
        tokio::spawn(Relay::new(sink).with_idle(idle).run(subscriber));
        Harness { store, port, bus }
    }

    async fn send(h: &Harness, channel: Channel, payload: &str) -> Settlement {
        h.bus
            .publish_tracked(channel, payload.as_bytes().to_vec())
            .unwrap()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_malformed_message_is_acked_and_next_one_applied() {
        let h = start(&[("p1", FIVE_STAGE)], WORKER_IDLE).await;

        assert_eq!(send(&h, Channel::Logs, "{not json").await, Settlement::Ack);
        assert_eq!(send(&h, Channel::Logs, "p1|Cloning repository").await, Settlement::Ack);

        let stored = h.store.find(&PipelineId::new("p1")).await.unwrap().unwrap();
        assert_eq!(stored.logs.len(), 1);
        assert_eq!(stored.logs[0].message, "Cloning repository");
        assert_eq!(h.port.kinds(), vec!["log-appended"]);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_acked() {
        let h = start(&[], WORKER_IDLE).await;
        let settled = h
            .bus
            .publish_raw("runner.heartbeat", b"p1|alive".to_vec())
            .unwrap()
            .await
            .unwrap();
        assert_eq!(settled, Settlement::Ack);
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_nakked() {
        let h = start(&[], WORKER_IDLE).await;
        assert_eq!(send(&h, Channel::Status, "ghost|RUNNING").await, Settlement::Nak);
    }

    #[tokio::test]
    async fn test_formats_converge_on_the_same_state() {
        let h = start(&[("p1", SEVEN_STAGE)], WORKER_IDLE).await;

        send(&h, Channel::Status, "p1|NPM-LINT|RUNNING").await;
        send(
            &h,
            Channel::Status,
            r#"{"type":"status","data":{"pipelineId":"p1","status":"RUNNING","jobs":[{"name":"eslint","status":"RUNNING"}]}}"#,
        )
        .await;

        let stored = h.store.find_state(&PipelineId::new("p1")).await.unwrap().unwrap();
        assert_eq!(stored.status, PipelineStatus::Running);
        assert_eq!(stored.current_stage, Some(2));
        // The second report changed nothing, so only one stage event went out.
        assert_eq!(h.port.kinds(), vec!["stage-status-changed"]);
    }

    #[tokio::test]
    async fn test_redelivered_sequence_converges() {
        let h = start(&[("p1", FIVE_STAGE)], WORKER_IDLE).await;
        let sequence = [
            (Channel::Status, "p1|git-clone|RUNNING"),
            (Channel::Logs, "p1|cloned"),
            (Channel::Status, "p1|docker-build|RUNNING"),
            (Channel::Status, "p1|SUCCESS"),
        ];

        for (channel, payload) in sequence.iter().chain(sequence.iter()) {
            send(&h, *channel, payload).await;
        }

        let stored = h.store.find(&PipelineId::new("p1")).await.unwrap().unwrap();
        assert_eq!(stored.status, PipelineStatus::Success);
        assert_eq!(stored.current_stage, Some(4));
        assert_eq!(stored.logs.len(), 1);
        assert_eq!(
            h.port.kinds(),
            vec![
                "stage-status-changed",
                "log-appended",
                "stage-status-changed",
                "pipeline-terminal"
            ]
        );
    }

    #[tokio::test]
    async fn test_idle_worker_exits_and_is_respawned() {
        let h = start(&[("p1", FIVE_STAGE)], Duration::from_millis(20)).await;

        assert_eq!(send(&h, Channel::Logs, "p1|first").await, Settlement::Ack);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(send(&h, Channel::Logs, "p1|second").await, Settlement::Ack);

        let stored = h.store.find(&PipelineId::new("p1")).await.unwrap().unwrap();
        assert_eq!(stored.logs.len(), 2);
    }

    #[tokio::test]
    async fn test_workers_are_per_pipeline() {
        let store = Arc::new(InMemoryStore::new());
        for id in ["a", "b"] {
            store
                .insert(&Pipeline::new(
                    PipelineId::new(id),
                    ProjectId::new("proj"),
                    FIVE_STAGE,
                    Utc::now(),
                ))
                .await
                .unwrap();
        }
        let templates = Arc::new(TemplateRegistry::builtin().unwrap());
        let dispatcher =
            BroadcastDispatcher::new(Arc::new(RecordingPort::default()), templates.clone());
        let sink = Arc::new(PersistenceSink::new(store, templates, dispatcher));
        let mut relay = Relay::new(sink);

        let (bus, mut subscriber) = MemoryBus::new();
        bus.publish(Channel::Logs, b"a|one".to_vec()).await.unwrap();
        bus.publish(Channel::Logs, b"b|one".to_vec()).await.unwrap();
        bus.publish(Channel::Logs, b"a|two".to_vec()).await.unwrap();

        for _ in 0..3 {
            let delivery = subscriber.next_delivery().await.unwrap().unwrap();
            relay.route(delivery).await;
        }
        assert_eq!(relay.live_workers(), 2);
    }

    #[tokio::test]
    async fn test_replacement_worker_waits_for_draining_predecessor() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert(&Pipeline::new(
                PipelineId::new("a"),
                ProjectId::new("proj"),
                FIVE_STAGE,
                Utc::now(),
            ))
            .await
            .unwrap();
        let templates = Arc::new(TemplateRegistry::builtin().unwrap());
        let dispatcher =
            BroadcastDispatcher::new(Arc::new(RecordingPort::default()), templates.clone());
        let sink = Arc::new(PersistenceSink::new(store.clone(), templates, dispatcher));

        let (bus, mut subscriber) = MemoryBus::new();
        let settled = bus.publish_tracked(Channel::Logs, b"a|late".to_vec()).unwrap();
        let delivery = subscriber.next_delivery().await.unwrap().unwrap();
        let event = normalize(Channel::Logs, &delivery.payload).unwrap();

        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        let previous = tokio::spawn(async move {
            let _ = gate.await;
        });
        let worker = spawn_worker(PipelineId::new("a"), sink, WORKER_IDLE, Some(previous));
        assert!(worker.tx.send(Work { event, delivery }).is_ok());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let stored = store.find(&PipelineId::new("a")).await.unwrap().unwrap();
        assert!(stored.logs.is_empty());

        release.send(()).unwrap();
        assert_eq!(settled.await.unwrap(), Settlement::Ack);
        let stored = store.find(&PipelineId::new("a")).await.unwrap().unwrap();
        assert_eq!(stored.logs.len(), 1);
    }
}
