//! In-process bus
//!
//! Used when no NATS server is configured, and by tests. Settlements are reported
//! back to the publisher when it asks for them; nothing is redelivered.

use async_trait::async_trait;
use herald_core::event::Channel;
use tokio::sync::{mpsc, oneshot};

use super::{BusError, BusPublisher, BusResult, BusSubscriber, Delivery, Settlement, subject};

const PREFIX: &str = "local";

#[derive(Debug, Clone)]
pub struct MemoryBus {
    tx: mpsc::UnboundedSender<Delivery>,
}

pub struct MemorySubscriber {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl MemoryBus {
    pub fn new() -> (Self, MemorySubscriber) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, MemorySubscriber { rx })
    }

    /// Publish and get notified of how the relay settled the message.
    pub fn publish_tracked(
        &self,
        channel: Channel,
        payload: impl Into<Vec<u8>>,
    ) -> BusResult<oneshot::Receiver<Settlement>> {
        let (settled_tx, settled_rx) = oneshot::channel();
        self.send(subject(PREFIX, channel), payload.into(), Some(settled_tx))?;
        Ok(settled_rx)
    }

    /// Publish on an arbitrary subject, including ones that map to no channel.
    pub fn publish_raw(
        &self,
        subject: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> BusResult<oneshot::Receiver<Settlement>> {
        let (settled_tx, settled_rx) = oneshot::channel();
        self.send(subject.into(), payload.into(), Some(settled_tx))?;
        Ok(settled_rx)
    }

    fn send(
        &self,
        subject: String,
        payload: Vec<u8>,
        settled: Option<oneshot::Sender<Settlement>>,
    ) -> BusResult<()> {
        self.tx
            .send(Delivery::local(subject, payload, settled))
            .map_err(|_| BusError::Closed)
    }
}

#[async_trait]
impl BusPublisher for MemoryBus {
    async fn publish(&self, channel: Channel, payload: Vec<u8>) -> BusResult<()> {
        self.send(subject(PREFIX, channel), payload, None)
    }
}

#[async_trait]
impl BusSubscriber for MemorySubscriber {
    async fn next_delivery(&mut self) -> Option<BusResult<Delivery>> {
        self.rx.recv().await.map(Ok)
    }
}
