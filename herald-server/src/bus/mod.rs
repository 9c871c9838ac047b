//! Event bus
//!
//! Runners publish raw messages on two logical channels. The relay pulls them
//! through a [`BusSubscriber`] and settles every [`Delivery`] exactly once:
//! `ack` when it was persisted or dropped as malformed, `nak` when persistence
//! failed and the bus should redeliver.

pub mod memory;
pub mod nats;

use std::time::Duration;

use async_trait::async_trait;
use herald_core::event::Channel;
use tokio::sync::oneshot;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("jetstream setup failed: {0}")]
    Setup(String),

    #[error("failed to receive message: {0}")]
    Receive(String),

    #[error("failed to publish message: {0}")]
    Publish(String),

    #[error("failed to settle message: {0}")]
    Settle(String),

    #[error("bus closed")]
    Closed,
}

pub type BusResult<T> = Result<T, BusError>;

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    Nak,
}

/// One raw message, pending settlement.
pub struct Delivery {
    pub subject: String,
    pub payload: Vec<u8>,
    handle: SettleHandle,
}

enum SettleHandle {
    Jetstream(Box<async_nats::jetstream::Message>),
    Local(Option<oneshot::Sender<Settlement>>),
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.subject)
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

impl Delivery {
    pub(crate) fn jetstream(message: async_nats::jetstream::Message) -> Self {
        Self {
            subject: message.subject.to_string(),
            payload: message.payload.to_vec(),
            handle: SettleHandle::Jetstream(Box::new(message)),
        }
    }

    pub(crate) fn local(
        subject: String,
        payload: Vec<u8>,
        settled: Option<oneshot::Sender<Settlement>>,
    ) -> Self {
        Self {
            subject,
            payload,
            handle: SettleHandle::Local(settled),
        }
    }

    /// Logical channel, from the last subject token.
    pub fn channel(&self) -> Option<Channel> {
        Channel::from_subject(&self.subject)
    }

    pub async fn ack(self) -> BusResult<()> {
        match self.handle {
            SettleHandle::Jetstream(message) => message
                .ack()
                .await
                .map_err(|e| BusError::Settle(e.to_string())),
            SettleHandle::Local(settled) => {
                report(settled, Settlement::Ack);
                Ok(())
            }
        }
    }

    /// Ask for redelivery after `delay`.
    pub async fn nak(self, delay: Duration) -> BusResult<()> {
        match self.handle {
            SettleHandle::Jetstream(message) => message
                .ack_with(async_nats::jetstream::AckKind::Nak(Some(delay)))
                .await
                .map_err(|e| BusError::Settle(e.to_string())),
            SettleHandle::Local(settled) => {
                report(settled, Settlement::Nak);
                Ok(())
            }
        }
    }
}

fn report(settled: Option<oneshot::Sender<Settlement>>, settlement: Settlement) {
    if let Some(tx) = settled {
        // The publisher may have stopped waiting.
        let _ = tx.send(settlement);
    }
}

/// Source of deliveries for the relay loop.
#[async_trait]
pub trait BusSubscriber: Send {
    /// Next delivery; `None` once the bus is closed.
    async fn next_delivery(&mut self) -> Option<BusResult<Delivery>>;
}

/// Publishing side, used by the HTTP event intake.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    async fn publish(&self, channel: Channel, payload: Vec<u8>) -> BusResult<()>;
}

/// Subject a channel is carried on.
pub fn subject(prefix: &str, channel: Channel) -> String {
    format!("{}.{}", prefix, channel.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_round_trips_to_channel() {
        for channel in Channel::ALL {
            let delivery = Delivery::local(subject("runner", channel), Vec::new(), None);
            assert_eq!(delivery.channel(), Some(channel));
        }
    }

    #[tokio::test]
    async fn test_local_settlement_is_reported() {
        let (tx, rx) = oneshot::channel();
        let delivery = Delivery::local("runner.pipeline-logs".to_string(), Vec::new(), Some(tx));
        delivery.nak(Duration::from_millis(10)).await.unwrap();
        assert_eq!(rx.await.unwrap(), Settlement::Nak);
    }
}
