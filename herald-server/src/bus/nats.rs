//! NATS JetStream bus
//!
//! Runner messages land on `<prefix>.pipeline-logs` and `<prefix>.pipeline-status`,
//! captured by one stream. The relay reads through a durable pull consumer with
//! explicit acks, so a message is redelivered until the relay settles it.

use std::time::Duration;

use async_nats::jetstream::{self, Context, consumer::pull};
use async_trait::async_trait;
use futures::StreamExt;
use herald_core::event::Channel;

use super::{BusError, BusPublisher, BusResult, BusSubscriber, Delivery, subject};

const TRACING_TARGET: &str = "herald_server::bus::nats";

/// How long JetStream waits for a settlement before redelivering on its own.
const ACK_WAIT: Duration = Duration::from_secs(30);

const MAX_ACK_PENDING: i64 = 1_000;

#[derive(Debug, Clone)]
pub struct NatsSettings {
    pub url: String,
    pub stream: String,
    pub subject_prefix: String,
    pub consumer: String,
}

/// Connected JetStream context plus the stream runner events are captured in.
#[derive(Clone)]
pub struct NatsBus {
    settings: NatsSettings,
    jetstream: Context,
}

impl NatsBus {
    /// Connect and make sure the stream exists.
    pub async fn connect(settings: NatsSettings) -> BusResult<Self> {
        let client = async_nats::connect(&settings.url)
            .await
            .map_err(|e| BusError::Connect {
                url: settings.url.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(target: TRACING_TARGET, url = %settings.url, "connected to NATS");

        let jetstream = jetstream::new(client);
        jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: settings.stream.clone(),
                subjects: Channel::ALL
                    .iter()
                    .map(|c| subject(&settings.subject_prefix, *c))
                    .collect(),
                storage: jetstream::stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Setup(format!("failed to create stream: {e}")))?;

        tracing::info!(target: TRACING_TARGET, stream = %settings.stream, "stream ready");

        Ok(Self {
            settings,
            jetstream,
        })
    }

    /// Attach to the durable consumer, creating it on first start.
    pub async fn subscribe(&self) -> BusResult<NatsSubscriber> {
        let stream = self
            .jetstream
            .get_stream(&self.settings.stream)
            .await
            .map_err(|e| BusError::Setup(format!("failed to open stream: {e}")))?;

        let consumer: jetstream::consumer::Consumer<pull::Config> = stream
            .get_or_create_consumer(
                &self.settings.consumer,
                pull::Config {
                    durable_name: Some(self.settings.consumer.clone()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ack_wait: ACK_WAIT,
                    max_ack_pending: MAX_ACK_PENDING,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Setup(format!("failed to create consumer: {e}")))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| BusError::Setup(format!("failed to open message stream: {e}")))?;

        tracing::info!(
            target: TRACING_TARGET,
            consumer = %self.settings.consumer,
            "durable consumer attached"
        );

        Ok(NatsSubscriber { messages })
    }
}

#[async_trait]
impl BusPublisher for NatsBus {
    async fn publish(&self, channel: Channel, payload: Vec<u8>) -> BusResult<()> {
        let subject = subject(&self.settings.subject_prefix, channel);
        self.jetstream
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;

        tracing::debug!(target: TRACING_TARGET, subject = %subject, "published message");
        Ok(())
    }
}

pub struct NatsSubscriber {
    messages: pull::Stream,
}

#[async_trait]
impl BusSubscriber for NatsSubscriber {
    async fn next_delivery(&mut self) -> Option<BusResult<Delivery>> {
        let next = self.messages.next().await?;
        Some(
            next.map(Delivery::jetstream)
                .map_err(|e| BusError::Receive(e.to_string())),
        )
    }
}
