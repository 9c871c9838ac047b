use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use herald_core::template::TemplateRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod broadcast;
pub mod bus;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;

use crate::broadcast::ProjectChannels;
use crate::bus::BusPublisher;
use crate::bus::memory::MemoryBus;
use crate::bus::nats::{NatsBus, NatsSettings};
use crate::config::Config;
use crate::repository::memory::InMemoryStore;
use crate::repository::{PgStore, PipelineStore, ProjectStore};
use crate::service::dispatcher::BroadcastDispatcher;
use crate::service::ingest::Relay;
use crate::service::sink::PersistenceSink;
use crate::service::trigger::{
    HttpRunnerHandoff, RunnerHandoff, TriggerService, UnconfiguredRunner,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate()?;

    tracing::info!("Starting Herald relay...");

    let (pipelines, projects): (Arc<dyn PipelineStore>, Arc<dyn ProjectStore>) =
        match &config.database_url {
            Some(database_url) => {
                tracing::info!("Connecting to database...");

                let pool = db::create_pool(database_url)
                    .await
                    .context("Failed to create database pool")?;
                db::run_migrations(&pool)
                    .await
                    .context("Failed to run database migrations")?;

                let store = PgStore::new(pool);
                (Arc::new(store.clone()), Arc::new(store))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, pipelines are kept in memory");
                let store = InMemoryStore::new();
                (Arc::new(store.clone()), Arc::new(store))
            }
        };

    let templates = Arc::new(TemplateRegistry::builtin().context("Invalid stage templates")?);
    let channels = Arc::new(ProjectChannels::new(config.broadcast_capacity));
    let dispatcher = BroadcastDispatcher::new(channels.clone(), templates.clone());
    let sink = Arc::new(PersistenceSink::new(
        pipelines.clone(),
        templates.clone(),
        dispatcher.clone(),
    ));

    let publisher: Arc<dyn BusPublisher> = match &config.nats_url {
        Some(url) => {
            tracing::info!("Connecting to NATS at {}", url);

            let bus = NatsBus::connect(NatsSettings {
                url: url.clone(),
                stream: config.stream.clone(),
                subject_prefix: config.subject_prefix.clone(),
                consumer: config.consumer.clone(),
            })
            .await
            .context("Failed to connect to the event bus")?;
            let subscriber = bus
                .subscribe()
                .await
                .context("Failed to subscribe to the event bus")?;

            tokio::spawn(Relay::new(sink).run(subscriber));
            Arc::new(bus)
        }
        None => {
            tracing::warn!("NATS_URL not set, using the in-process bus");
            let (bus, subscriber) = MemoryBus::new();
            tokio::spawn(Relay::new(sink).run(subscriber));
            Arc::new(bus)
        }
    };

    let runner: Arc<dyn RunnerHandoff> = match &config.runner_url {
        Some(url) => Arc::new(
            HttpRunnerHandoff::new(url.clone(), config.runner_timeout())
                .context("Failed to build runner client")?,
        ),
        None => {
            tracing::warn!("PIPELINE_RUNNER_URL not set, triggers will fail");
            Arc::new(UnconfiguredRunner)
        }
    };

    let triggers = TriggerService::new(
        projects.clone(),
        pipelines.clone(),
        runner,
        dispatcher,
        config.attribution_window(),
    );

    // Build router with all API endpoints
    let app = api::create_router(api::AppState {
        pipelines,
        projects,
        templates,
        channels,
        triggers: Arc::new(triggers),
        publisher,
        default_template: config.default_template(),
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Server terminated")?;

    Ok(())
}
