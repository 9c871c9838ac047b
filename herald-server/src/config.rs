//! Server configuration
//!
//! Every setting can be passed as a flag or through the environment. Optional
//! backends fall back to in-process implementations so the relay runs without
//! Postgres or NATS during development.

use std::time::Duration;

use clap::Parser;
use herald_core::template::TemplateVersion;

/// Relay server configuration
#[derive(Debug, Clone, Parser)]
#[command(name = "herald-server", version, about = "Pipeline event relay")]
pub struct Config {
    /// Postgres connection string; the in-memory store is used when absent
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Address the HTTP server listens on
    #[arg(long, env = "HERALD_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// NATS server; the in-memory bus is used when absent
    #[arg(long, env = "NATS_URL")]
    pub nats_url: Option<String>,

    /// JetStream stream holding runner events
    #[arg(long, env = "HERALD_STREAM", default_value = "PIPELINE_EVENTS")]
    pub stream: String,

    /// Subject prefix the runner publishes under (`<prefix>.pipeline-logs`)
    #[arg(long, env = "HERALD_SUBJECT_PREFIX", default_value = "runner")]
    pub subject_prefix: String,

    /// Durable consumer name
    #[arg(long, env = "HERALD_CONSUMER", default_value = "herald-relay")]
    pub consumer: String,

    /// Runner hand-off endpoint for triggers
    #[arg(long, env = "PIPELINE_RUNNER_URL")]
    pub runner_url: Option<String>,

    /// Hand-off request timeout, in seconds
    #[arg(long, env = "HERALD_RUNNER_TIMEOUT_SECS", default_value_t = 10)]
    pub runner_timeout_secs: u64,

    /// How far back a trigger may adopt an unattributed pipeline, in seconds
    #[arg(long, env = "HERALD_ATTRIBUTION_WINDOW_SECS", default_value_t = 5)]
    pub attribution_window_secs: u64,

    /// Per-project observer channel capacity
    #[arg(long, env = "HERALD_BROADCAST_CAPACITY", default_value_t = 100)]
    pub broadcast_capacity: usize,

    /// Stage template assigned to projects registered without one
    #[arg(long, env = "HERALD_DEFAULT_TEMPLATE", default_value_t = 1)]
    pub default_template: u32,
}

impl Config {
    pub fn runner_timeout(&self) -> Duration {
        Duration::from_secs(self.runner_timeout_secs)
    }

    pub fn attribution_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.attribution_window_secs as i64)
    }

    pub fn default_template(&self) -> TemplateVersion {
        TemplateVersion(self.default_template)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.trim().is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.subject_prefix.is_empty() || self.subject_prefix.contains(['*', '>', ' ']) {
            anyhow::bail!("subject_prefix must be a plain NATS subject token");
        }

        if let Some(url) = &self.runner_url
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            anyhow::bail!("runner_url must start with http:// or https://");
        }

        if self.runner_timeout_secs == 0 {
            anyhow::bail!("runner_timeout_secs must be greater than 0");
        }

        if self.attribution_window_secs == 0 {
            anyhow::bail!("attribution_window_secs must be greater than 0");
        }

        if self.broadcast_capacity == 0 {
            anyhow::bail!("broadcast_capacity must be greater than 0");
        }

        Ok(())
    }
}
