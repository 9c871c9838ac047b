//! Herald CLI
//!
//! Command-line interface for the Herald pipeline relay.

mod commands;
mod config;
mod render;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Herald deployment pipeline CLI", long_about = None)]
struct Cli {
    /// Relay URL
    #[arg(long, env = "HERALD_SERVER_URL", default_value = "http://localhost:8080")]
    server_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        server_url: cli.server_url,
    };

    handle_command(cli.command, &config).await
}
