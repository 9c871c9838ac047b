//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod deploy;
mod pipeline;
mod project;

pub use pipeline::PipelineCommands;
pub use project::ProjectCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Project registration
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Pipeline history and details
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Show the live state of a project: stage timeline, recent logs and stats
    Status {
        /// Project ID
        project: String,

        /// Number of log lines to show per active pipeline
        #[arg(short, long, default_value = "10")]
        lines: usize,
    },
    /// Trigger a deployment
    Trigger {
        /// Project ID
        project: String,

        /// Commit to deploy (defaults to the branch head)
        #[arg(short, long)]
        commit: Option<String>,

        /// Author recorded on the pipeline
        #[arg(short, long)]
        author: Option<String>,
    },
    /// Redeploy a commit that succeeded before
    Rollback {
        /// Project ID
        project: String,

        /// Commit to roll back to (defaults to the one before the current deployment)
        #[arg(short, long)]
        commit: Option<String>,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Project { command } => project::handle_project_command(command, config).await,
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
        Commands::Status { project, lines } => deploy::status(config, &project, lines).await,
        Commands::Trigger {
            project,
            commit,
            author,
        } => deploy::trigger(config, &project, commit, author).await,
        Commands::Rollback { project, commit } => deploy::rollback(config, &project, commit).await,
    }
}
