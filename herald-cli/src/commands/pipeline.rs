//! Pipeline command handlers
//!
//! Deployment history of a project and the details of single pipelines.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use herald_client::HeraldClient;
use herald_core::domain::pipeline::Pipeline;
use herald_core::domain::{PipelineId, ProjectId};

use crate::config::Config;
use crate::render;

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// List a project's pipelines, most recent first
    List {
        /// Project ID
        project: String,

        /// Maximum number of pipelines to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show a pipeline with its logs
    Show {
        /// Pipeline ID
        id: String,
    },
    /// Show a pipeline's stage timeline
    View {
        /// Pipeline ID
        id: String,
    },
}

pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    let client = HeraldClient::new(&config.server_url);

    match command {
        PipelineCommands::List { project, limit } => list_pipelines(&client, &project, limit).await,
        PipelineCommands::Show { id } => show_pipeline(&client, &id).await,
        PipelineCommands::View { id } => view_pipeline(&client, &id).await,
    }
}

async fn list_pipelines(client: &HeraldClient, project: &str, limit: usize) -> Result<()> {
    let pipelines = client.list_pipelines(&ProjectId::new(project)).await?;

    if pipelines.is_empty() {
        println!("{}", "No pipelines found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} pipeline(s):", pipelines.len()).bold()
    );
    println!();
    for summary in pipelines.iter().take(limit) {
        render::print_summary(summary);
    }

    Ok(())
}

async fn show_pipeline(client: &HeraldClient, id: &str) -> Result<()> {
    let pipeline = client.get_pipeline(&PipelineId::new(id)).await?;
    print_pipeline_details(&pipeline);
    Ok(())
}

async fn view_pipeline(client: &HeraldClient, id: &str) -> Result<()> {
    let view = client.pipeline_view(&PipelineId::new(id)).await?;

    println!(
        "{} {} ({})",
        "Pipeline".bold(),
        view.pipeline_id.as_str().cyan(),
        render::pipeline_status(view.status)
    );
    render::print_timeline(&view.stages);

    Ok(())
}

fn print_pipeline_details(pipeline: &Pipeline) {
    println!("{}", "Pipeline Details:".bold());
    println!("  ID:       {}", pipeline.id.as_str().cyan());
    println!("  Project:  {}", pipeline.project_id);
    println!("  Status:   {}", render::pipeline_status(pipeline.status));
    if let Some(stage) = pipeline.current_stage {
        println!("  Stage:    {}", stage);
    }
    if let Some(commit) = &pipeline.commit_hash {
        println!("  Commit:   {}", commit);
    }
    if let Some(author) = &pipeline.author {
        println!("  Author:   {}", author);
    }
    if let Some(trigger) = pipeline.trigger {
        println!("  Trigger:  {}", trigger.as_str());
    }
    println!("  Created:  {}", render::timestamp(&pipeline.created_at));
    if let Some(started) = &pipeline.started_at {
        println!("  Started:  {}", render::timestamp(started));
    }
    if let Some(finished) = &pipeline.finished_at {
        println!("  Finished: {}", render::timestamp(finished));
    }
    if let Some(secs) = pipeline.duration_secs() {
        println!("  Duration: {}", render::duration(secs));
    }

    println!("\n{}", format!("Logs ({}):", pipeline.logs.len()).bold());
    println!("{}", "─".repeat(80).dimmed());
    for log in &pipeline.logs {
        render::print_log(log);
    }
    println!("{}", "─".repeat(80).dimmed());
}
