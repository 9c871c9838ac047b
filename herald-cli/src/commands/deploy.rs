//! Deployment command handlers
//!
//! `status`, `trigger` and `rollback` work on a whole project rather than on a
//! single pipeline.

use anyhow::{Result, bail};
use colored::*;
use herald_client::HeraldClient;
use herald_core::domain::ProjectId;
use herald_core::dto::pipeline::RollbackCandidate;
use herald_core::dto::trigger::{TriggerOutcome, TriggerRequest};

use crate::config::Config;
use crate::render;

/// Print the active pipelines with their timelines, recent history and stats
pub async fn status(config: &Config, project: &str, lines: usize) -> Result<()> {
    let client = HeraldClient::new(&config.server_url);
    let bootstrap = client.bootstrap(&ProjectId::new(project)).await?;

    println!("{} {}", "Project".bold(), bootstrap.project_id.as_str().cyan());
    println!();

    if bootstrap.active.is_empty() {
        println!("{}", "No pipeline is running.".dimmed());
    }
    for view in &bootstrap.active {
        println!(
            "{} {} ({})",
            "▸".cyan(),
            view.pipeline_id.as_str().bold(),
            render::pipeline_status(view.status)
        );
        render::print_timeline(&view.stages);

        let skip = view.logs.len().saturating_sub(lines);
        if !view.logs.is_empty() {
            println!();
            for log in &view.logs[skip..] {
                render::print_log(log);
            }
        }
        println!();
    }

    if !bootstrap.history.is_empty() {
        println!("{}", "Recent deployments:".bold());
        for summary in bootstrap.history.iter().take(5) {
            render::print_summary(summary);
        }
        println!();
    }

    render::print_stats(&bootstrap.stats);
    Ok(())
}

pub async fn trigger(
    config: &Config,
    project: &str,
    commit: Option<String>,
    author: Option<String>,
) -> Result<()> {
    let client = HeraldClient::new(&config.server_url);
    let outcome = client
        .trigger(TriggerRequest {
            project_id: ProjectId::new(project),
            commit_hash: commit,
            author,
        })
        .await?;

    print_outcome(&outcome);
    Ok(())
}

pub async fn rollback(config: &Config, project: &str, commit: Option<String>) -> Result<()> {
    let client = HeraldClient::new(&config.server_url);
    let project_id = ProjectId::new(project);

    let candidates = client.rollback_candidates(&project_id).await?;
    let target = rollback_target(&candidates, commit)?;

    println!(
        "{} {}",
        "Rolling back to".bold(),
        render::short_commit(&target).cyan()
    );

    let outcome = client
        .trigger(TriggerRequest {
            project_id,
            commit_hash: Some(target),
            author: None,
        })
        .await?;

    print_outcome(&outcome);
    Ok(())
}

/// The requested commit, or the newest successful one before the current deployment.
fn rollback_target(candidates: &[RollbackCandidate], requested: Option<String>) -> Result<String> {
    if let Some(commit) = requested {
        if !candidates.iter().any(|c| c.commit_hash == commit) {
            eprintln!(
                "{}",
                format!("Warning: {} never deployed successfully", commit).yellow()
            );
        }
        return Ok(commit);
    }

    match candidates.get(1) {
        Some(previous) => Ok(previous.commit_hash.clone()),
        None => bail!("No earlier successful deployment to roll back to"),
    }
}

fn print_outcome(outcome: &TriggerOutcome) {
    match outcome {
        TriggerOutcome::Attributed { pipeline_id } => {
            println!("{}", "✓ Deployment started!".green().bold());
            println!("  Pipeline: {}", pipeline_id.as_str().cyan());
        }
        TriggerOutcome::AttributionPending { project_id } => {
            println!("{}", "✓ Deployment handed to the runner.".green().bold());
            println!(
                "  {}",
                format!(
                    "The pipeline will show up under `herald pipeline list {}`.",
                    project_id
                )
                .dimmed()
            );
        }
    }
}
