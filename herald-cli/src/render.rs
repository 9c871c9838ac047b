//! Terminal rendering helpers shared by the command handlers.

use chrono::{DateTime, Utc};
use colored::*;
use herald_core::domain::log::{LogEvent, LogLevel};
use herald_core::domain::pipeline::PipelineStatus;
use herald_core::domain::stage::{StageStatus, StageView};
use herald_core::dto::pipeline::{PipelineSummary, ProjectStats};

pub fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `1h 02m`, `3m 07s` or `42s`
pub fn duration(secs: i64) -> String {
    let secs = secs.max(0);
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Seven leading characters of a commit, the way git abbreviates them
pub fn short_commit(commit: &str) -> &str {
    commit.get(..7).unwrap_or(commit)
}

pub fn pipeline_status(status: PipelineStatus) -> ColoredString {
    paint_status(status, status.as_str())
}

fn paint_status(status: PipelineStatus, text: &str) -> ColoredString {
    match status {
        PipelineStatus::Pending => text.dimmed(),
        PipelineStatus::Running => text.yellow(),
        PipelineStatus::Success => text.green(),
        PipelineStatus::Failed => text.red(),
    }
}

fn stage_marker(status: StageStatus) -> ColoredString {
    match status {
        StageStatus::Pending => "○".dimmed(),
        StageStatus::Running => "●".yellow(),
        StageStatus::Success => "✓".green(),
        StageStatus::Failed => "✗".red(),
    }
}

/// One stage per line, in ordinal order
pub fn print_timeline(stages: &[StageView]) {
    if stages.is_empty() {
        println!("    {}", "(no stage template for this pipeline)".dimmed());
        return;
    }

    for stage in stages {
        let name = match stage.status {
            StageStatus::Running => stage.name.bold(),
            StageStatus::Pending => stage.name.dimmed(),
            _ => stage.name.normal(),
        };
        println!("    {} {}. {}", stage_marker(stage.status), stage.ordinal, name);
    }
}

pub fn print_log(log: &LogEvent) {
    let level = match log.level {
        LogLevel::Info => "INFO ".blue(),
        LogLevel::Success => "OK   ".green(),
        LogLevel::Warn => "WARN ".yellow(),
        LogLevel::Error => "ERROR".red(),
    };
    let at = log
        .timestamp
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());

    println!("    {} {} {}", at.dimmed(), level, log.message);
}

pub fn print_summary(summary: &PipelineSummary) {
    let commit = summary
        .commit_hash
        .as_deref()
        .map(short_commit)
        .unwrap_or("-------");
    let took = summary
        .duration_secs
        .map(duration)
        .unwrap_or_default();

    println!(
        "  {} {} {} {} {} {}",
        "▸".cyan(),
        paint_status(summary.status, &format!("{:<8}", summary.status.as_str())),
        commit.cyan(),
        summary.id.as_str().bold(),
        timestamp(&summary.created_at).dimmed(),
        took.dimmed()
    );
    if let Some(author) = &summary.author {
        let trigger = summary.trigger.map(|t| t.as_str()).unwrap_or("runner");
        println!("      by {} ({})", author, trigger.dimmed());
    }
}

pub fn print_stats(stats: &ProjectStats) {
    println!("{}", "Stats:".bold());
    println!(
        "  Total: {}  Succeeded: {}  Failed: {}  In progress: {}",
        stats.total,
        stats.succeeded.to_string().green(),
        stats.failed.to_string().red(),
        stats.in_progress.to_string().yellow()
    );
    if let Some(rate) = stats.success_rate {
        println!("  Success rate: {:.1}%", rate);
    }
    if let Some(avg) = stats.average_duration_secs {
        println!("  Average duration: {}", duration(avg));
    }
}
