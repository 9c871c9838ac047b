//! GitHub push webhooks
//!
//! A push to a project's tracked branch starts a deployment when the project
//! has auto-deploy on. Anything else is acknowledged and ignored.

use herald_core::domain::pipeline::TriggerKind;
use herald_core::dto::trigger::TriggerOutcome;
use serde::Deserialize;

use crate::repository::ProjectStore;
use crate::service::trigger::{self, TriggerService};

const TRACING_TARGET: &str = "herald_server::service::webhook";

/// The parts of a GitHub push payload the relay reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub after: Option<String>,
    pub repository: Option<Repository>,
    pub head_commit: Option<HeadCommit>,
    pub pusher: Option<Pusher>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Repository {
    pub clone_url: Option<String>,
    pub ssh_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeadCommit {
    pub id: Option<String>,
    pub committer: Option<Committer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Committer {
    pub username: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pusher {
    pub name: Option<String>,
}

impl PushEvent {
    /// Branch name, from `refs/heads/<branch>`.
    pub fn branch(&self) -> Option<&str> {
        let git_ref = self.git_ref.as_deref()?;
        Some(git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref))
    }

    pub fn commit(&self) -> Option<String> {
        self.head_commit
            .as_ref()
            .and_then(|c| c.id.clone())
            .or_else(|| self.after.clone())
    }

    pub fn author(&self) -> Option<String> {
        let committer = self.head_commit.as_ref().and_then(|c| c.committer.as_ref());
        committer
            .and_then(|c| c.username.clone())
            .or_else(|| committer.and_then(|c| c.name.clone()))
            .or_else(|| self.pusher.as_ref().and_then(|p| p.name.clone()))
    }
}

/// How a webhook was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    NotAPush,
    Ignored,
    Triggered(TriggerOutcome),
}

pub async fn handle_push(
    projects: &dyn ProjectStore,
    triggers: &TriggerService,
    event: PushEvent,
) -> trigger::Result<WebhookOutcome> {
    let (Some(branch), Some(repository)) = (event.branch(), event.repository.as_ref()) else {
        return Ok(WebhookOutcome::NotAPush);
    };

    let clone_url = repository.clone_url.as_deref();
    let ssh_url = repository.ssh_url.as_deref();

    let project = projects
        .list_projects()
        .await?
        .into_iter()
        .find(|p| p.matches_repo(clone_url, ssh_url));

    let Some(project) = project.filter(|p| p.deploys_on_push(branch)) else {
        tracing::info!(
            target: TRACING_TARGET,
            branch,
            clone_url = ?clone_url,
            "push ignored, no matching auto-deploy project"
        );
        return Ok(WebhookOutcome::Ignored);
    };

    let outcome = triggers
        .trigger_project(&project, event.commit(), event.author(), TriggerKind::Github)
        .await?;
    Ok(WebhookOutcome::Triggered(outcome))
}
