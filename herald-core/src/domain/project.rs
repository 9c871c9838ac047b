//! Project domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ProjectId;
use crate::template::TemplateVersion;

/// A deployable repository.
///
/// Only the fields the relay needs: webhook matching and the stage template
/// that new pipelines of this project are created under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub repo_url: String,
    pub branch: String,
    pub auto_deploy: bool,
    pub template_version: TemplateVersion,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Whether a push to `branch` should start a deployment.
    pub fn deploys_on_push(&self, branch: &str) -> bool {
        self.auto_deploy && self.branch == branch
    }

    /// Match either clone URL GitHub reports for the repository.
    pub fn matches_repo(&self, clone_url: Option<&str>, ssh_url: Option<&str>) -> bool {
        [clone_url, ssh_url]
            .into_iter()
            .flatten()
            .any(|url| url == self.repo_url)
    }
}
