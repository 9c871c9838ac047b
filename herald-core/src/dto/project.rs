//! Project DTOs

use serde::{Deserialize, Serialize};

use crate::template::TemplateVersion;

fn default_branch() -> String {
    "main".to_string()
}

fn default_auto_deploy() -> bool {
    true
}

/// Request to register or update a project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterProject {
    pub name: String,
    pub repo_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_auto_deploy")]
    pub auto_deploy: bool,
    /// Falls back to the server's default template when absent.
    #[serde(default)]
    pub template_version: Option<TemplateVersion>,
}
