//! Project command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use herald_client::HeraldClient;
use herald_core::domain::ProjectId;
use herald_core::domain::project::Project;
use herald_core::dto::project::RegisterProject;
use herald_core::template::TemplateVersion;

use crate::config::Config;
use crate::render;

/// Project subcommands
#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Register a project, or update an existing one
    Register {
        /// Project ID
        id: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Repository URL (https or ssh)
        #[arg(short, long)]
        repo: String,

        /// Branch that deploys on push
        #[arg(short, long, default_value = "main")]
        branch: String,

        /// Do not deploy on push
        #[arg(long)]
        no_auto_deploy: bool,

        /// Stage template version
        #[arg(short, long)]
        template: Option<u32>,
    },
    /// Show a project
    Show {
        /// Project ID
        id: String,
    },
}

pub async fn handle_project_command(command: ProjectCommands, config: &Config) -> Result<()> {
    let client = HeraldClient::new(&config.server_url);

    match command {
        ProjectCommands::Register {
            id,
            name,
            repo,
            branch,
            no_auto_deploy,
            template,
        } => {
            let req = RegisterProject {
                name,
                repo_url: repo,
                branch,
                auto_deploy: !no_auto_deploy,
                template_version: template.map(TemplateVersion),
            };
            let project = client.register_project(&ProjectId::new(id), req).await?;

            println!("{}", "✓ Project registered!".green().bold());
            print_project(&project);
            Ok(())
        }
        ProjectCommands::Show { id } => {
            let project = client.get_project(&ProjectId::new(id)).await?;
            print_project(&project);
            Ok(())
        }
    }
}

fn print_project(project: &Project) {
    println!("  ID:          {}", project.id.as_str().cyan());
    println!("  Name:        {}", project.name.bold());
    println!("  Repository:  {}", project.repo_url);
    println!("  Branch:      {}", project.branch);
    println!(
        "  Auto-deploy: {}",
        if project.auto_deploy {
            "on".green()
        } else {
            "off".dimmed()
        }
    );
    println!("  Template:    v{}", project.template_version.0);
    println!("  Updated:     {}", render::timestamp(&project.updated_at).dimmed());
}
