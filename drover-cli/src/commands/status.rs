//! Status command - show the git state of a working copy

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use drover_core::git::ProcessRunner;
use drover_core::{Config, Credentials, GitProject, RepoRef};

/// Show the git state of a working copy
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Working copy directory
    #[arg(default_value = ".")]
    dir: PathBuf,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let dir = self
            .dir
            .canonicalize()
            .with_context(|| format!("Cannot open {}", self.dir.display()))?;
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());

        let runner = Arc::new(ProcessRunner::new().with_git_path(&config.git.git_path));
        let project = GitProject::from_existing_dir(
            &dir,
            RepoRef::new("local", name),
            None,
            Credentials::anonymous(),
            runner,
        )?;

        let status = project.status().await?;

        println!("Working copy: {}", dir.display());
        println!("  branch: {}", status.branch.as_deref().unwrap_or("(detached)"));
        println!("  commit: {}", status.sha.as_deref().unwrap_or("(none)"));
        println!("  clean:  {}", if status.is_clean { "yes" } else { "no" });

        Ok(())
    }
}
