//! Clone command - produce a managed working copy of a repository

use std::path::Path;
use std::sync::Arc;

use clap::Args;
use drover_core::config::DirectoryStrategy;
use drover_core::git::{RemoteRepo, UrlRemote};
use drover_core::{CloneOptions, Config, Credentials, GitCloner, RepoRef};
use drover_github::{GitHubRepo, GITHUB_HOST};

/// Clone a repository into a managed working copy
#[derive(Args, Debug)]
pub struct CloneArgs {
    /// Repository URL, shorthand (owner/repo) or local path
    repo: String,

    /// Branch to check out
    #[arg(short, long)]
    branch: Option<String>,

    /// Commit to check out
    #[arg(long)]
    sha: Option<String>,

    /// History depth for shallow clones
    #[arg(long, conflicts_with = "deep")]
    depth: Option<u32>,

    /// Clone full history
    #[arg(long)]
    deep: bool,

    /// Reuse working copies from the pool
    #[arg(long)]
    pooled: bool,

    /// Leave the working copy on disk after exiting
    #[arg(long)]
    keep: bool,
}

impl CloneArgs {
    /// Execute the clone command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let mut config = config.clone();
        if self.pooled {
            config.directories.strategy = DirectoryStrategy::Pooled;
        }

        let mut options = CloneOptions::from_config(&config);
        if let Some(depth) = self.depth {
            options.depth = Some(depth);
        }
        options.always_deep |= self.deep;

        let remote = remote_for(&self.repo, self.branch.clone(), self.sha.clone())?;

        if verbose {
            println!("Repository: {}", remote.repo_ref());
        }

        let creds = Credentials::load()?;
        let cloner = GitCloner::from_config(&config)?;
        let project = cloner.clone(remote, &creds, &options).await?;

        println!("Working copy: {}", project.base_dir().display());
        println!("  branch: {}", project.branch().unwrap_or("(detached)"));
        println!("  {}", project.provenance());

        if self.keep {
            let path = project.into_path();
            println!("Kept {}", path.display());
        } else {
            let id = project.id().clone();
            project.release();
            for path in cloner.prune(&id).await? {
                println!("Evicted {}", path.display());
            }
        }

        Ok(())
    }
}

/// Pick the remote capability for a repository argument
fn remote_for(input: &str, branch: Option<String>, sha: Option<String>) -> anyhow::Result<Arc<dyn RemoteRepo>> {
    let local = local_url(input);
    let (host, mut id) = match local {
        Some(ref url) => ("local".to_string(), RepoRef::new("local", local_name(url))),
        None => RepoRef::parse(input)?,
    };
    id.branch = branch;
    id.sha = sha;

    let remote: Arc<dyn RemoteRepo> = match local {
        Some(url) => Arc::new(UrlRemote::new(id, url)),
        None if host == GITHUB_HOST => Arc::new(GitHubRepo::new(id)),
        None => Arc::new(UrlRemote::new(id, input)),
    };
    Ok(remote)
}

fn local_name(url: &str) -> String {
    Path::new(url.trim_start_matches("file://"))
        .file_name()
        .map(|n| n.to_string_lossy().trim_end_matches(".git").to_string())
        .unwrap_or_else(|| "repo".to_string())
}

/// `file://` URL for a local repository argument, if it is one
fn local_url(input: &str) -> Option<String> {
    if input.starts_with("file://") {
        return Some(input.to_string());
    }
    let path = Path::new(input);
    if path.exists() {
        let path = path.canonicalize().ok()?;
        return Some(format!("file://{}", path.display()));
    }
    None
}
