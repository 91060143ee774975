//! Cloning remote repositories into working copies
//!
//! A clone resolves a directory from the [`DirectoryManager`] and then either
//! clones into it (with retry and shallow-to-deep promotion) or brings a
//! reused working copy up to date. A reused copy that cannot be refreshed is
//! invalidated and the whole clone is tried once more from a new directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::command::{CommandRunner, GitCommand, ProcessRunner};
use super::directory::{CloneDirectory, DirectoryKind, DirectoryManager, TmpDirectoryManager};
use super::pool::{CachingDirectoryManager, PoolConfig};
use super::project::GitProject;
use super::repo_ref::{RemoteRepo, RepoRef};
use super::retry::RetryPolicy;
use crate::config::{Config, DirectoryStrategy};
use crate::credentials::Credentials;
use crate::redact::redact_urls;
use crate::{Error, Result};

/// Options used only while cloning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOptions {
    /// History depth for shallow clones (at least 1; defaults to 1)
    pub depth: Option<u32>,
    /// Branch to clone, overriding the repository's branch
    pub branch: Option<String>,
    /// Clone full history
    pub always_deep: bool,
}

impl CloneOptions {
    /// Shallow clone with the given depth
    pub fn shallow(depth: u32) -> Self {
        Self {
            depth: Some(depth),
            ..Self::default()
        }
    }

    /// Full-history clone
    pub fn deep() -> Self {
        Self {
            always_deep: true,
            ..Self::default()
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Clone options from the `[git]` section
    pub fn from_config(config: &Config) -> Self {
        Self {
            depth: Some(config.git.depth),
            branch: None,
            always_deep: config.git.always_deep,
        }
    }

    /// Effective depth, never below 1
    pub fn depth(&self) -> u32 {
        self.depth.unwrap_or(1).max(1)
    }
}

/// What a reuse-or-clone pass produced
enum Outcome {
    Ready(GitProject),
    /// Refreshing a reused directory failed; the directory is invalidated
    ReuseFailed(Error),
}

/// Produces working copies of remote repositories
pub struct GitCloner {
    runner: Arc<dyn CommandRunner>,
    directories: Arc<dyn DirectoryManager>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GitCloner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCloner")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl GitCloner {
    pub fn new(runner: Arc<dyn CommandRunner>, directories: Arc<dyn DirectoryManager>) -> Self {
        Self {
            runner,
            directories,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build a cloner from configuration: system git plus the configured
    /// directory strategy
    pub fn from_config(config: &Config) -> Result<Self> {
        let runner = Arc::new(ProcessRunner::new().with_git_path(&config.git.git_path));

        let directories: Arc<dyn DirectoryManager> = match config.directories.strategy {
            DirectoryStrategy::Fresh => match config.directories.cache_dir {
                Some(ref dir) => Arc::new(TmpDirectoryManager::with_base_dir(dir.clone())),
                None => Arc::new(TmpDirectoryManager::new()),
            },
            DirectoryStrategy::Pooled => {
                let pool_config = PoolConfig::from(&config.directories);
                let cache_dir = match config.directories.cache_dir {
                    Some(ref dir) => dir.clone(),
                    None => super::pool::default_cache_dir()?,
                };
                Arc::new(CachingDirectoryManager::with_config(cache_dir, pool_config))
            }
        };

        Ok(Self::new(runner, directories).with_retry_policy(config.retry_policy()))
    }

    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.runner)
    }

    /// Evict working copies of `id` the directory manager no longer keeps
    pub async fn prune(&self, id: &RepoRef) -> Result<Vec<PathBuf>> {
        let removed = self.directories.prune(id).await?;
        if !removed.is_empty() {
            debug!(repo = %id.slug(), count = removed.len(), "Pruned working copies");
        }
        Ok(removed)
    }

    /// Produce a working copy of `remote`
    pub async fn clone(
        &self,
        remote: Arc<dyn RemoteRepo>,
        creds: &Credentials,
        options: &CloneOptions,
    ) -> Result<GitProject> {
        match self.resolve(&remote, creds, options, false).await? {
            Outcome::Ready(project) => Ok(project),
            Outcome::ReuseFailed(e) => {
                warn!(
                    repo = %remote.repo_ref(),
                    error = %e,
                    "Reused working copy could not be refreshed, cloning again"
                );
                match self.resolve(&remote, creds, options, true).await? {
                    Outcome::Ready(project) => Ok(project),
                    Outcome::ReuseFailed(e) => Err(e),
                }
            }
        }
    }

    async fn resolve(
        &self,
        remote: &Arc<dyn RemoteRepo>,
        creds: &Credentials,
        options: &CloneOptions,
        second_try: bool,
    ) -> Result<Outcome> {
        let id = remote.repo_ref();
        let branch = options.branch.clone().or_else(|| id.branch.clone());
        let url = remote.clone_url(creds);
        let dir = self.directories.directory_for(id, options).await?;

        debug!(
            repo = %id,
            url = %redact_urls(&url),
            path = %dir.path.display(),
            kind = ?dir.kind,
            second_try,
            "Resolved clone directory"
        );

        let (branch, how) = match dir.kind {
            DirectoryKind::Empty => {
                let cloned = self.fresh_clone(&dir, &url, branch, id.sha.as_deref(), options).await;
                match cloned {
                    Ok(branch) => (branch, "cloned fresh into"),
                    Err(e) => {
                        dir.invalidate();
                        return Err(e);
                    }
                }
            }
            DirectoryKind::Existing => {
                let refreshed = self.refresh(&dir.path, &url, branch.as_deref(), id.sha.as_deref()).await;
                match refreshed {
                    Ok(()) => (branch, "reused"),
                    Err(e) => {
                        dir.invalidate();
                        return if second_try { Err(e) } else { Ok(Outcome::ReuseFailed(e)) };
                    }
                }
            }
        };

        let mut provenance = format!("{} {} ({})", how, dir.path.display(), dir.provenance);
        if second_try {
            provenance.insert_str(0, "second try: ");
        }

        info!(repo = %id, path = %dir.path.display(), %provenance, "Working copy ready");

        let mut id = id.clone();
        id.branch = branch;
        Ok(Outcome::Ready(GitProject::cloned(
            id,
            Arc::clone(remote),
            dir.path.clone(),
            creds.clone(),
            self.runner(),
            provenance,
            dir.lease(),
        )))
    }

    /// Clone into an empty directory, retrying the whole clone and checkout
    async fn fresh_clone(
        &self,
        dir: &CloneDirectory,
        url: &str,
        branch: Option<String>,
        sha: Option<&str>,
        options: &CloneOptions,
    ) -> Result<Option<String>> {
        let parent = dir
            .path
            .parent()
            .ok_or_else(|| Error::Other(format!("Clone directory has no parent: {}", dir.path.display())))?;
        let branch = branch.as_deref();
        let depth = (!options.always_deep).then(|| options.depth());

        info!(
            url = %redact_urls(url),
            path = %dir.path.display(),
            ?depth,
            ?branch,
            "Cloning repository"
        );

        self.retry
            .run("clone", move |attempt| {
                self.clone_attempt(&dir.path, parent, url, branch, sha, options, attempt)
            })
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn clone_attempt(
        &self,
        path: &Path,
        parent: &Path,
        url: &str,
        branch: Option<&str>,
        sha: Option<&str>,
        options: &CloneOptions,
        attempt: u32,
    ) -> Result<Option<String>> {
        if path.exists() {
            debug!(path = %path.display(), attempt, "Removing partial clone");
            std::fs::remove_dir_all(path)?;
        }
        std::fs::create_dir_all(parent)?;

        let shallow = !options.always_deep;
        let mut clone = GitCommand::new("clone");
        if shallow {
            clone = clone.arg("--depth").arg(options.depth().to_string());
        }
        clone = clone.arg(url).arg(path.display().to_string());
        if shallow {
            if let Some(branch) = branch {
                clone = clone.arg("--branch").arg(branch);
            }
        }
        self.runner.run(&clone, parent).await?.into_result()?;

        match branch.or(sha) {
            Some(git_ref) => {
                self.checkout_with_promotion(path, git_ref, shallow).await?;
                Ok(branch.map(str::to_string))
            }
            None => current_branch(&*self.runner, path).await,
        }
    }

    /// Check out `git_ref`; if a shallow clone lacks it, fetch the full history
    /// once and try again.
    async fn checkout_with_promotion(&self, path: &Path, git_ref: &str, shallow: bool) -> Result<()> {
        let checkout = GitCommand::new("checkout").arg(git_ref).arg("--");
        let output = self.runner.run(&checkout, path).await?;
        if output.success || !shallow {
            return output.into_result().map(|_| ());
        }

        info!(git_ref, "Checkout failed in shallow clone, fetching full history");
        self.runner
            .run(&GitCommand::new("fetch").arg("--unshallow"), path)
            .await?
            .into_result()?;
        self.runner.run(&checkout, path).await?.into_result()?;
        Ok(())
    }

    /// Bring a reused working copy to the requested ref and discard local
    /// changes.
    ///
    /// When only a branch is requested the copy lands on the branch tip as
    /// fetched now, which may differ from the commit the caller had in mind.
    async fn refresh(&self, path: &Path, url: &str, branch: Option<&str>, sha: Option<&str>) -> Result<()> {
        let fetch_ref = branch.or(sha).unwrap_or("HEAD");
        let checkout = match branch {
            Some(branch) => GitCommand::new("checkout").args(["--force", "-B", branch, "FETCH_HEAD"]),
            None => GitCommand::new("checkout").args(["--force", "--detach", "FETCH_HEAD"]),
        };

        let steps = [
            GitCommand::new("remote").args(["set-url", "origin", url]),
            GitCommand::new("fetch").args(["origin", fetch_ref]),
            checkout,
            GitCommand::new("reset").args(["--hard", "FETCH_HEAD"]),
            GitCommand::new("clean").arg("-dfx"),
        ];

        for step in &steps {
            self.runner.run(step, path).await?.into_result()?;
        }

        debug!(path = %path.display(), fetch_ref, "Refreshed reused working copy");
        Ok(())
    }
}

/// Name of the checked-out branch, `None` when HEAD is detached
pub(crate) async fn current_branch(runner: &dyn CommandRunner, path: &Path) -> Result<Option<String>> {
    let output = runner
        .run(&GitCommand::new("symbolic-ref").args(["--short", "-q", "HEAD"]), path)
        .await?;
    let name = output.stdout.trim();
    Ok((output.success && !name.is_empty()).then(|| name.to_string()))
}
