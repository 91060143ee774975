//! Working copy handle and its git verbs
//!
//! `branch` and `remote_url` are caches of what the last successful verb
//! did. They are never re-read from disk; [`GitProject::status`] reports the
//! on-disk state without touching them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info};

use super::clone::current_branch;
use super::command::{CommandOutput, CommandRunner, GitCommand};
use super::directory::DirectoryLease;
use super::repo_ref::{RemoteRepo, RepoRef, Visibility};
use crate::credentials::Credentials;
use crate::redact::redact_urls;
use crate::{Error, Result};

/// Branch name given to repositories created with [`GitProject::init`]
pub const INITIAL_BRANCH: &str = "master";

/// Whether `git_ref` is a full 40-character hexadecimal commit hash
pub fn is_full_sha(git_ref: &str) -> bool {
    git_ref.len() == 40 && git_ref.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Value of a `git push` flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFlag {
    /// `--flag` or `--no-flag`
    Bool(bool),
    /// `--flag=value`
    Value(String),
}

/// Flags for `git push`, rendered in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOptions {
    flags: Vec<(String, PushFlag)>,
}

impl PushOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a boolean flag. camelCase names are converted to kebab-case.
    pub fn flag(self, name: &str, value: bool) -> Self {
        self.set(name, PushFlag::Bool(value))
    }

    /// Set a valued flag, rendered as `--name=value`
    pub fn option(self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, PushFlag::Value(value.into()))
    }

    pub fn force(self, value: bool) -> Self {
        self.flag("force", value)
    }

    pub fn set_upstream(self, value: bool) -> Self {
        self.flag("setUpstream", value)
    }

    fn set(mut self, name: &str, value: PushFlag) -> Self {
        let name = kebab_case(name);
        match self.flags.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = value,
            None => self.flags.push((name, value)),
        }
        self
    }

    pub fn to_args(&self) -> Vec<String> {
        self.flags
            .iter()
            .map(|(name, value)| match value {
                PushFlag::Bool(true) => format!("--{}", name),
                PushFlag::Bool(false) => format!("--no-{}", name),
                PushFlag::Value(v) => format!("--{}={}", name, v),
            })
            .collect()
    }
}

fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c == '_' {
            out.push('-');
        } else if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// On-disk state reported by [`GitProject::status`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitStatus {
    pub is_clean: bool,
    /// Checked-out branch, `None` when HEAD is detached
    pub branch: Option<String>,
    /// HEAD commit, `None` before the first commit
    pub sha: Option<String>,
}

/// A git working copy on local disk
pub struct GitProject {
    id: RepoRef,
    remote: Option<Arc<dyn RemoteRepo>>,
    base_dir: PathBuf,
    remote_url: Option<String>,
    credentials: Credentials,
    new_repo: bool,
    provenance: String,
    runner: Arc<dyn CommandRunner>,
    lease: Option<Arc<dyn DirectoryLease>>,
}

impl fmt::Debug for GitProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitProject")
            .field("id", &self.id)
            .field("base_dir", &self.base_dir)
            .field("remote_url", &self.remote_url.as_deref().map(redact_urls))
            .field("new_repo", &self.new_repo)
            .field("provenance", &self.provenance)
            .finish_non_exhaustive()
    }
}

impl GitProject {
    pub(crate) fn cloned(
        id: RepoRef,
        remote: Arc<dyn RemoteRepo>,
        base_dir: PathBuf,
        credentials: Credentials,
        runner: Arc<dyn CommandRunner>,
        provenance: String,
        lease: Arc<dyn DirectoryLease>,
    ) -> Self {
        Self {
            id,
            remote: Some(remote),
            base_dir,
            remote_url: None,
            credentials,
            new_repo: false,
            provenance,
            runner,
            lease: Some(lease),
        }
    }

    /// Wrap a directory that already exists on disk
    ///
    /// The directory is never deleted or returned to a pool by this handle.
    pub fn from_existing_dir(
        base_dir: impl Into<PathBuf>,
        id: RepoRef,
        remote: Option<Arc<dyn RemoteRepo>>,
        credentials: Credentials,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.is_dir() {
            return Err(Error::Precondition(format!(
                "{} is not a directory on local disk",
                base_dir.display()
            )));
        }

        let provenance = format!("existing local directory {}", base_dir.display());
        Ok(Self {
            id,
            remote,
            base_dir,
            remote_url: None,
            credentials,
            new_repo: false,
            provenance,
            runner,
            lease: None,
        })
    }

    pub fn id(&self) -> &RepoRef {
        &self.id
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Branch recorded by the last clone, checkout, init or branch creation
    pub fn branch(&self) -> Option<&str> {
        self.id.branch.as_deref()
    }

    /// Remote recorded by [`GitProject::set_remote`]
    pub fn remote_url(&self) -> Option<&str> {
        self.remote_url.as_deref()
    }

    pub fn is_new_repo(&self) -> bool {
        self.new_repo
    }

    /// How this handle came to be
    pub fn provenance(&self) -> &str {
        &self.provenance
    }

    async fn exec(&self, command: GitCommand) -> Result<CommandOutput> {
        self.runner.run(&command, &self.base_dir).await
    }

    async fn exec_ok(&self, command: GitCommand) -> Result<CommandOutput> {
        self.exec(command).await?.into_result()
    }

    fn remote_capability(&self, what: &str) -> Result<&Arc<dyn RemoteRepo>> {
        self.remote.as_ref().ok_or_else(|| {
            Error::Precondition(format!(
                "cannot {} for {}: not a remote repository",
                what,
                self.id.slug()
            ))
        })
    }

    /// Start a brand-new repository in the base directory
    pub async fn init(&mut self) -> Result<()> {
        self.exec_ok(GitCommand::new("init")).await?;
        self.new_repo = true;
        self.id.branch = Some(INITIAL_BRANCH.to_string());
        Ok(())
    }

    /// True iff `git status --porcelain` prints nothing at all
    pub async fn is_clean(&self) -> Result<bool> {
        let output = self.exec_ok(GitCommand::new("status").arg("--porcelain")).await?;
        Ok(output.stdout.is_empty())
    }

    /// Record `url` as the remote and add it as `origin`
    pub async fn set_remote(&mut self, url: impl Into<String>) -> Result<()> {
        let url = url.into();
        self.exec_ok(GitCommand::new("remote").args(["add", "origin", url.as_str()]))
            .await?;
        self.remote_url = Some(url);
        Ok(())
    }

    /// Set the committer identity for this working copy
    pub async fn set_user_config(&self, name: &str, email: &str) -> Result<()> {
        self.exec_ok(GitCommand::new("config").args(["user.name", name])).await?;
        self.exec_ok(GitCommand::new("config").args(["user.email", email])).await?;
        Ok(())
    }

    /// Apply the committer identity the remote service reports for our
    /// credentials
    pub async fn configure_user(&self) -> Result<()> {
        let remote = self.remote_capability("configure committer")?;
        let user = remote.user_config(&self.credentials).await?;
        debug!(repo = %self.id.slug(), name = %user.name, "Configuring committer");
        self.set_user_config(&user.name, &user.email).await
    }

    /// Create the repository on the remote service and wire it as `origin`
    pub async fn create_and_set_remote(&mut self, description: &str, visibility: Visibility) -> Result<()> {
        let remote = Arc::clone(self.remote_capability("create remote")?);
        remote
            .create_remote(&self.credentials, description, visibility)
            .await?;

        let url = remote.clone_url(&self.credentials);
        info!(repo = %self.id.slug(), url = %redact_urls(&url), "Created remote repository");
        self.set_remote(url).await
    }

    /// Stage everything and commit
    pub async fn commit(&self, message: &str) -> Result<()> {
        self.exec_ok(GitCommand::new("add").arg(".")).await?;
        self.exec_ok(GitCommand::new("commit").args(["-m", message])).await?;
        Ok(())
    }

    /// Check out a branch or commit
    ///
    /// Anything other than a full commit hash is recorded as the current
    /// branch.
    pub async fn checkout(&mut self, git_ref: &str) -> Result<()> {
        self.exec_ok(GitCommand::new("checkout").args([git_ref, "--"])).await?;
        if !is_full_sha(git_ref) {
            self.id.branch = Some(git_ref.to_string());
        }
        Ok(())
    }

    /// Discard uncommitted changes, staged or not, as well as untracked and
    /// ignored files
    pub async fn revert(&self) -> Result<()> {
        let head = self
            .exec(GitCommand::new("rev-parse").args(["--verify", "-q", "HEAD"]))
            .await?;
        if head.success {
            self.exec_ok(GitCommand::new("reset").args(["--hard", "HEAD"])).await?;
        } else {
            // Nothing committed yet
            self.exec_ok(GitCommand::new("read-tree").arg("--empty")).await?;
        }
        self.exec_ok(GitCommand::new("clean").arg("-dfx")).await?;
        Ok(())
    }

    /// Push the current branch
    ///
    /// With a recorded remote the push targets it explicitly; otherwise the
    /// branch is pushed to `origin` with upstream tracking.
    pub async fn push(&self, options: &PushOptions) -> Result<()> {
        let branch = self.branch().ok_or_else(|| {
            Error::Precondition(format!("cannot push {}: no branch is set", self.id.slug()))
        })?;

        let mut command = GitCommand::new("push").args(options.to_args());
        command = match self.remote_url {
            Some(ref remote) => command.args([remote.as_str(), branch]),
            None => command.args(["--set-upstream", "origin", branch]),
        };

        let output = self.exec(command).await?;
        if !output.success {
            error!(command = %output.command, "Push failed");
        }
        output.into_result()?;

        info!(repo = %self.id.slug(), branch, "Pushed");
        Ok(())
    }

    /// Create a branch and switch to it
    pub async fn create_branch(&mut self, name: &str) -> Result<()> {
        self.exec_ok(GitCommand::new("checkout").args(["-b", name])).await?;
        self.id.branch = Some(name.to_string());
        Ok(())
    }

    /// Whether a local branch named `name` exists
    pub async fn has_branch(&self, name: &str) -> Result<bool> {
        let output = self.exec_ok(GitCommand::new("branch").args(["--list", name])).await?;
        Ok(output.stdout.contains(name))
    }

    /// Open a pull request from the current branch into `target_branch`
    pub async fn raise_pull_request(&self, title: &str, body: &str, target_branch: &str) -> Result<()> {
        let branch = match self.branch() {
            Some(branch) if !branch.is_empty() => branch,
            _ => {
                return Err(Error::Precondition(format!(
                    "cannot raise a pull request for {}: no branch is set",
                    self.id.slug()
                )))
            }
        };
        let remote = self.remote_capability("raise a pull request")?;

        remote
            .raise_pull_request(&self.credentials, title, body, branch, target_branch)
            .await?;
        info!(repo = %self.id.slug(), head = branch, base = target_branch, "Raised pull request");
        Ok(())
    }

    /// Read the working copy's state from disk
    pub async fn status(&self) -> Result<GitStatus> {
        let is_clean = self.is_clean().await?;
        let branch = current_branch(&*self.runner, &self.base_dir).await?;
        let head = self.exec(GitCommand::new("rev-parse").arg("HEAD")).await?;
        let sha = (head.success && !head.stdout.trim().is_empty()).then(|| head.stdout.trim().to_string());

        Ok(GitStatus { is_clean, branch, sha })
    }

    /// Return the directory to its manager
    pub fn release(mut self) {
        if let Some(lease) = self.lease.take() {
            lease.release();
        }
    }

    /// Keep the directory on disk: detach it from its manager and return
    /// its path
    pub fn into_path(mut self) -> PathBuf {
        self.lease = None;
        std::mem::take(&mut self.base_dir)
    }
}

impl Drop for GitProject {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            lease.release();
        }
    }
}
