//! Clones of a local repository with the system git binary
//!
//! Skipped when git is not installed.

use std::path::Path;
use std::sync::Arc;

use drover_core::git::{
    CachingDirectoryManager, DirectoryManager, PoolConfig, ProcessRunner, RetryPolicy, TmpDirectoryManager, UrlRemote,
};
use drover_core::{CloneOptions, Credentials, GitCloner, GitProject, RepoRef};
use tempfile::TempDir;

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Create a repository with two commits; returns (branch, first sha, second sha)
async fn seed_repo(dir: &Path) -> (String, String, String) {
    std::fs::create_dir_all(dir).unwrap();
    let mut project = GitProject::from_existing_dir(
        dir,
        RepoRef::new("local", "widgets"),
        None,
        Credentials::anonymous(),
        Arc::new(ProcessRunner::new()),
    )
    .unwrap();

    project.init().await.unwrap();
    project.set_user_config("Drover Test", "test@example.com").await.unwrap();

    std::fs::write(dir.join("README.md"), "first\n").unwrap();
    project.commit("first commit").await.unwrap();
    let first = project.status().await.unwrap();

    std::fs::write(dir.join("README.md"), "second\n").unwrap();
    project.commit("second commit").await.unwrap();
    let second = project.status().await.unwrap();

    assert!(second.is_clean);
    (second.branch.unwrap(), first.sha.unwrap(), second.sha.unwrap())
}

fn cloner(directories: Arc<dyn DirectoryManager>) -> GitCloner {
    GitCloner::new(Arc::new(ProcessRunner::new()), directories).with_retry_policy(RetryPolicy::immediate(1))
}

fn remote(source: &Path, id: RepoRef) -> Arc<UrlRemote> {
    Arc::new(UrlRemote::new(id, format!("file://{}", source.display())))
}

#[tokio::test]
async fn test_shallow_clone_fetches_history_for_old_sha() {
    if !git_available() {
        return;
    }

    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    let (_branch, first, _second) = seed_repo(&source).await;

    let cloner = cloner(Arc::new(TmpDirectoryManager::with_base_dir(temp.path().join("clones"))));
    let id = RepoRef::new("local", "widgets").with_sha(first.clone());
    let project = cloner
        .clone(remote(&source, id), &Credentials::anonymous(), &CloneOptions::shallow(1))
        .await
        .unwrap();

    let status = project.status().await.unwrap();
    assert_eq!(status.sha.as_deref(), Some(first.as_str()));
    assert!(status.branch.is_none());
    assert_eq!(std::fs::read_to_string(project.base_dir().join("README.md")).unwrap(), "first\n");

    let path = project.base_dir().to_path_buf();
    project.release();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_pooled_clone_is_reused_and_cleaned() {
    if !git_available() {
        return;
    }

    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    let (branch, _first, second) = seed_repo(&source).await;

    let pool = Arc::new(CachingDirectoryManager::with_config(
        temp.path().join("cache"),
        PoolConfig::default(),
    ));
    let cloner = cloner(pool);
    let id = RepoRef::new("local", "widgets").with_branch(branch.clone());

    let project = cloner
        .clone(remote(&source, id.clone()), &Credentials::anonymous(), &CloneOptions::default())
        .await
        .unwrap();
    assert!(project.provenance().starts_with("cloned fresh into"));
    let first_path = project.base_dir().to_path_buf();

    std::fs::write(first_path.join("scratch.txt"), "left behind\n").unwrap();
    std::fs::write(first_path.join("README.md"), "edited\n").unwrap();
    project.release();

    let project = cloner
        .clone(remote(&source, id), &Credentials::anonymous(), &CloneOptions::default())
        .await
        .unwrap();
    assert!(project.provenance().starts_with("reused"));
    assert_eq!(project.base_dir(), first_path);
    assert_eq!(project.branch(), Some(branch.as_str()));

    let status = project.status().await.unwrap();
    assert!(status.is_clean);
    assert_eq!(status.sha.as_deref(), Some(second.as_str()));
    assert!(!first_path.join("scratch.txt").exists());
    assert_eq!(std::fs::read_to_string(first_path.join("README.md")).unwrap(), "second\n");

    project.release();
    assert!(first_path.exists());
}

#[tokio::test]
async fn test_revert_discards_staged_and_untracked_changes() {
    if !git_available() {
        return;
    }

    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    seed_repo(&source).await;
    let project = GitProject::from_existing_dir(
        &source,
        RepoRef::new("local", "widgets"),
        None,
        Credentials::anonymous(),
        Arc::new(ProcessRunner::new()),
    )
    .unwrap();

    std::fs::write(source.join("README.md"), "staged edit\n").unwrap();
    std::fs::write(source.join("new.txt"), "staged file\n").unwrap();
    let staged = std::process::Command::new("git")
        .args(["add", "."])
        .current_dir(&source)
        .status()
        .unwrap();
    assert!(staged.success());
    std::fs::write(source.join("scratch.txt"), "untracked\n").unwrap();
    assert!(!project.is_clean().await.unwrap());

    project.revert().await.unwrap();

    assert!(project.is_clean().await.unwrap());
    assert_eq!(std::fs::read_to_string(source.join("README.md")).unwrap(), "second\n");
    assert!(!source.join("new.txt").exists());
    assert!(!source.join("scratch.txt").exists());
}

#[tokio::test]
async fn test_revert_before_first_commit() {
    if !git_available() {
        return;
    }

    let temp = TempDir::new().unwrap();
    let mut project = GitProject::from_existing_dir(
        temp.path(),
        RepoRef::new("local", "widgets"),
        None,
        Credentials::anonymous(),
        Arc::new(ProcessRunner::new()),
    )
    .unwrap();
    project.init().await.unwrap();

    std::fs::write(temp.path().join("draft.txt"), "draft\n").unwrap();
    let staged = std::process::Command::new("git")
        .args(["add", "draft.txt"])
        .current_dir(temp.path())
        .status()
        .unwrap();
    assert!(staged.success());

    project.revert().await.unwrap();

    assert!(project.is_clean().await.unwrap());
    assert!(!temp.path().join("draft.txt").exists());
}
