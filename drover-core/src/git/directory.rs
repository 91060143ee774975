//! Working-copy directory allocation

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::clone::CloneOptions;
use super::repo_ref::RepoRef;
use crate::Result;

/// Whether a directory needs a clone or holds a reusable working copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryKind {
    /// Path does not exist yet; clone into it
    Empty,
    /// Path holds a previous working copy of the same repository
    Existing,
}

/// Returns a directory to its manager
///
/// Both calls must be idempotent; only the first call on a lease has an
/// effect.
pub trait DirectoryLease: Send + Sync {
    /// Hand the directory back for reuse
    fn release(&self);
    /// Mark the directory unusable so it is never handed out again
    fn invalidate(&self);
}

/// A directory handed out by a [`DirectoryManager`]
#[derive(Clone)]
pub struct CloneDirectory {
    pub kind: DirectoryKind,
    pub path: PathBuf,
    /// How the directory was chosen
    pub provenance: String,
    lease: Arc<dyn DirectoryLease>,
}

impl fmt::Debug for CloneDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloneDirectory")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("provenance", &self.provenance)
            .finish_non_exhaustive()
    }
}

impl CloneDirectory {
    pub fn new(
        kind: DirectoryKind,
        path: PathBuf,
        provenance: impl Into<String>,
        lease: Arc<dyn DirectoryLease>,
    ) -> Self {
        Self {
            kind,
            path,
            provenance: provenance.into(),
            lease,
        }
    }

    pub fn release(&self) {
        self.lease.release();
    }

    pub fn invalidate(&self) {
        self.lease.invalidate();
    }

    pub(crate) fn lease(&self) -> Arc<dyn DirectoryLease> {
        Arc::clone(&self.lease)
    }
}

/// Hands out directories for working copies
///
/// Implementations serialize allocation so that a reusable directory is
/// never given to two callers at once.
#[async_trait]
pub trait DirectoryManager: Send + Sync {
    async fn directory_for(&self, id: &RepoRef, options: &CloneOptions) -> Result<CloneDirectory>;

    /// Evict kept directories of `id` that exceed the manager's limits;
    /// returns what was removed
    async fn prune(&self, _id: &RepoRef) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

/// Remove a directory tree, treating "already gone" as success
pub(crate) fn remove_dir_quietly(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!(path = %path.display(), "Removed working copy directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove working copy directory"),
    }
}

/// Allocates a new, never reused directory for every clone
#[derive(Debug, Clone)]
pub struct TmpDirectoryManager {
    base_dir: PathBuf,
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

impl TmpDirectoryManager {
    /// Directories under `$TMPDIR/drover`
    pub fn new() -> Self {
        Self::with_base_dir(std::env::temp_dir().join("drover"))
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn unique_path(&self, id: &RepoRef) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}-{}-{}-{}-{}",
            sanitize(&id.owner),
            sanitize(&id.repo),
            std::process::id(),
            nanos,
            n
        );
        self.base_dir.join(name)
    }
}

impl Default for TmpDirectoryManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Make a repository name safe to use as a path segment
pub(crate) fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            c => c,
        })
        .collect()
}

struct TmpLease {
    path: PathBuf,
    done: AtomicBool,
}

impl TmpLease {
    fn finish(&self) {
        if !self.done.swap(true, Ordering::SeqCst) {
            remove_dir_quietly(&self.path);
        }
    }
}

impl DirectoryLease for TmpLease {
    fn release(&self) {
        self.finish();
    }

    fn invalidate(&self) {
        self.finish();
    }
}

#[async_trait]
impl DirectoryManager for TmpDirectoryManager {
    async fn directory_for(&self, id: &RepoRef, _options: &CloneOptions) -> Result<CloneDirectory> {
        std::fs::create_dir_all(&self.base_dir)?;

        let mut path = self.unique_path(id);
        while path.exists() {
            path = self.unique_path(id);
        }

        debug!(repo = %id.slug(), path = %path.display(), "Allocated temporary directory");

        let lease = Arc::new(TmpLease {
            path: path.clone(),
            done: AtomicBool::new(false),
        });
        Ok(CloneDirectory::new(
            DirectoryKind::Empty,
            path,
            "fresh temporary directory",
            lease,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_tmp_directories_are_unique_and_empty() {
        let temp = TempDir::new().unwrap();
        let manager = TmpDirectoryManager::with_base_dir(temp.path().to_path_buf());
        let id = RepoRef::new("acme", "widgets");
        let options = CloneOptions::default();

        let a = manager.directory_for(&id, &options).await.unwrap();
        let b = manager.directory_for(&id, &options).await.unwrap();

        assert_ne!(a.path, b.path);
        assert_eq!(a.kind, DirectoryKind::Empty);
        assert!(!a.path.exists());
        assert!(a.path.starts_with(temp.path()));
    }

    #[tokio::test]
    async fn test_tmp_release_removes_directory_once() {
        let temp = TempDir::new().unwrap();
        let manager = TmpDirectoryManager::with_base_dir(temp.path().to_path_buf());
        let dir = manager
            .directory_for(&RepoRef::new("acme", "widgets"), &CloneOptions::default())
            .await
            .unwrap();

        std::fs::create_dir_all(dir.path.join("src")).unwrap();
        dir.release();
        assert!(!dir.path.exists());

        // A later invalidate must not touch a directory recreated at the same path
        std::fs::create_dir_all(&dir.path).unwrap();
        dir.invalidate();
        assert!(dir.path.exists());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("feature/foo:bar"), "feature-foo-bar");
    }
}
