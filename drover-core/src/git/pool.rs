//! Pool of reusable working copies
//!
//! Working copies live at `<cache_dir>/<owner>/<repo>/<slot>` with a sidecar
//! metadata file `<slot>.toml` next to each slot directory. Keeping metadata
//! outside the working copy means `git clean -dfx` never removes it.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::clone::CloneOptions;
use super::directory::{remove_dir_quietly, sanitize, CloneDirectory, DirectoryKind, DirectoryLease, DirectoryManager};
use super::repo_ref::RepoRef;
use crate::config::DirectoryConfig;
use crate::{Error, Result};

/// Status of a pooled working copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    /// Leased to a working copy handle
    Active,
    /// Ready to be reused
    #[default]
    Available,
}

/// Metadata stored beside each pooled working copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotMetadata {
    #[serde(with = "humantime_serde")]
    pub created_at: SystemTime,

    #[serde(with = "humantime_serde")]
    pub last_used: SystemTime,

    pub status: SlotStatus,
}

impl SlotMetadata {
    fn new() -> Self {
        let now = SystemTime::now();
        Self {
            created_at: now,
            last_used: now,
            status: SlotStatus::Active,
        }
    }

    fn touch(&mut self) {
        self.last_used = SystemTime::now();
    }

    pub fn load(slot_path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(metadata_path(slot_path))
            .map_err(|e| Error::Config(format!("Failed to read slot metadata: {}", e)))?;

        toml::from_str(&contents).map_err(|e| Error::Config(format!("Failed to parse slot metadata: {}", e)))
    }

    pub fn save(&self, slot_path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Other(format!("Failed to serialize slot metadata: {}", e)))?;

        fs::write(metadata_path(slot_path), contents)
            .map_err(|e| Error::Other(format!("Failed to write slot metadata: {}", e)))
    }
}

fn metadata_path(slot_path: &Path) -> PathBuf {
    slot_path.with_extension("toml")
}

/// Pool limits
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of working copies kept per repository
    pub max_per_repo: usize,

    /// Working copies unused for longer than this are evicted (zero = never)
    pub max_age: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_per_repo: 5,
            max_age: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl From<&DirectoryConfig> for PoolConfig {
    fn from(config: &DirectoryConfig) -> Self {
        Self {
            max_per_repo: config.max_per_repo,
            max_age: config.max_age,
        }
    }
}

/// A pooled working copy on disk
#[derive(Debug, Clone)]
pub struct PooledSlot {
    pub path: PathBuf,
    pub metadata: Option<SlotMetadata>,
}

impl PooledSlot {
    fn has_working_copy(&self) -> bool {
        self.path.join(".git").is_dir()
    }
}

#[derive(Debug)]
struct PoolInner {
    cache_dir: PathBuf,
    config: PoolConfig,
    /// Slots leased by this process
    leased: Mutex<HashSet<PathBuf>>,
}

impl PoolInner {
    fn leased(&self) -> Result<std::sync::MutexGuard<'_, HashSet<PathBuf>>> {
        self.leased
            .lock()
            .map_err(|_| Error::Other("working copy pool lock poisoned".to_string()))
    }
}

/// Directory manager that reuses working copies across clones
#[derive(Debug, Clone)]
pub struct CachingDirectoryManager {
    inner: Arc<PoolInner>,
}

/// Returns `~/.cache/drover/repos`
pub fn default_cache_dir() -> Result<PathBuf> {
    let cache_dir =
        dirs::cache_dir().ok_or_else(|| Error::Config("Could not determine cache directory".to_string()))?;

    Ok(cache_dir.join("drover").join("repos"))
}

impl CachingDirectoryManager {
    /// Pool in the default cache directory
    pub fn new() -> Result<Self> {
        Ok(Self::with_cache_dir(default_cache_dir()?))
    }

    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self::with_config(cache_dir, PoolConfig::default())
    }

    pub fn with_config(cache_dir: PathBuf, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                cache_dir,
                config,
                leased: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.inner.cache_dir
    }

    fn repo_dir(&self, owner: &str, repo: &str) -> PathBuf {
        self.inner.cache_dir.join(sanitize(owner)).join(sanitize(repo))
    }

    /// List all pooled working copies for a repository
    pub fn list_slots(&self, owner: &str, repo: &str) -> Result<Vec<PooledSlot>> {
        let repo_dir = self.repo_dir(owner, repo);

        if !repo_dir.exists() {
            return Ok(Vec::new());
        }

        let mut slots = Vec::new();
        for entry in fs::read_dir(&repo_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                let metadata = SlotMetadata::load(&path).ok();
                slots.push(PooledSlot { path, metadata });
            }
        }
        slots.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(slots)
    }

    /// Pick a reusable slot or reserve a new one. Caller holds the lease lock.
    fn allocate(&self, id: &RepoRef, leased: &mut HashSet<PathBuf>) -> Result<(DirectoryKind, PathBuf, String)> {
        let slots = self.list_slots(&id.owner, &id.repo)?;

        for slot in &slots {
            let available = slot
                .metadata
                .as_ref()
                .is_some_and(|m| m.status == SlotStatus::Available);
            if !available || leased.contains(&slot.path) {
                continue;
            }

            let mut metadata = slot.metadata.clone().unwrap_or_else(SlotMetadata::new);
            metadata.status = SlotStatus::Active;
            metadata.touch();
            metadata.save(&slot.path)?;
            leased.insert(slot.path.clone());

            if slot.has_working_copy() {
                let provenance = format!("reused pooled working copy {}", slot.path.display());
                return Ok((DirectoryKind::Existing, slot.path.clone(), provenance));
            }

            let provenance = format!("recycled pooled slot {}", slot.path.display());
            return Ok((DirectoryKind::Empty, slot.path.clone(), provenance));
        }

        let repo_dir = self.repo_dir(&id.owner, &id.repo);
        fs::create_dir_all(&repo_dir)?;

        let mut n = 0usize;
        let path = loop {
            let candidate = repo_dir.join(n.to_string());
            if !candidate.exists() && !metadata_path(&candidate).exists() && !leased.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };

        SlotMetadata::new().save(&path)?;
        leased.insert(path.clone());

        let provenance = format!("new pooled slot {}", path.display());
        Ok((DirectoryKind::Empty, path, provenance))
    }

    /// Evict stale and excess working copies for a repository
    ///
    /// Slots in use are never removed.
    pub fn cleanup(&self, owner: &str, repo: &str) -> Result<Vec<PathBuf>> {
        let leased = self.inner.leased()?;
        let mut removed = Vec::new();
        let now = SystemTime::now();
        let max_age = self.inner.config.max_age;

        let in_use = |slot: &PooledSlot| {
            leased.contains(&slot.path)
                || slot
                    .metadata
                    .as_ref()
                    .is_some_and(|m| m.status == SlotStatus::Active)
        };

        for slot in self.list_slots(owner, repo)? {
            if in_use(&slot) || max_age.is_zero() {
                continue;
            }

            let last_used = match slot.metadata {
                Some(ref meta) => Some(meta.last_used),
                None => fs::metadata(&slot.path).and_then(|m| m.modified()).ok(),
            };
            let too_old = last_used
                .and_then(|t| now.duration_since(t).ok())
                .is_some_and(|age| age > max_age);

            if too_old {
                remove_slot(&slot.path);
                removed.push(slot.path);
            }
        }

        let mut idle: Vec<_> = self
            .list_slots(owner, repo)?
            .into_iter()
            .filter(|slot| !in_use(slot))
            .collect();
        let busy = self.list_slots(owner, repo)?.len() - idle.len();

        // Oldest first
        idle.sort_by_key(|slot| {
            slot.metadata
                .as_ref()
                .map(|m| m.last_used)
                .unwrap_or(SystemTime::UNIX_EPOCH)
        });

        let max = self.inner.config.max_per_repo;
        let excess = (idle.len() + busy).saturating_sub(max).min(idle.len());
        for slot in idle.into_iter().take(excess) {
            remove_slot(&slot.path);
            removed.push(slot.path);
        }

        if !removed.is_empty() {
            info!(owner, repo, count = removed.len(), "Evicted pooled working copies");
        }

        Ok(removed)
    }
}

fn remove_slot(path: &Path) {
    remove_dir_quietly(path);
    if let Err(e) = fs::remove_file(metadata_path(path)) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove slot metadata");
        }
    }
}

struct PoolLease {
    inner: Arc<PoolInner>,
    path: PathBuf,
    done: AtomicBool,
}

impl PoolLease {
    fn unlease(&self) {
        match self.inner.leased() {
            Ok(mut leased) => {
                leased.remove(&self.path);
            }
            Err(e) => warn!(error = %e, "Could not update working copy pool"),
        }
    }
}

impl DirectoryLease for PoolLease {
    fn release(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut metadata = SlotMetadata::load(&self.path).unwrap_or_else(|_| SlotMetadata::new());
        metadata.status = SlotStatus::Available;
        metadata.touch();
        if let Err(e) = metadata.save(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to return working copy to pool");
        }
        self.unlease();
        debug!(path = %self.path.display(), "Returned working copy to pool");
    }

    fn invalidate(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }

        remove_slot(&self.path);
        self.unlease();
        info!(path = %self.path.display(), "Invalidated pooled working copy");
    }
}

#[async_trait]
impl DirectoryManager for CachingDirectoryManager {
    async fn directory_for(&self, id: &RepoRef, _options: &CloneOptions) -> Result<CloneDirectory> {
        let (kind, path, provenance) = {
            let mut leased = self.inner.leased()?;
            self.allocate(id, &mut leased)?
        };

        // Leftovers from an interrupted clone are not a working copy
        if kind == DirectoryKind::Empty && path.exists() {
            remove_dir_quietly(&path);
        }

        debug!(repo = %id.slug(), path = %path.display(), ?kind, "Allocated pooled directory");

        let lease = Arc::new(PoolLease {
            inner: Arc::clone(&self.inner),
            path: path.clone(),
            done: AtomicBool::new(false),
        });
        Ok(CloneDirectory::new(kind, path, provenance, lease))
    }

    async fn prune(&self, id: &RepoRef) -> Result<Vec<PathBuf>> {
        self.cleanup(&id.owner, &id.repo)
    }
}
