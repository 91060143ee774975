//! Git working copies for Drover
//!
//! This module runs git, allocates directories for working copies, clones
//! remote repositories into them and exposes the verbs handlers use on the
//! resulting working copy.

mod clone;
mod command;
mod directory;
mod pool;
mod project;
mod repo_ref;
mod retry;

pub use clone::{CloneOptions, GitCloner};
pub use command::{CommandOutput, CommandRunner, GitCommand, ProcessRunner};
pub use directory::{CloneDirectory, DirectoryKind, DirectoryLease, DirectoryManager, TmpDirectoryManager};
pub use pool::{default_cache_dir, CachingDirectoryManager, PoolConfig, PooledSlot, SlotMetadata, SlotStatus};
pub use project::{is_full_sha, GitProject, GitStatus, PushFlag, PushOptions, INITIAL_BRANCH};
pub use repo_ref::{url_with_token, RemoteRepo, RepoRef, UrlRemote, UserConfig, Visibility};
pub use retry::RetryPolicy;
