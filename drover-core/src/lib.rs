//! Drover Core - git working copies for repository automation
//!
//! Handlers receive a [`GitProject`] for a remote repository, run git verbs
//! on it and hand the directory back when they are done.

pub mod config;
pub mod credentials;
pub mod error;
pub mod git;
pub mod redact;

pub use config::Config;
pub use credentials::Credentials;
pub use error::{Error, Result};
pub use git::{CloneOptions, GitCloner, GitProject, RemoteRepo, RepoRef};
