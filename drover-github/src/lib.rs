//! Drover GitHub - GitHub as a remote repository service
//!
//! [`GitHubRepo`] gives working copies clone URLs, repository creation,
//! pull requests and committer identity backed by the GitHub API.

mod client;
mod error;
mod pr;

pub use client::{noreply_email, GitHubRepo, GITHUB_HOST};
pub use error::{Error, Result};
pub use pr::PullRequest;
