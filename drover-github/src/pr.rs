//! Pull requests opened from working copies

use chrono::{DateTime, Utc};
use octocrab::models::pulls::PullRequest as OctocrabPR;
use serde::{Deserialize, Serialize};

/// Pull request representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// PR number
    pub number: u64,
    pub title: String,
    /// Web page of the PR, when GitHub reports one
    pub html_url: Option<String>,
    /// Head branch name
    pub head_branch: String,
    /// Base branch name
    pub base_branch: String,
    pub created_at: DateTime<Utc>,
}

impl From<OctocrabPR> for PullRequest {
    fn from(pr: OctocrabPR) -> Self {
        PullRequest {
            number: pr.number,
            title: pr.title.unwrap_or_default(),
            html_url: pr.html_url.map(|u| u.to_string()),
            head_branch: pr.head.ref_field,
            base_branch: pr.base.ref_field,
            created_at: pr.created_at.unwrap_or_else(Utc::now),
        }
    }
}
