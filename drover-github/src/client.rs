//! GitHub-hosted repositories using octocrab

use async_trait::async_trait;
use drover_core::git::{url_with_token, RemoteRepo, RepoRef, UserConfig, Visibility};
use drover_core::Credentials;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, PullRequest, Result};

/// Public GitHub
pub const GITHUB_HOST: &str = "github.com";

/// A repository on GitHub or GitHub Enterprise
#[derive(Debug, Clone)]
pub struct GitHubRepo {
    id: RepoRef,
    host: String,
}

/// The subset of `GET /user` we need
#[derive(Debug, Deserialize)]
struct AuthenticatedUser {
    login: String,
    id: u64,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
}

impl GitHubRepo {
    /// Repository on github.com
    pub fn new(id: RepoRef) -> Self {
        Self::with_host(id, GITHUB_HOST)
    }

    /// Repository on a GitHub Enterprise host
    pub fn with_host(id: RepoRef, host: impl Into<String>) -> Self {
        Self { id, host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// API root for this host
    pub fn api_base(&self) -> String {
        if self.host == GITHUB_HOST {
            "https://api.github.com".to_string()
        } else {
            format!("https://{}/api/v3", self.host)
        }
    }

    /// Build an authenticated client
    fn client(&self, creds: &Credentials) -> Result<Octocrab> {
        let token = creds.token().ok_or_else(|| {
            Error::Auth(
                "GitHub token not found. Set DROVER_TOKEN or GITHUB_TOKEN, \
                 or add token to ~/.config/drover/secrets.toml"
                    .to_string(),
            )
        })?;

        let mut builder = Octocrab::builder().personal_token(token.to_string());
        if self.host != GITHUB_HOST {
            builder = builder
                .base_uri(self.api_base())
                .map_err(|e| Error::Parse(format!("Invalid API URL {}: {}", self.api_base(), e)))?;
        }

        builder
            .build()
            .map_err(|e| Error::Auth(format!("Failed to create GitHub client: {}", e)))
    }

    async fn authenticated_user(&self, client: &Octocrab) -> Result<AuthenticatedUser> {
        client
            .get("/user", None::<&()>)
            .await
            .map_err(Error::from_api)
    }

    /// Create the repository under the authenticated user or under the
    /// owning organization
    pub async fn create(&self, creds: &Credentials, description: &str, visibility: Visibility) -> Result<()> {
        let client = self.client(creds)?;
        let user = self.authenticated_user(&client).await?;
        let route = create_route(&self.id.owner, &user.login);

        debug!(repo = %self.id.slug(), %route, ?visibility, "Creating GitHub repository");

        let request = CreateRepoRequest {
            name: &self.id.repo,
            description,
            private: visibility == Visibility::Private,
        };
        let _: serde_json::Value = client
            .post(route, Some(&request))
            .await
            .map_err(Error::from_api)?;

        info!(repo = %self.id.slug(), "Created GitHub repository");
        Ok(())
    }

    /// Open a pull request from `head` into `base`
    pub async fn open_pull_request(
        &self,
        creds: &Credentials,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest> {
        let client = self.client(creds)?;
        let pr = client
            .pulls(&self.id.owner, &self.id.repo)
            .create(title, head, base)
            .body(body)
            .send()
            .await
            .map_err(Error::from_api)?;

        let pr = PullRequest::from(pr);
        info!(
            repo = %self.id.slug(),
            number = pr.number,
            url = pr.html_url.as_deref().unwrap_or(""),
            "Opened pull request"
        );
        Ok(pr)
    }

    /// Committer identity of the token's owner
    pub async fn committer(&self, creds: &Credentials) -> Result<UserConfig> {
        let client = self.client(creds)?;
        let user = self.authenticated_user(&client).await?;
        Ok(committer_for(user, &self.host))
    }
}

fn create_route(owner: &str, login: &str) -> String {
    if owner.eq_ignore_ascii_case(login) {
        "/user/repos".to_string()
    } else {
        format!("/orgs/{}/repos", owner)
    }
}

/// Address GitHub attributes to `login` when no public email is set
pub fn noreply_email(id: u64, login: &str, host: &str) -> String {
    format!("{}+{}@users.noreply.{}", id, login, host)
}

fn committer_for(user: AuthenticatedUser, host: &str) -> UserConfig {
    let email = match user.email {
        Some(email) if !email.trim().is_empty() => email,
        _ => noreply_email(user.id, &user.login, host),
    };
    let name = match user.name {
        Some(name) if !name.trim().is_empty() => name,
        _ => user.login,
    };
    UserConfig { name, email }
}

#[async_trait]
impl RemoteRepo for GitHubRepo {
    fn repo_ref(&self) -> &RepoRef {
        &self.id
    }

    fn clone_url(&self, creds: &Credentials) -> String {
        let url = format!("https://{}/{}/{}.git", self.host, self.id.owner, self.id.repo);
        url_with_token(&url, creds.token())
    }

    async fn create_remote(
        &self,
        creds: &Credentials,
        description: &str,
        visibility: Visibility,
    ) -> drover_core::Result<()> {
        Ok(self.create(creds, description, visibility).await?)
    }

    async fn raise_pull_request(
        &self,
        creds: &Credentials,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> drover_core::Result<()> {
        self.open_pull_request(creds, title, body, head, base).await?;
        Ok(())
    }

    async fn user_config(&self, creds: &Credentials) -> drover_core::Result<UserConfig> {
        Ok(self.committer(creds).await?)
    }
}
