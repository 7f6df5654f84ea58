//! GitHub REST client (the subset shipdeck needs).
//!
//! [`GitHubApi`] is the seam the revision source and the access gate depend
//! on; [`GitHubClient`] is the reqwest-backed implementation.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

const DEFAULT_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "shipdeck";

/// A commit as returned by the list-commits endpoint (subset of fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
    #[serde(default)]
    pub commit: Option<CommitDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDetail {
    #[serde(default)]
    pub message: String,
}

/// A team with access to a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubTeam {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    /// `pull`, `triage`, `push`, `maintain` or `admin`.
    pub permission: String,
}

impl GitHubTeam {
    /// Teams with `pull` only grant read access.
    pub fn is_read_only(&self) -> bool {
        self.permission == "pull"
    }
}

#[derive(Debug, Deserialize)]
struct TeamMembership {
    state: String,
}

/// Abstraction over the GitHub API for testability.
/// Real implementation: `GitHubClient`.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Commits reachable from `sha` (branch, tag or commit), newest first.
    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> anyhow::Result<Vec<GitHubCommit>>;

    /// Teams that have access to the repository.
    async fn list_teams(&self, owner: &str, repo: &str) -> anyhow::Result<Vec<GitHubTeam>>;

    /// Whether `user` is an active member of the team.
    async fn is_team_member(&self, team_id: u64, user: &str) -> anyhow::Result<bool>;

    /// Whether `user` is a collaborator on the repository.
    async fn is_collaborator(&self, owner: &str, repo: &str, user: &str) -> anyhow::Result<bool>;
}

/// reqwest-backed [`GitHubApi`].
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Self {
        Self::with_api_url(DEFAULT_API_URL, token)
    }

    /// Client against a custom API root (GitHub Enterprise, test stubs).
    pub fn with_api_url(api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// API URL for `segments`, each one percent-encoded as a single path
    /// segment. Owners, repositories and logins come from configuration and
    /// request headers, so they must not be able to reshape the path.
    fn endpoint(&self, segments: &[&str]) -> anyhow::Result<Url> {
        if let Some(bad) = segments.iter().find(|s| s.is_empty() || **s == "." || **s == "..") {
            anyhow::bail!("invalid GitHub path segment {:?}", bad);
        }
        let mut url = Url::parse(&self.api_url)
            .with_context(|| format!("Invalid GitHub API URL: {}", self.api_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("GitHub API URL cannot have a path: {}", self.api_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let req = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT);
        match &self.token {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> anyhow::Result<Vec<GitHubCommit>> {
        let resp = self
            .get(self.endpoint(&["repos", owner, repo, "commits"])?)
            .query(&[("sha", sha), ("per_page", "1")])
            .send()
            .await
            .context("Failed to send commits request to GitHub")?;

        // An empty repository answers 409 rather than an empty list.
        if resp.status() == StatusCode::CONFLICT {
            return Ok(Vec::new());
        }

        resp.error_for_status()
            .context("GitHub commits API returned error status")?
            .json::<Vec<GitHubCommit>>()
            .await
            .context("Failed to parse commits response from GitHub")
    }

    async fn list_teams(&self, owner: &str, repo: &str) -> anyhow::Result<Vec<GitHubTeam>> {
        let mut all_teams = Vec::new();
        let url = self.endpoint(&["repos", owner, repo, "teams"])?;
        let mut page = 1u32;

        loop {
            let page_param = page.to_string();
            let teams: Vec<GitHubTeam> = self
                .get(url.clone())
                .query(&[("per_page", "100"), ("page", page_param.as_str())])
                .send()
                .await
                .context("Failed to send teams request to GitHub")?
                .error_for_status()
                .context("GitHub teams API returned error status")?
                .json()
                .await
                .context("Failed to parse teams response from GitHub")?;

            let count = teams.len();
            all_teams.extend(teams);
            if count < 100 {
                break;
            }
            page += 1;
        }

        Ok(all_teams)
    }

    async fn is_team_member(&self, team_id: u64, user: &str) -> anyhow::Result<bool> {
        let team_id = team_id.to_string();
        let resp = self
            .get(self.endpoint(&["teams", &team_id, "memberships", user])?)
            .send()
            .await
            .context("Failed to send team membership request to GitHub")?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let membership = resp
            .error_for_status()
            .context("GitHub team membership API returned error status")?
            .json::<TeamMembership>()
            .await
            .context("Failed to parse team membership response from GitHub")?;
        Ok(membership.state == "active")
    }

    async fn is_collaborator(&self, owner: &str, repo: &str, user: &str) -> anyhow::Result<bool> {
        let resp = self
            .get(self.endpoint(&["repos", owner, repo, "collaborators", user])?)
            .send()
            .await
            .context("Failed to send collaborator request to GitHub")?;

        match resp.status() {
            StatusCode::NO_CONTENT => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => anyhow::bail!("GitHub collaborators API returned unexpected status {}", status),
        }
    }
}
