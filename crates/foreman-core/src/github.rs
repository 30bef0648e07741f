//! Read-only GitHub access: open pull requests, open issues, repo metadata.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{OnceLock, PoisonError, RwLock};
use tracing::debug;

use crate::error::{ForemanError, Result};

/// GitHub REST API base URL.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// User-Agent header required by the GitHub API.
const USER_AGENT: &str = "foreman";

const PER_PAGE: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoSlug {
    pub owner: String,
    pub repo: String,
}

fn repo_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"github\.com[/:]([^/\s]+)/([^/\s#?]+)").expect("valid regex"))
}

/// Owner and repo from an HTTPS (`https://github.com/o/r[.git]`) or SSH
/// (`git@github.com:o/r[.git]`) URL.
pub fn parse_repo_url(url: &str) -> Option<RepoSlug> {
    let caps = repo_url_re().captures(url.trim())?;
    let repo = caps[2].trim_end_matches(".git");
    if repo.is_empty() {
        return None;
    }
    Some(RepoSlug {
        owner: caps[1].to_string(),
        repo: repo.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub html_url: String,
    pub created_at: String,
    pub updated_at: String,
    pub user: Option<GitHubUser>,
    #[serde(default)]
    pub draft: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub html_url: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Present when the "issue" is really a pull request.
    #[serde(default, skip_serializing)]
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub description: Option<String>,
    #[serde(default, rename = "stargazers_count")]
    pub stars: u64,
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub homepage: Option<String>,
}

// ---------------------------------------------------------------------------
// RepoHost
// ---------------------------------------------------------------------------

/// A hosted-git service the context builder can enrich projects from.
#[async_trait]
pub trait RepoHost: Send + Sync {
    async fn open_pull_requests(&self, slug: &RepoSlug) -> Result<Vec<PullRequest>>;

    /// Open issues, excluding pull requests.
    async fn open_issues(&self, slug: &RepoSlug) -> Result<Vec<Issue>>;

    async fn repo_info(&self, slug: &RepoSlug) -> Result<RepoInfo>;
}

/// `RepoHost` over the GitHub REST API. The token can be swapped while the
/// client is shared.
#[derive(Debug)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    token: RwLock<Option<String>>,
}

impl GitHubClient {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: RwLock::new(non_blank(token)),
        }
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = non_blank(token);
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{path}", self.api_base);
        debug!(%url, "GitHub request");
        let mut request = self
            .http
            .get(&url)
            .query(query)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", "2022-11-28");
        let token = self
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ForemanError::GitHub(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForemanError::GitHub(format!("HTTP {status} for {path}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| ForemanError::GitHub(format!("unexpected response for {path}: {e}")))
    }

    fn list_query() -> Vec<(&'static str, String)> {
        vec![("state", "open".to_string()), ("per_page", PER_PAGE.to_string())]
    }
}

fn non_blank(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.trim().is_empty())
}

#[async_trait]
impl RepoHost for GitHubClient {
    async fn open_pull_requests(&self, slug: &RepoSlug) -> Result<Vec<PullRequest>> {
        let path = format!("/repos/{}/{}/pulls", slug.owner, slug.repo);
        self.get(&path, &Self::list_query()).await
    }

    async fn open_issues(&self, slug: &RepoSlug) -> Result<Vec<Issue>> {
        let path = format!("/repos/{}/{}/issues", slug.owner, slug.repo);
        let issues: Vec<Issue> = self.get(&path, &Self::list_query()).await?;
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .collect())
    }

    async fn repo_info(&self, slug: &RepoSlug) -> Result<RepoInfo> {
        let path = format!("/repos/{}/{}", slug.owner, slug.repo);
        self.get(&path, &[]).await
    }
}
