//! GitHub API client for pull request polling.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use std::time::Duration;
use tracing::debug;

use super::CodeHost;
use crate::models::{PrState, PullRequest};

const GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_PAGE_SIZE: usize = 30;

/// GitHub API client scoped to one repository.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    token: String,
    owner: String,
    repo: String,
    api_url: String,
    page_size: usize,
}

impl GitHubClient {
    /// Create a new GitHub client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(token: &str, owner: &str, repo: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("ticket-sync/1.0"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            token: token.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            api_url: GITHUB_API_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Point the client at another API root (GitHub Enterprise, tests).
    #[must_use]
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    /// Number of pull requests fetched per listing.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Get the full repository path (owner/repo)
    #[must_use]
    pub fn repo_path(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// List pull requests, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_pulls(&self, state: PrState) -> Result<Vec<PullRequest>> {
        let url = format!("{}/repos/{}/{}/pulls", self.api_url, self.owner, self.repo);
        debug!(repo = %self.repo_path(), state = state.as_str(), "Listing pull requests");
        let per_page = self.page_size.to_string();

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .query(&[
                ("state", state.as_str()),
                ("sort", "updated"),
                ("direction", "desc"),
                ("per_page", per_page.as_str()),
            ])
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("GitHub API error: {status} - {body}"));
        }

        response
            .json()
            .await
            .context("Failed to parse pull request list response")
    }
}

#[async_trait]
impl CodeHost for GitHubClient {
    async fn list_pull_requests(&self, state: PrState) -> Result<Vec<PullRequest>> {
        self.list_pulls(state).await
    }

    async fn close(&self) {
        debug!(repo = %self.repo_path(), "Closing GitHub client");
    }
}
