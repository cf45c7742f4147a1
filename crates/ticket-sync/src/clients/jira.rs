//! Jira Cloud REST client.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::IssueTracker;
use crate::models::Ticket;

const SEARCH_FIELDS: &str = "summary,status";
const DEFAULT_DONE_STATUS: &str = "Done";

/// Jira API client using basic auth (account email + API token).
#[derive(Debug, Clone)]
pub struct JiraClient {
    client: reqwest::Client,
    base_url: String,
    email: String,
    api_token: String,
    done_status: String,
}

/// A workflow transition available on an issue.
#[derive(Debug, Clone, Deserialize)]
pub struct JiraTransition {
    pub id: String,
    pub name: String,
    /// Status the transition leads to
    #[serde(default)]
    pub to: Option<TransitionTarget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionTarget {
    pub name: String,
}

impl JiraTransition {
    /// Whether this transition reaches `status` (by target or transition name).
    #[must_use]
    pub fn reaches(&self, status: &str) -> bool {
        self.to
            .as_ref()
            .is_some_and(|to| to.name.eq_ignore_ascii_case(status))
            || self.name.eq_ignore_ascii_case(status)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<Ticket>,
}

#[derive(Debug, Deserialize)]
struct TransitionsResponse {
    #[serde(default)]
    transitions: Vec<JiraTransition>,
}

#[derive(Debug, Serialize)]
struct TransitionRequest<'a> {
    transition: TransitionId<'a>,
}

#[derive(Debug, Serialize)]
struct TransitionId<'a> {
    id: &'a str,
}

impl JiraClient {
    /// Create a new Jira client for the instance at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, email: &str, api_token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("ticket-sync/1.0"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
            api_token: api_token.to_string(),
            done_status: DEFAULT_DONE_STATUS.to_string(),
        })
    }

    /// Set the status used by [`IssueTracker::transition_to_done`].
    #[must_use]
    pub fn with_done_status(mut self, done_status: &str) -> Self {
        self.done_status = done_status.to_string();
        self
    }

    /// Search issues with JQL.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn search_issues(&self, jql: &str, max_results: usize) -> Result<Vec<Ticket>> {
        let url = format!("{}/rest/api/3/search/jql", self.base_url);
        debug!(jql = %jql, max_results, "Searching Jira issues");
        let max_results = max_results.to_string();

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .query(&[
                ("jql", jql),
                ("maxResults", max_results.as_str()),
                ("fields", SEARCH_FIELDS),
            ])
            .send()
            .await
            .context("Failed to send Jira search request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Jira API error: {status} - {body}"));
        }

        let result: SearchResponse = response
            .json()
            .await
            .context("Failed to parse Jira search response")?;
        Ok(result.issues)
    }

    /// List the transitions currently available on an issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_transitions(&self, issue_key: &str) -> Result<Vec<JiraTransition>> {
        let url = format!("{}/rest/api/3/issue/{issue_key}/transitions", self.base_url);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .send()
            .await
            .context("Failed to send Jira transitions request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Jira API error listing transitions for {issue_key}: {status} - {body}"
            ));
        }

        let result: TransitionsResponse = response
            .json()
            .await
            .context("Failed to parse Jira transitions response")?;
        Ok(result.transitions)
    }

    /// Move an issue to `target_status`, returning the transition name used.
    ///
    /// # Errors
    ///
    /// Returns an error if no available transition reaches the status or the
    /// API call fails.
    pub async fn transition_issue(&self, issue_key: &str, target_status: &str) -> Result<String> {
        let transitions = self.list_transitions(issue_key).await?;

        let Some(transition) = transitions.iter().find(|t| t.reaches(target_status)) else {
            let available: Vec<&str> = transitions.iter().map(|t| t.name.as_str()).collect();
            return Err(anyhow!(
                "No transition to \"{target_status}\" for {issue_key} (available: {})",
                available.join(", ")
            ));
        };

        let url = format!("{}/rest/api/3/issue/{issue_key}/transitions", self.base_url);
        let request = TransitionRequest {
            transition: TransitionId { id: &transition.id },
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .json(&request)
            .send()
            .await
            .context("Failed to send Jira transition request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Jira API error transitioning {issue_key}: {status} - {body}"
            ));
        }

        info!(
            issue = %issue_key,
            transition = %transition.name,
            "Transitioned Jira issue"
        );
        Ok(transition.name.clone())
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Ticket>> {
        self.search_issues(query, limit).await
    }

    async fn transition_to_done(&self, ticket_key: &str) -> Result<String> {
        self.transition_issue(ticket_key, &self.done_status).await
    }

    async fn close(&self) {
        debug!("Closing Jira client");
    }
}
