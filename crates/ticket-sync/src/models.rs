//! Type definitions for tickets, pull requests and tracked PR records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Tracked pull requests
// =============================================================================

/// Lifecycle status of a tracked pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrStatus {
    #[default]
    Open,
    Merged,
    Closed,
    NeedsAttention,
}

impl PrStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Merged => "merged",
            Self::Closed => "closed",
            Self::NeedsAttention => "needs_attention",
        }
    }

    /// Whether the PR is finished and eligible for cleanup.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Merged | Self::Closed)
    }
}

impl fmt::Display for PrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate CI outcome for a tracked pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CiStatus {
    #[default]
    Pending,
    Success,
    Failure,
}

impl CiStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for CiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pull request opened on behalf of a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPullRequest {
    pub pr_number: u64,
    pub pr_url: String,
    /// Repository (owner/name)
    pub repo: String,
    pub ticket_key: String,
    pub branch: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: PrStatus,
    #[serde(default)]
    pub ci_status: CiStatus,
    #[serde(default)]
    pub has_feedback: bool,
    #[serde(default)]
    pub feedback_addressed: bool,
}

impl TrackedPullRequest {
    /// Create an open record with pending CI, stamped now.
    #[must_use]
    pub fn new(pr_number: u64, pr_url: &str, repo: &str, ticket_key: &str, branch: &str) -> Self {
        Self {
            pr_number,
            pr_url: pr_url.to_string(),
            repo: repo.to_string(),
            ticket_key: ticket_key.to_string(),
            branch: branch.to_string(),
            created_at: Utc::now(),
            last_checked: None,
            status: PrStatus::Open,
            ci_status: CiStatus::Pending,
            has_feedback: false,
            feedback_addressed: false,
        }
    }

    /// Store key (`owner/name#number`).
    #[must_use]
    pub fn key(&self) -> String {
        store_key(&self.repo, self.pr_number)
    }

    /// Open, and either CI failed or review feedback is still unaddressed.
    #[must_use]
    pub fn needs_attention(&self) -> bool {
        self.status == PrStatus::Open
            && (self.ci_status == CiStatus::Failure
                || (self.has_feedback && !self.feedback_addressed))
    }
}

/// Store key for a repository and PR number.
#[must_use]
pub fn store_key(repo: &str, pr_number: u64) -> String {
    format!("{repo}#{pr_number}")
}

/// Partial update for a tracked pull request. Unset fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrUpdate {
    pub status: Option<PrStatus>,
    pub ci_status: Option<CiStatus>,
    pub has_feedback: Option<bool>,
    pub feedback_addressed: Option<bool>,
}

impl PrUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(mut self, status: PrStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn ci_status(mut self, ci_status: CiStatus) -> Self {
        self.ci_status = Some(ci_status);
        self
    }

    #[must_use]
    pub fn has_feedback(mut self, has_feedback: bool) -> Self {
        self.has_feedback = Some(has_feedback);
        self
    }

    #[must_use]
    pub fn feedback_addressed(mut self, feedback_addressed: bool) -> Self {
        self.feedback_addressed = Some(feedback_addressed);
        self
    }

    /// Merge the set fields into `pr`.
    pub fn apply_to(&self, pr: &mut TrackedPullRequest) {
        if let Some(status) = self.status {
            pr.status = status;
        }
        if let Some(ci_status) = self.ci_status {
            pr.ci_status = ci_status;
        }
        if let Some(has_feedback) = self.has_feedback {
            pr.has_feedback = has_feedback;
        }
        if let Some(feedback_addressed) = self.feedback_addressed {
            pr.feedback_addressed = feedback_addressed;
        }
    }
}

// =============================================================================
// Upstream records
// =============================================================================

/// A ticket returned by an issue tracker search.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Ticket {
    pub key: String,
    #[serde(default)]
    pub fields: serde_json::Value,
}

impl Ticket {
    #[must_use]
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            fields: serde_json::Value::Null,
        }
    }

    /// Ticket summary, when the search requested it.
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.fields.get("summary").and_then(serde_json::Value::as_str)
    }
}

/// Pull request state filter for code host listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PrState {
    Open,
    Closed,
    All,
}

impl PrState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

/// Git reference (branch)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GitRef {
    /// Branch name
    #[serde(rename = "ref")]
    pub ref_name: String,
}

/// Pull request as listed by the code host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub head: GitRef,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    pub state: String,
    #[serde(default)]
    pub html_url: String,
}

impl PullRequest {
    #[must_use]
    pub fn branch(&self) -> &str {
        &self.head.ref_name
    }

    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }
}

// =============================================================================
// Processing outcomes
// =============================================================================

/// Result status reported by a ticket processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Completed,
    Skipped,
    Failed,
}

/// Outcome of processing one ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub status: ProcessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    /// Head branch of the created PR, when the processor reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessOutcome {
    #[must_use]
    pub fn completed(pr_url: &str) -> Self {
        Self {
            status: ProcessStatus::Completed,
            pr_url: Some(pr_url.to_string()),
            branch: None,
            reason: None,
            error: None,
        }
    }

    #[must_use]
    pub fn skipped(reason: &str) -> Self {
        Self {
            status: ProcessStatus::Skipped,
            pr_url: None,
            branch: None,
            reason: Some(reason.to_string()),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: &str) -> Self {
        Self {
            status: ProcessStatus::Failed,
            pr_url: None,
            branch: None,
            reason: None,
            error: Some(error.to_string()),
        }
    }

    #[must_use]
    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = Some(branch.to_string());
        self
    }

    /// PR number parsed from `pr_url`.
    #[must_use]
    pub fn pr_number(&self) -> Option<u64> {
        self.pr_url.as_deref().and_then(pr_number_from_url)
    }
}

/// Extract the PR number from a URL such as `https://github.com/o/r/pull/5`.
#[must_use]
pub fn pr_number_from_url(url: &str) -> Option<u64> {
    let mut segments = url.trim_end_matches('/').rsplit('/');
    let number = segments.next()?.parse().ok()?;
    matches!(segments.next(), Some("pull" | "pulls")).then_some(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&PrStatus::NeedsAttention).unwrap(),
            "\"needs_attention\""
        );
        assert_eq!(serde_json::to_string(&CiStatus::Failure).unwrap(), "\"failure\"");
        assert!(PrStatus::Merged.is_terminal());
        assert!(!PrStatus::NeedsAttention.is_terminal());
    }

    #[test]
    fn test_needs_attention_truth_table() {
        let ci_states = [CiStatus::Pending, CiStatus::Success, CiStatus::Failure];
        for ci_status in ci_states {
            for has_feedback in [false, true] {
                for feedback_addressed in [false, true] {
                    let mut pr = TrackedPullRequest::new(1, "u", "o/r", "PROJ-1", "b");
                    pr.ci_status = ci_status;
                    pr.has_feedback = has_feedback;
                    pr.feedback_addressed = feedback_addressed;

                    let expected = ci_status == CiStatus::Failure
                        || (has_feedback && !feedback_addressed);
                    assert_eq!(pr.needs_attention(), expected);

                    pr.status = PrStatus::Merged;
                    assert!(!pr.needs_attention());
                }
            }
        }
    }

    #[test]
    fn test_update_only_touches_set_fields() {
        let mut pr = TrackedPullRequest::new(5, "u", "o/r", "PROJ-1", "b");
        let before = pr.clone();
        PrUpdate::new().ci_status(CiStatus::Failure).apply_to(&mut pr);

        assert_eq!(pr.ci_status, CiStatus::Failure);
        assert_eq!(pr.status, before.status);
        assert_eq!(pr.has_feedback, before.has_feedback);
        assert_eq!(pr.created_at, before.created_at);
    }

    #[test]
    fn test_pr_number_from_url() {
        assert_eq!(pr_number_from_url("https://host/o/r/pull/5"), Some(5));
        assert_eq!(pr_number_from_url("https://github.com/o/r/pull/17/"), Some(17));
        assert_eq!(pr_number_from_url("https://github.com/o/r/issues/17"), None);
        assert_eq!(pr_number_from_url("N/A"), None);
    }

    #[test]
    fn test_pull_request_deserialization() {
        let json = r#"{
            "number": 5,
            "title": "feat: add metric (PROJ-100)",
            "head": {"ref": "feature/proj-100-metric", "sha": "abc"},
            "merged_at": "2025-01-02T03:04:05Z",
            "state": "closed",
            "html_url": "https://github.com/o/r/pull/5"
        }"#;
        let pr: PullRequest = serde_json::from_str(json).unwrap();
        assert_eq!(pr.branch(), "feature/proj-100-metric");
        assert!(pr.is_merged());

        let json = r#"{"number": 7, "title": "x", "head": {"ref": "b"}, "merged_at": null, "state": "closed"}"#;
        let pr: PullRequest = serde_json::from_str(json).unwrap();
        assert!(!pr.is_merged());
    }

    #[test]
    fn test_process_outcome_parsing() {
        let outcome: ProcessOutcome =
            serde_json::from_str(r#"{"status": "completed", "pr_url": "https://host/o/r/pull/5"}"#)
                .unwrap();
        assert_eq!(outcome.status, ProcessStatus::Completed);
        assert_eq!(outcome.pr_number(), Some(5));

        let outcome: ProcessOutcome =
            serde_json::from_str(r#"{"status": "skipped", "reason": "already done"}"#).unwrap();
        assert_eq!(outcome, ProcessOutcome::skipped("already done"));
    }
}
