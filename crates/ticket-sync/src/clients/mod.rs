//! Upstream collaborators: issue tracker, code host and ticket processor.
//!
//! The watcher only talks to these traits. Concrete implementations:
//!
//! - [`JiraClient`] - Jira Cloud REST API (search + transitions)
//! - [`GitHubClient`] - GitHub REST API (pull request listing)
//! - [`CommandProcessor`] - runs an external resolver command per ticket

mod github;
mod jira;
mod processor;

pub use github::GitHubClient;
pub use jira::{JiraClient, JiraTransition};
pub use processor::CommandProcessor;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{PrState, ProcessOutcome, PullRequest, Ticket};

/// Issue tracker holding the tickets the watcher reacts to.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Run a search query, returning at most `limit` tickets.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Ticket>>;

    /// Move a ticket to its done status, returning the transition applied.
    async fn transition_to_done(&self, ticket_key: &str) -> Result<String>;

    /// Release held connections. Called once at shutdown.
    async fn close(&self) {}
}

/// Code host holding the pull requests opened for tickets.
#[async_trait]
pub trait CodeHost: Send + Sync {
    /// List pull requests in `state`, most recently updated first.
    async fn list_pull_requests(&self, state: PrState) -> Result<Vec<PullRequest>>;

    /// Release held connections. Called once at shutdown.
    async fn close(&self) {}
}

/// Capability that turns a ticket into a pull request.
///
/// Must be safe to call more than once for the same ticket: dedup state does
/// not survive a restart.
#[async_trait]
pub trait TicketProcessor: Send + Sync {
    async fn process(&self, ticket_key: &str) -> Result<ProcessOutcome>;
}
