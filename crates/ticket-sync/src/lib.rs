//! Jira/GitHub synchronisation loop.
//!
//! This crate provides:
//! - Ticket key correlation for pull request titles and branches
//! - A run-scoped dedup tracker so repeated polls never repeat side effects
//! - A durable lifecycle store for pull requests opened on behalf of tickets
//! - REST clients for Jira and GitHub plus a command-based ticket processor
//! - The [`Watcher`] poll loop tying all of the above together
//!
//! # Architecture
//!
//! Upstream systems sit behind the [`IssueTracker`], [`CodeHost`] and
//! [`TicketProcessor`] traits, and persistence behind [`LifecycleStore`], so
//! the watcher can be driven by fakes in tests and backends can be swapped.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ticket_sync::{
//!     CommandProcessor, GitHubClient, JiraClient, JsonFileStore, WatchConfig, Watcher,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = WatchConfig {
//!     repository: "acme/data".to_string(),
//!     project_key: "PROJ".to_string(),
//!     ..WatchConfig::default()
//! };
//! let jira = JiraClient::new("https://acme.atlassian.net", "bot@acme.io", "token")?
//!     .with_done_status(&config.done_status);
//! let github = GitHubClient::new("gh-token", "acme", "data")?;
//! let processor = CommandProcessor::from_command_line("resolve-ticket --json")
//!     .ok_or_else(|| anyhow::anyhow!("empty processor command"))?;
//! let store = JsonFileStore::open("/tmp/pr_tracker.json")?;
//!
//! let mut watcher = Watcher::new(
//!     config,
//!     Arc::new(jira),
//!     Arc::new(github),
//!     Arc::new(processor),
//!     Box::new(store),
//! )?;
//! watcher.run(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clients;
pub mod config;
pub mod console;
pub mod correlate;
pub mod dedup;
pub mod error;
pub mod models;
pub mod store;
pub mod watcher;

pub use clients::{
    CodeHost, CommandProcessor, GitHubClient, IssueTracker, JiraClient, TicketProcessor,
};
pub use config::{Credentials, WatchConfig};
pub use correlate::{extract_ticket_key, TicketMatcher};
pub use dedup::RunDedup;
pub use error::{ConfigError, StoreError, StoreResult};
pub use models::{
    CiStatus, PrState, PrStatus, PrUpdate, ProcessOutcome, ProcessStatus, PullRequest, Ticket,
    TrackedPullRequest,
};
pub use store::{JsonFileStore, LifecycleStore, MemoryStore};
pub use watcher::{PollStage, TickReport, WatchEvent, Watcher};
