//! In-memory record set shared by the store backends.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{StoreError, StoreResult};
use crate::models::{store_key, PrUpdate, TrackedPullRequest};

/// Tracked PRs keyed by `owner/name#number`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrRecords {
    prs: BTreeMap<String, TrackedPullRequest>,
}

impl PrRecords {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.prs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prs.is_empty()
    }

    pub fn add(
        &mut self,
        pr_number: u64,
        pr_url: &str,
        repo: &str,
        ticket_key: &str,
        branch: &str,
    ) -> StoreResult<TrackedPullRequest> {
        let key = store_key(repo, pr_number);
        if self.prs.contains_key(&key) {
            return Err(StoreError::AlreadyTracked { key });
        }

        let pr = TrackedPullRequest::new(pr_number, pr_url, repo, ticket_key, branch);
        self.prs.insert(key, pr.clone());
        Ok(pr)
    }

    pub fn update(
        &mut self,
        repo: &str,
        pr_number: u64,
        update: &PrUpdate,
    ) -> Option<TrackedPullRequest> {
        let pr = self.prs.get_mut(&store_key(repo, pr_number))?;
        update.apply_to(pr);
        pr.last_checked = Some(Utc::now());
        Some(pr.clone())
    }

    #[must_use]
    pub fn get(&self, repo: &str, pr_number: u64) -> Option<&TrackedPullRequest> {
        self.prs.get(&store_key(repo, pr_number))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedPullRequest> {
        self.prs.values()
    }

    #[must_use]
    pub fn list_open(&self, repo: Option<&str>) -> Vec<TrackedPullRequest> {
        self.filtered(repo, |pr| pr.status == crate::models::PrStatus::Open)
    }

    #[must_use]
    pub fn list_needing_attention(&self, repo: Option<&str>) -> Vec<TrackedPullRequest> {
        self.filtered(repo, TrackedPullRequest::needs_attention)
    }

    pub fn remove(&mut self, repo: &str, pr_number: u64) -> bool {
        self.prs.remove(&store_key(repo, pr_number)).is_some()
    }

    pub fn cleanup_closed(&mut self) -> usize {
        let before = self.prs.len();
        self.prs.retain(|_, pr| !pr.status.is_terminal());
        before - self.prs.len()
    }

    fn filtered(
        &self,
        repo: Option<&str>,
        predicate: impl Fn(&TrackedPullRequest) -> bool,
    ) -> Vec<TrackedPullRequest> {
        self.prs
            .values()
            .filter(|pr| repo.is_none_or(|r| pr.repo == r))
            .filter(|pr| predicate(pr))
            .cloned()
            .collect()
    }
}
