//! Non-durable backend for dry runs and tests.

use super::records::PrRecords;
use super::LifecycleStore;
use crate::error::StoreResult;
use crate::models::{PrUpdate, TrackedPullRequest};

/// Lifecycle store that never touches disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: PrRecords,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LifecycleStore for MemoryStore {
    fn add(
        &mut self,
        pr_number: u64,
        pr_url: &str,
        repo: &str,
        ticket_key: &str,
        branch: &str,
    ) -> StoreResult<TrackedPullRequest> {
        self.records.add(pr_number, pr_url, repo, ticket_key, branch)
    }

    fn update(
        &mut self,
        repo: &str,
        pr_number: u64,
        update: &PrUpdate,
    ) -> StoreResult<Option<TrackedPullRequest>> {
        Ok(self.records.update(repo, pr_number, update))
    }

    fn get(&self, repo: &str, pr_number: u64) -> Option<TrackedPullRequest> {
        self.records.get(repo, pr_number).cloned()
    }

    fn list_all(&self) -> Vec<TrackedPullRequest> {
        self.records.iter().cloned().collect()
    }

    fn list_open(&self, repo: Option<&str>) -> Vec<TrackedPullRequest> {
        self.records.list_open(repo)
    }

    fn list_needing_attention(&self, repo: Option<&str>) -> Vec<TrackedPullRequest> {
        self.records.list_needing_attention(repo)
    }

    fn remove(&mut self, repo: &str, pr_number: u64) -> StoreResult<bool> {
        Ok(self.records.remove(repo, pr_number))
    }

    fn cleanup_closed(&mut self) -> StoreResult<usize> {
        Ok(self.records.cleanup_closed())
    }
}
