//! Lifecycle store for pull requests opened on behalf of tickets.

mod file;
mod memory;
mod records;

pub use file::{default_store_path, JsonFileStore};
pub use memory::MemoryStore;
pub use records::PrRecords;

use crate::error::StoreResult;
use crate::models::{PrUpdate, TrackedPullRequest};

/// Storage backend for tracked pull requests.
///
/// Implementations assume a single writer. Mutating operations are durable
/// once they return `Ok`.
pub trait LifecycleStore: Send {
    /// Start tracking a new PR as `open` with `pending` CI.
    ///
    /// Fails with [`StoreError::AlreadyTracked`](crate::StoreError::AlreadyTracked)
    /// if the repository already has a record for `pr_number`.
    fn add(
        &mut self,
        pr_number: u64,
        pr_url: &str,
        repo: &str,
        ticket_key: &str,
        branch: &str,
    ) -> StoreResult<TrackedPullRequest>;

    /// Merge `update` into an existing record and stamp `last_checked`.
    ///
    /// Returns `Ok(None)` if the record does not exist.
    fn update(
        &mut self,
        repo: &str,
        pr_number: u64,
        update: &PrUpdate,
    ) -> StoreResult<Option<TrackedPullRequest>>;

    fn get(&self, repo: &str, pr_number: u64) -> Option<TrackedPullRequest>;

    /// All records, ordered by store key.
    fn list_all(&self) -> Vec<TrackedPullRequest>;

    /// Open records, optionally restricted to one repository.
    fn list_open(&self, repo: Option<&str>) -> Vec<TrackedPullRequest>;

    /// Open records with failed CI or unaddressed feedback.
    fn list_needing_attention(&self, repo: Option<&str>) -> Vec<TrackedPullRequest>;

    /// Stop tracking a PR. Returns whether a record was removed.
    fn remove(&mut self, repo: &str, pr_number: u64) -> StoreResult<bool>;

    /// Drop every merged or closed record and return how many were removed.
    fn cleanup_closed(&mut self) -> StoreResult<usize>;
}
