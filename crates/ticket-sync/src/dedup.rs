//! Run-scoped deduplication.
//!
//! Tracks tickets the watcher is already waiting on and pull requests whose
//! merge has already been evaluated. Nothing here is persisted; a restart
//! starts from empty sets, so downstream operations must be idempotent.

use std::collections::HashSet;

/// In-memory dedup sets owned by a single watcher.
#[derive(Debug, Clone, Default)]
pub struct RunDedup {
    /// Ticket keys handed to the processor and not yet closed out by a merge
    processing_tickets: HashSet<String>,
    /// PR numbers whose merge or closure was already evaluated
    processed_prs: HashSet<u64>,
}

impl RunDedup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a ticket is in flight this run.
    #[must_use]
    pub fn is_processing(&self, ticket_key: &str) -> bool {
        self.processing_tickets.contains(ticket_key)
    }

    /// Mark a ticket as in flight.
    ///
    /// Returns `false` if it already was.
    pub fn begin_processing(&mut self, ticket_key: &str) -> bool {
        self.processing_tickets.insert(ticket_key.to_string())
    }

    /// Release a ticket so a later poll may pick it up again.
    ///
    /// Returns `true` if the ticket was in flight.
    pub fn finish_processing(&mut self, ticket_key: &str) -> bool {
        self.processing_tickets.remove(ticket_key)
    }

    /// Check if a pull request was already evaluated this run.
    #[must_use]
    pub fn is_pr_processed(&self, pr_number: u64) -> bool {
        self.processed_prs.contains(&pr_number)
    }

    /// Record that a pull request needs no further evaluation this run.
    pub fn mark_pr_processed(&mut self, pr_number: u64) {
        self.processed_prs.insert(pr_number);
    }

    /// Ticket keys currently in flight, sorted.
    #[must_use]
    pub fn processing_tickets(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.processing_tickets.iter().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    #[must_use]
    pub fn processing_count(&self) -> usize {
        self.processing_tickets.len()
    }

    #[must_use]
    pub fn processed_pr_count(&self) -> usize {
        self.processed_prs.len()
    }
}
