//! Integration tests for the watch loop.
//!
//! The Jira, GitHub and processor collaborators are replaced with in-memory
//! fakes so each tick's decisions can be observed directly.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use ticket_sync::console::Marker;
use ticket_sync::models::GitRef;
use ticket_sync::{
    CodeHost, IssueTracker, LifecycleStore, MemoryStore, PollStage, PrState, PrStatus, PrUpdate,
    ProcessOutcome, PullRequest, StoreError, StoreResult, Ticket, TicketProcessor,
    TrackedPullRequest, WatchConfig, WatchEvent, Watcher,
};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Fake collaborators
// =============================================================================

#[derive(Default)]
struct FakeTracker {
    tickets: Mutex<Vec<String>>,
    fail_search: AtomicBool,
    fail_transition: AtomicBool,
    search_calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
    transitions: Mutex<Vec<String>>,
    closed: AtomicBool,
    /// Cancelled from inside `search` to simulate an interrupt mid-tick
    cancel_on_search: Mutex<Option<CancellationToken>>,
}

impl FakeTracker {
    fn set_tickets(&self, keys: &[&str]) {
        *self.tickets.lock().unwrap() = keys.iter().map(ToString::to_string).collect();
    }

    fn transitions(&self) -> Vec<String> {
        self.transitions.lock().unwrap().clone()
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Ticket>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        if let Some(token) = self.cancel_on_search.lock().unwrap().as_ref() {
            token.cancel();
        }
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(anyhow!("Jira API error: 503 Service Unavailable"));
        }
        Ok(self
            .tickets
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .map(|key| Ticket::new(key))
            .collect())
    }

    async fn transition_to_done(&self, ticket_key: &str) -> Result<String> {
        self.transitions.lock().unwrap().push(ticket_key.to_string());
        if self.fail_transition.load(Ordering::SeqCst) {
            return Err(anyhow!("No transition to \"Done\" for {ticket_key}"));
        }
        Ok("Done".to_string())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeCodeHost {
    prs: Mutex<Vec<PullRequest>>,
    fail: AtomicBool,
    list_calls: AtomicUsize,
    closed: AtomicBool,
}

impl FakeCodeHost {
    fn set_prs(&self, prs: Vec<PullRequest>) {
        *self.prs.lock().unwrap() = prs;
    }
}

#[async_trait]
impl CodeHost for FakeCodeHost {
    async fn list_pull_requests(&self, state: PrState) -> Result<Vec<PullRequest>> {
        assert_eq!(state, PrState::Closed);
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("GitHub API error: 502 Bad Gateway"));
        }
        Ok(self.prs.lock().unwrap().clone())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeProcessor {
    outcomes: Mutex<HashMap<String, ProcessOutcome>>,
    errors: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeProcessor {
    fn set_outcome(&self, ticket_key: &str, outcome: ProcessOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(ticket_key.to_string(), outcome);
    }

    fn set_error(&self, ticket_key: &str) {
        self.errors.lock().unwrap().insert(ticket_key.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TicketProcessor for FakeProcessor {
    async fn process(&self, ticket_key: &str) -> Result<ProcessOutcome> {
        self.calls.lock().unwrap().push(ticket_key.to_string());
        if self.errors.lock().unwrap().contains(ticket_key) {
            return Err(anyhow!("processor crashed"));
        }
        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .get(ticket_key)
            .cloned()
            .unwrap_or_else(|| ProcessOutcome::skipped("no outcome configured")))
    }
}

/// Serves reads from `inner` but rejects every write, like a full disk.
struct ReadOnlyStore {
    inner: MemoryStore,
}

impl ReadOnlyStore {
    fn write_error() -> StoreError {
        StoreError::Write {
            path: "/var/lib/ticket-sync/pr_tracker.json".into(),
            source: std::io::Error::other("No space left on device"),
        }
    }
}

impl LifecycleStore for ReadOnlyStore {
    fn add(
        &mut self,
        _pr_number: u64,
        _pr_url: &str,
        _repo: &str,
        _ticket_key: &str,
        _branch: &str,
    ) -> StoreResult<TrackedPullRequest> {
        Err(Self::write_error())
    }

    fn update(
        &mut self,
        _repo: &str,
        _pr_number: u64,
        _update: &PrUpdate,
    ) -> StoreResult<Option<TrackedPullRequest>> {
        Err(Self::write_error())
    }

    fn get(&self, repo: &str, pr_number: u64) -> Option<TrackedPullRequest> {
        self.inner.get(repo, pr_number)
    }

    fn list_all(&self) -> Vec<TrackedPullRequest> {
        self.inner.list_all()
    }

    fn list_open(&self, repo: Option<&str>) -> Vec<TrackedPullRequest> {
        self.inner.list_open(repo)
    }

    fn list_needing_attention(&self, repo: Option<&str>) -> Vec<TrackedPullRequest> {
        self.inner.list_needing_attention(repo)
    }

    fn remove(&mut self, _repo: &str, _pr_number: u64) -> StoreResult<bool> {
        Err(Self::write_error())
    }

    fn cleanup_closed(&mut self) -> StoreResult<usize> {
        Err(Self::write_error())
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    tracker: Arc<FakeTracker>,
    host: Arc<FakeCodeHost>,
    processor: Arc<FakeProcessor>,
}

impl Harness {
    fn new() -> Self {
        Self {
            tracker: Arc::new(FakeTracker::default()),
            host: Arc::new(FakeCodeHost::default()),
            processor: Arc::new(FakeProcessor::default()),
        }
    }

    fn watcher(&self) -> Watcher {
        self.watcher_with_store(MemoryStore::new())
    }

    fn watcher_with_store(&self, store: impl LifecycleStore + 'static) -> Watcher {
        Watcher::new(
            config(),
            self.tracker.clone(),
            self.host.clone(),
            self.processor.clone(),
            Box::new(store),
        )
        .unwrap()
        .with_console(false)
    }
}

fn config() -> WatchConfig {
    WatchConfig {
        repository: "o/r".to_string(),
        project_key: "PROJ".to_string(),
        ..WatchConfig::default()
    }
}

fn pull(number: u64, title: &str, branch: &str, merged: bool) -> PullRequest {
    PullRequest {
        number,
        title: title.to_string(),
        head: GitRef {
            ref_name: branch.to_string(),
        },
        merged_at: merged.then(Utc::now),
        state: "closed".to_string(),
        html_url: format!("https://github.com/o/r/pull/{number}"),
    }
}

fn completed(number: u64) -> ProcessOutcome {
    ProcessOutcome::completed(&format!("https://host/o/r/pull/{number}"))
}

// =============================================================================
// Trigger detection
// =============================================================================

#[tokio::test]
async fn test_completed_ticket_stays_in_flight() {
    let h = Harness::new();
    h.tracker.set_tickets(&["PROJ-100"]);
    h.processor.set_outcome(
        "PROJ-100",
        completed(5).with_branch("feature/proj-100-metric"),
    );
    let mut watcher = h.watcher();

    let report = watcher.tick().await;

    assert!(report.events.contains(&WatchEvent::Processed {
        ticket_key: "PROJ-100".to_string(),
        pr_url: Some("https://host/o/r/pull/5".to_string()),
    }));
    assert!(watcher.dedup().is_processing("PROJ-100"));

    let record = watcher.store().get("o/r", 5).expect("PR should be tracked");
    assert_eq!(record.ticket_key, "PROJ-100");
    assert_eq!(record.branch, "feature/proj-100-metric");
    assert_eq!(record.status, PrStatus::Open);
}

#[tokio::test]
async fn test_trigger_query_uses_project_and_status() {
    let h = Harness::new();
    let mut watcher = h.watcher();

    watcher.tick().await;

    assert_eq!(
        h.tracker.queries.lock().unwrap().as_slice(),
        ["project = PROJ AND status = \"Ready for Agent\"".to_string()]
    );
}

#[tokio::test]
async fn test_ticket_seen_twice_is_processed_once() {
    let h = Harness::new();
    h.tracker.set_tickets(&["PROJ-100"]);
    h.processor.set_outcome("PROJ-100", completed(5));
    let mut watcher = h.watcher();

    watcher.tick().await;
    let second = watcher.tick().await;

    assert_eq!(h.processor.calls(), vec!["PROJ-100"]);
    assert!(second.is_empty());
}

#[tokio::test]
async fn test_skipped_and_failed_tickets_are_released() {
    let h = Harness::new();
    h.tracker
        .set_tickets(&["PROJ-1", "PROJ-2", "PROJ-3", "PROJ-4"]);
    h.processor
        .set_outcome("PROJ-1", ProcessOutcome::skipped("already done"));
    h.processor
        .set_outcome("PROJ-2", ProcessOutcome::failed("tests failed"));
    h.processor.set_error("PROJ-3");
    h.processor.set_outcome("PROJ-4", completed(40));
    let mut watcher = h.watcher();

    let report = watcher.tick().await;

    assert_eq!(watcher.dedup().processing_tickets(), vec!["PROJ-4"]);
    assert_eq!(report.count(Marker::Skipped), 1);
    assert_eq!(report.count(Marker::Failure), 2);
    assert!(report.events.contains(&WatchEvent::ProcessingFailed {
        ticket_key: "PROJ-3".to_string(),
        error: "processor crashed".to_string(),
    }));

    // Released tickets are retried on the next poll; the completed one is not.
    watcher.tick().await;
    let calls = h.processor.calls();
    assert_eq!(calls.len(), 7);
    assert_eq!(calls.iter().filter(|k| *k == "PROJ-4").count(), 1);
}

#[tokio::test]
async fn test_processor_error_does_not_stop_tick() {
    let h = Harness::new();
    h.tracker.set_tickets(&["PROJ-1", "PROJ-2"]);
    h.processor.set_error("PROJ-1");
    h.processor.set_outcome("PROJ-2", completed(2));
    h.host
        .set_prs(vec![pull(9, "fix: typo (PROJ-9)", "fix/typo", true)]);
    let mut watcher = h.watcher();

    let report = watcher.tick().await;

    assert_eq!(h.processor.calls(), vec!["PROJ-1", "PROJ-2"]);
    assert_eq!(h.tracker.transitions(), vec!["PROJ-9"]);
    assert!(report.poll_failure().is_none());
}

// =============================================================================
// Merge transition
// =============================================================================

#[tokio::test]
async fn test_merged_pr_transitions_ticket_once() {
    let h = Harness::new();
    h.tracker.set_tickets(&["PROJ-100"]);
    h.processor.set_outcome("PROJ-100", completed(5));
    let mut watcher = h.watcher();
    watcher.tick().await;
    assert!(watcher.dedup().is_processing("PROJ-100"));

    h.tracker.set_tickets(&[]);
    h.host.set_prs(vec![pull(
        5,
        "feat: add metric (PROJ-100)",
        "feature/proj-100-metric",
        true,
    )]);

    let report = watcher.tick().await;

    assert_eq!(h.tracker.transitions(), vec!["PROJ-100"]);
    assert!(!watcher.dedup().is_processing("PROJ-100"));
    assert!(watcher.dedup().is_pr_processed(5));
    assert_eq!(
        report.events,
        vec![
            WatchEvent::MergeDetected {
                pr_number: 5,
                ticket_key: "PROJ-100".to_string(),
                done_status: "Done".to_string(),
            },
            WatchEvent::Transitioned {
                ticket_key: "PROJ-100".to_string(),
                transition: "Done".to_string(),
            },
        ]
    );
    assert_eq!(
        watcher.store().get("o/r", 5).map(|pr| pr.status),
        Some(PrStatus::Merged)
    );

    watcher.tick().await;
    assert_eq!(h.tracker.transitions().len(), 1);
}

#[tokio::test]
async fn test_unmerged_pr_is_never_transitioned_or_cached() {
    let h = Harness::new();
    h.host
        .set_prs(vec![pull(7, "feat: abandoned (PROJ-7)", "proj-7", false)]);
    let mut watcher = h.watcher();

    watcher.tick().await;
    watcher.tick().await;

    assert!(h.tracker.transitions().is_empty());
    assert!(!watcher.dedup().is_pr_processed(7));
    assert_eq!(h.host.list_calls.load(Ordering::SeqCst), 2);

    // A late merge is still picked up.
    h.host
        .set_prs(vec![pull(7, "feat: abandoned (PROJ-7)", "proj-7", true)]);
    watcher.tick().await;
    assert_eq!(h.tracker.transitions(), vec!["PROJ-7"]);
}

#[tokio::test]
async fn test_uncorrelated_merged_pr_is_cached() {
    let h = Harness::new();
    h.host
        .set_prs(vec![pull(9, "chore: bump deps", "renovate/deps", true)]);
    let mut watcher = h.watcher();

    let report = watcher.tick().await;

    assert!(report.is_empty());
    assert!(h.tracker.transitions().is_empty());
    assert!(watcher.dedup().is_pr_processed(9));
}

#[tokio::test]
async fn test_failed_transition_is_not_retried() {
    let h = Harness::new();
    h.tracker.fail_transition.store(true, Ordering::SeqCst);
    h.host
        .set_prs(vec![pull(5, "feat: add metric", "feature/proj-100-metric", true)]);
    let mut watcher = h.watcher();

    let report = watcher.tick().await;
    watcher.tick().await;

    assert_eq!(h.tracker.transitions(), vec!["PROJ-100"]);
    assert!(watcher.dedup().is_pr_processed(5));
    assert_eq!(report.count(Marker::Failure), 1);
    assert!(matches!(
        report.events.last(),
        Some(WatchEvent::TransitionFailed { ticket_key, .. }) if ticket_key == "PROJ-100"
    ));
}

#[tokio::test]
async fn test_closed_unmerged_tracked_pr_is_marked_closed() {
    let h = Harness::new();
    let mut store = MemoryStore::new();
    store
        .add(7, "https://github.com/o/r/pull/7", "o/r", "PROJ-7", "proj-7")
        .unwrap();
    h.host
        .set_prs(vec![pull(7, "feat: abandoned (PROJ-7)", "proj-7", false)]);
    let mut watcher = h.watcher_with_store(store);

    watcher.tick().await;

    let record = watcher.store().get("o/r", 7).unwrap();
    assert_eq!(record.status, PrStatus::Closed);
    assert!(record.last_checked.is_some());
    assert!(!watcher.dedup().is_pr_processed(7));
}

// =============================================================================
// Store failures
// =============================================================================

#[tokio::test]
async fn test_failed_tracking_is_reported() {
    let h = Harness::new();
    h.tracker.set_tickets(&["PROJ-100"]);
    h.processor.set_outcome("PROJ-100", completed(5));
    let mut watcher = h.watcher_with_store(ReadOnlyStore {
        inner: MemoryStore::new(),
    });

    let report = watcher.tick().await;

    assert!(report.events.contains(&WatchEvent::TrackingFailed {
        ticket_key: "PROJ-100".to_string(),
        error: "Failed to write PR store /var/lib/ticket-sync/pr_tracker.json: No space left on device"
            .to_string(),
    }));
    assert_eq!(report.count(Marker::Failure), 1);
    assert_eq!(report.count(Marker::Success), 1);
    // The PR exists upstream, so the ticket must not be picked up again.
    assert!(watcher.dedup().is_processing("PROJ-100"));
    assert!(watcher.store().get("o/r", 5).is_none());
}

#[tokio::test]
async fn test_failed_status_sync_is_reported() {
    let h = Harness::new();
    let mut inner = MemoryStore::new();
    inner
        .add(7, "https://github.com/o/r/pull/7", "o/r", "PROJ-7", "proj-7")
        .unwrap();
    h.host
        .set_prs(vec![pull(7, "feat: abandoned (PROJ-7)", "proj-7", false)]);
    let mut watcher = h.watcher_with_store(ReadOnlyStore { inner });

    let report = watcher.tick().await;

    assert_eq!(report.events.len(), 1);
    assert!(matches!(
        &report.events[0],
        WatchEvent::TrackingFailed { ticket_key, .. } if ticket_key == "PROJ-7"
    ));
    assert!(report.poll_failure().is_none());
    assert_eq!(watcher.store().get("o/r", 7).unwrap().status, PrStatus::Open);
}

// =============================================================================
// Poll failures
// =============================================================================

#[tokio::test]
async fn test_issue_tracker_failure_skips_code_host_stage() {
    let h = Harness::new();
    h.tracker.fail_search.store(true, Ordering::SeqCst);
    h.host
        .set_prs(vec![pull(5, "feat: add metric (PROJ-100)", "b", true)]);
    let mut watcher = h.watcher();

    let report = watcher.tick().await;

    assert_eq!(report.poll_failure(), Some(PollStage::IssueTracker));
    assert_eq!(h.host.list_calls.load(Ordering::SeqCst), 0);
    assert!(!watcher.dedup().is_pr_processed(5));

    // The next healthy tick catches up.
    h.tracker.fail_search.store(false, Ordering::SeqCst);
    let report = watcher.tick().await;
    assert!(report.poll_failure().is_none());
    assert_eq!(h.tracker.transitions(), vec!["PROJ-100"]);
}

#[tokio::test]
async fn test_code_host_failure_is_reported() {
    let h = Harness::new();
    h.tracker.set_tickets(&["PROJ-1"]);
    h.host.fail.store(true, Ordering::SeqCst);
    let mut watcher = h.watcher();

    let report = watcher.tick().await;

    assert_eq!(h.processor.calls(), vec!["PROJ-1"]);
    assert_eq!(report.poll_failure(), Some(PollStage::CodeHost));
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_interrupt_mid_tick_finishes_tick_then_stops() {
    let h = Harness::new();
    let shutdown = CancellationToken::new();
    *h.tracker.cancel_on_search.lock().unwrap() = Some(shutdown.clone());
    h.host
        .set_prs(vec![pull(5, "feat: add metric (PROJ-100)", "b", true)]);
    let mut watcher = h.watcher();

    watcher.run(shutdown).await;

    assert_eq!(h.tracker.search_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.host.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.tracker.transitions(), vec!["PROJ-100"]);
    assert!(h.tracker.closed.load(Ordering::SeqCst));
    assert!(h.host.closed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_during_sleep_stops_loop() {
    let h = Harness::new();
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(90)).await;
        token.cancel();
    });
    let mut watcher = h.watcher();

    watcher.run(shutdown).await;

    // Ticks at t=0s and t=60s; the interrupt lands during the second sleep.
    assert_eq!(h.tracker.search_calls.load(Ordering::SeqCst), 2);
    assert!(h.tracker.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_already_cancelled_does_not_poll() {
    let h = Harness::new();
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let mut watcher = h.watcher();

    watcher.run(shutdown).await;

    assert_eq!(h.tracker.search_calls.load(Ordering::SeqCst), 0);
    assert!(h.host.closed.load(Ordering::SeqCst));
}
