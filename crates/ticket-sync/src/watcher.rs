//! The watch loop.
//!
//! Each tick runs two stages in order:
//!
//! 1. **Trigger detection**: tickets in the trigger status are handed to the
//!    [`TicketProcessor`], at most once while they stay in flight.
//! 2. **Merge transition**: merged pull requests are correlated back to a
//!    ticket, which is transitioned to the done status at most once per run.
//!
//! A tick is never interrupted. Shutdown is honored between ticks and during
//! the inter-tick sleep.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clients::{CodeHost, IssueTracker, TicketProcessor};
use crate::config::WatchConfig;
use crate::console::{self, Marker};
use crate::correlate::TicketMatcher;
use crate::dedup::RunDedup;
use crate::error::{ConfigError, StoreError};
use crate::models::{PrState, PrStatus, PrUpdate, ProcessOutcome, ProcessStatus, PullRequest};
use crate::store::LifecycleStore;

/// Stage of a tick that talks to an upstream system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStage {
    IssueTracker,
    CodeHost,
}

impl fmt::Display for PollStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IssueTracker => f.write_str("issue tracker"),
            Self::CodeHost => f.write_str("code host"),
        }
    }
}

/// Something the watcher noticed or did during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    TicketFound {
        ticket_key: String,
        trigger_status: String,
    },
    ProcessingStarted {
        ticket_key: String,
    },
    /// The processor opened a pull request
    Processed {
        ticket_key: String,
        pr_url: Option<String>,
    },
    Skipped {
        ticket_key: String,
        reason: String,
    },
    ProcessingFailed {
        ticket_key: String,
        error: String,
    },
    MergeDetected {
        pr_number: u64,
        ticket_key: String,
        done_status: String,
    },
    Transitioned {
        ticket_key: String,
        transition: String,
    },
    TransitionFailed {
        ticket_key: String,
        error: String,
    },
    /// The lifecycle store rejected a write for this ticket's PR
    TrackingFailed {
        ticket_key: String,
        error: String,
    },
    /// An upstream call failed and the rest of the stage was abandoned
    PollFailed { stage: PollStage, error: String },
}

impl WatchEvent {
    /// Console marker for this event.
    #[must_use]
    pub const fn marker(&self) -> Marker {
        match self {
            Self::Processed { .. } | Self::Transitioned { .. } => Marker::Success,
            Self::Skipped { .. } => Marker::Skipped,
            Self::ProcessingFailed { .. }
            | Self::TransitionFailed { .. }
            | Self::TrackingFailed { .. }
            | Self::PollFailed { .. } => Marker::Failure,
            Self::TicketFound { .. }
            | Self::ProcessingStarted { .. }
            | Self::MergeDetected { .. } => Marker::Info,
        }
    }
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TicketFound {
                ticket_key,
                trigger_status,
            } => write!(f, "Found ticket {ticket_key} in \"{trigger_status}\""),
            Self::ProcessingStarted { ticket_key } => write!(f, "Processing {ticket_key}..."),
            Self::Processed { ticket_key, pr_url } => write!(
                f,
                "{ticket_key} -> PR created: {}",
                pr_url.as_deref().unwrap_or("N/A")
            ),
            Self::Skipped { ticket_key, reason } => write!(f, "{ticket_key} skipped: {reason}"),
            Self::ProcessingFailed { ticket_key, error } => {
                write!(f, "{ticket_key} failed: {error}")
            }
            Self::MergeDetected {
                pr_number,
                ticket_key,
                done_status,
            } => write!(
                f,
                "PR #{pr_number} merged -> transitioning {ticket_key} to \"{done_status}\""
            ),
            Self::Transitioned {
                ticket_key,
                transition,
            } => write!(f, "{ticket_key} transitioned to {transition}"),
            Self::TransitionFailed { ticket_key, error } => {
                write!(f, "Failed to transition {ticket_key}: {error}")
            }
            Self::TrackingFailed { ticket_key, error } => {
                write!(f, "Failed to track PR for {ticket_key}: {error}")
            }
            Self::PollFailed { stage, error } => write!(f, "Error during {stage} poll: {error}"),
        }
    }
}

/// Events produced by one tick, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub events: Vec<WatchEvent>,
}

impl TickReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events with the given marker.
    #[must_use]
    pub fn count(&self, marker: Marker) -> usize {
        self.events.iter().filter(|e| e.marker() == marker).count()
    }

    /// Stage that failed, if any.
    #[must_use]
    pub fn poll_failure(&self) -> Option<PollStage> {
        self.events.iter().find_map(|e| match e {
            WatchEvent::PollFailed { stage, .. } => Some(*stage),
            _ => None,
        })
    }
}

/// Polls the issue tracker and code host and keeps them in sync.
pub struct Watcher {
    config: WatchConfig,
    matcher: TicketMatcher,
    issues: Arc<dyn IssueTracker>,
    code_host: Arc<dyn CodeHost>,
    processor: Arc<dyn TicketProcessor>,
    store: Box<dyn LifecycleStore>,
    dedup: RunDedup,
    console: bool,
}

impl Watcher {
    /// Create a watcher with empty dedup state.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn new(
        config: WatchConfig,
        issues: Arc<dyn IssueTracker>,
        code_host: Arc<dyn CodeHost>,
        processor: Arc<dyn TicketProcessor>,
        store: Box<dyn LifecycleStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let matcher =
            TicketMatcher::new(&config.project_key).map_err(|e| ConfigError::InvalidValue {
                name: "project_key",
                reason: e.to_string(),
            })?;

        Ok(Self {
            config,
            matcher,
            issues,
            code_host,
            processor,
            store,
            dedup: RunDedup::new(),
            console: true,
        })
    }

    /// Print console lines for each event (on by default).
    #[must_use]
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    #[must_use]
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    #[must_use]
    pub fn dedup(&self) -> &RunDedup {
        &self.dedup
    }

    #[must_use]
    pub fn store(&self) -> &dyn LifecycleStore {
        self.store.as_ref()
    }

    /// Run ticks until `shutdown` is cancelled, then close the clients.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            repo = %self.config.repository,
            project = %self.config.project_key,
            interval_secs = self.config.poll_interval.as_secs(),
            "Starting watch loop"
        );

        while !shutdown.is_cancelled() {
            let report = self.tick().await;
            debug!(
                events = report.events.len(),
                in_flight = self.dedup.processing_count(),
                processed_prs = self.dedup.processed_pr_count(),
                "Tick complete"
            );

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        self.shutdown().await;
    }

    /// Run one tick: trigger detection, then merge transition.
    ///
    /// An issue tracker failure skips the code host stage for this tick.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        if let Err(e) = self.poll_tickets(&mut report).await {
            self.emit(
                &mut report,
                WatchEvent::PollFailed {
                    stage: PollStage::IssueTracker,
                    error: format!("{e:#}"),
                },
            );
            return report;
        }

        if let Err(e) = self.poll_merges(&mut report).await {
            self.emit(
                &mut report,
                WatchEvent::PollFailed {
                    stage: PollStage::CodeHost,
                    error: format!("{e:#}"),
                },
            );
        }

        report
    }

    async fn poll_tickets(&mut self, report: &mut TickReport) -> anyhow::Result<()> {
        let jql = self.config.trigger_jql();
        let tickets = self.issues.search(&jql, self.config.search_limit).await?;
        debug!(count = tickets.len(), "Fetched trigger tickets");

        for ticket in tickets {
            let ticket_key = ticket.key;
            if self.dedup.is_processing(&ticket_key) {
                continue;
            }

            self.emit(
                report,
                WatchEvent::TicketFound {
                    ticket_key: ticket_key.clone(),
                    trigger_status: self.config.trigger_status.clone(),
                },
            );
            self.dedup.begin_processing(&ticket_key);
            self.emit(
                report,
                WatchEvent::ProcessingStarted {
                    ticket_key: ticket_key.clone(),
                },
            );

            let outcome = match self.processor.process(&ticket_key).await {
                Ok(outcome) => outcome,
                Err(e) => ProcessOutcome::failed(&format!("{e:#}")),
            };

            match outcome.status {
                ProcessStatus::Completed => {
                    self.emit(
                        report,
                        WatchEvent::Processed {
                            ticket_key: ticket_key.clone(),
                            pr_url: outcome.pr_url.clone(),
                        },
                    );
                    self.track_created_pr(report, &ticket_key, &outcome);
                }
                ProcessStatus::Skipped => {
                    self.dedup.finish_processing(&ticket_key);
                    self.emit(
                        report,
                        WatchEvent::Skipped {
                            ticket_key,
                            reason: outcome.reason.unwrap_or_else(|| "N/A".to_string()),
                        },
                    );
                }
                ProcessStatus::Failed => {
                    self.dedup.finish_processing(&ticket_key);
                    self.emit(
                        report,
                        WatchEvent::ProcessingFailed {
                            ticket_key,
                            error: outcome
                                .error
                                .unwrap_or_else(|| "Unknown error".to_string()),
                        },
                    );
                }
            }
        }

        Ok(())
    }

    async fn poll_merges(&mut self, report: &mut TickReport) -> anyhow::Result<()> {
        let prs = self.code_host.list_pull_requests(PrState::Closed).await?;
        debug!(count = prs.len(), "Fetched closed pull requests");

        for pr in prs {
            // Unmerged PRs stay uncached so a later merge is still seen.
            if !pr.is_merged() {
                self.sync_tracked_status(report, &pr, PrStatus::Closed);
                continue;
            }
            if self.dedup.is_pr_processed(pr.number) {
                continue;
            }

            self.sync_tracked_status(report, &pr, PrStatus::Merged);

            let Some(ticket_key) = self.matcher.find_in_pr(&pr.title, pr.branch()) else {
                debug!(pr = pr.number, "Merged PR has no ticket key");
                self.dedup.mark_pr_processed(pr.number);
                continue;
            };

            self.emit(
                report,
                WatchEvent::MergeDetected {
                    pr_number: pr.number,
                    ticket_key: ticket_key.clone(),
                    done_status: self.config.done_status.clone(),
                },
            );

            match self.issues.transition_to_done(&ticket_key).await {
                Ok(transition) => {
                    self.dedup.finish_processing(&ticket_key);
                    self.emit(
                        report,
                        WatchEvent::Transitioned {
                            ticket_key,
                            transition,
                        },
                    );
                }
                Err(e) => {
                    self.emit(
                        report,
                        WatchEvent::TransitionFailed {
                            ticket_key,
                            error: format!("{e:#}"),
                        },
                    );
                }
            }

            // One attempt per merge per run, successful or not.
            self.dedup.mark_pr_processed(pr.number);
        }

        Ok(())
    }

    /// Start tracking the PR a completed outcome reports.
    fn track_created_pr(
        &mut self,
        report: &mut TickReport,
        ticket_key: &str,
        outcome: &ProcessOutcome,
    ) {
        let Some(pr_url) = outcome.pr_url.as_deref() else {
            warn!(ticket = %ticket_key, "Processor completed without a PR URL");
            return;
        };
        let Some(pr_number) = outcome.pr_number() else {
            warn!(ticket = %ticket_key, url = %pr_url, "Could not parse PR number from URL");
            return;
        };
        let branch = outcome.branch.as_deref().unwrap_or_default();

        match self.store.add(
            pr_number,
            pr_url,
            &self.config.repository,
            ticket_key,
            branch,
        ) {
            Ok(record) => info!(pr = %record.key(), ticket = %ticket_key, "Tracking pull request"),
            Err(StoreError::AlreadyTracked { key }) => {
                debug!(pr = %key, "Pull request already tracked");
            }
            Err(e) => self.emit(
                report,
                WatchEvent::TrackingFailed {
                    ticket_key: ticket_key.to_string(),
                    error: e.to_string(),
                },
            ),
        }
    }

    /// Move a tracked record to a terminal status once the code host shows it.
    fn sync_tracked_status(
        &mut self,
        report: &mut TickReport,
        pr: &PullRequest,
        status: PrStatus,
    ) {
        let repo = &self.config.repository;
        let Some(record) = self.store.get(repo, pr.number) else {
            return;
        };
        if record.status.is_terminal() {
            return;
        }

        match self
            .store
            .update(repo, pr.number, &PrUpdate::new().status(status))
        {
            Ok(_) => info!(pr = %record.key(), status = %status, "Updated tracked pull request"),
            Err(e) => self.emit(
                report,
                WatchEvent::TrackingFailed {
                    ticket_key: record.ticket_key,
                    error: e.to_string(),
                },
            ),
        }
    }

    fn emit(&self, report: &mut TickReport, event: WatchEvent) {
        if self.console {
            console::line(event.marker(), &event.to_string());
        }

        match &event {
            WatchEvent::PollFailed { stage, error } => {
                error!(stage = %stage, error = %error, "Poll failed");
            }
            e if e.marker() == Marker::Failure => warn!("{e}"),
            e => info!("{e}"),
        }

        report.events.push(event);
    }

    async fn shutdown(&self) {
        if self.console {
            console::stopping();
        }
        self.issues.close().await;
        self.code_host.close().await;
        info!("Watch loop stopped");
    }
}
