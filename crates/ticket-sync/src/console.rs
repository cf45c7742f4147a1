//! Operator console output.
//!
//! Progress lines go to stdout as `[HH:MM:SS] <marker> message`, next to the
//! structured `tracing` events.

#![allow(clippy::disallowed_macros)]

use chrono::Utc;
use colored::Colorize;

use crate::correlate::TicketMatcher;
use crate::models::{PullRequest, TrackedPullRequest};

const RULE_WIDTH: usize = 50;
const TITLE_WIDTH: usize = 45;

/// Outcome marker at the start of a console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Success,
    Skipped,
    Failure,
    /// Plain progress line, no marker
    Info,
}

impl Marker {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Success => "✓",
            Self::Skipped => "○",
            Self::Failure => "✗",
            Self::Info => "",
        }
    }

    fn colored(self) -> String {
        match self {
            Self::Success => self.symbol().green().bold().to_string(),
            Self::Skipped => self.symbol().yellow().to_string(),
            Self::Failure => self.symbol().red().bold().to_string(),
            Self::Info => String::new(),
        }
    }
}

/// Current UTC wall-clock time as `HH:MM:SS`.
#[must_use]
pub fn timestamp() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

/// Print one timestamped progress line.
pub fn line(marker: Marker, message: &str) {
    match marker {
        Marker::Info => println!("[{}] {message}", timestamp()),
        _ => println!("[{}] {} {message}", timestamp(), marker.colored()),
    }
}

/// Startup banner for the watch loop.
pub fn watch_banner(
    repository: &str,
    interval_secs: u64,
    project_key: &str,
    trigger_status: &str,
    done_status: &str,
) {
    println!("Watching {}...", repository.cyan().bold());
    println!("Polling interval: {interval_secs} seconds");
    println!("Jira project: {project_key}");
    println!("Trigger status: \"{trigger_status}\"");
    println!("Done status: \"{done_status}\"");
    println!();
    println!("Press Ctrl+C to stop");
    rule();
}

pub fn rule() {
    println!("{}", "-".repeat(RULE_WIDTH).dimmed());
}

pub fn stopping() {
    println!("\nStopping watch...");
}

pub fn pr_table_header() {
    println!("{}", format!("{:<6} {:<8} {:<12} Title", "#", "State", "Ticket").bold());
    println!("{}", "-".repeat(80).dimmed());
}

/// One row of the `list-prs` table.
#[must_use]
pub fn pr_row(pr: &PullRequest, matcher: &TicketMatcher) -> String {
    let state = if pr.is_merged() { "merged" } else { pr.state.as_str() };
    let ticket = matcher
        .find_in_pr(&pr.title, pr.branch())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "#{:<5} {:<8} {:<12} {}",
        pr.number,
        state,
        ticket,
        truncate(&pr.title, TITLE_WIDTH)
    )
}

/// One row of the `tracker list` table.
#[must_use]
pub fn tracked_row(pr: &TrackedPullRequest) -> String {
    let attention = if pr.needs_attention() { " !" } else { "" };
    format!(
        "{:<24} #{:<5} {:<12} {:<16} ci:{:<8}{attention}",
        pr.repo,
        pr.pr_number,
        pr.ticket_key,
        pr.status.as_str(),
        pr.ci_status.as_str(),
    )
}

/// Cut `text` to `width` characters, ending in `...` when shortened.
#[must_use]
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}
