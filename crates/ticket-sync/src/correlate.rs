//! Ticket key correlation.
//!
//! GitHub has no field that links a pull request to a Jira ticket, so the key
//! is recovered from the PR title and head branch. The result is best-effort:
//! a PR that mentions several keys resolves to the first one in scan order,
//! and a PR that mentions none is simply uncorrelated.

use regex::{Regex, RegexBuilder};

/// Compiled matcher for one Jira project's ticket keys.
#[derive(Debug, Clone)]
pub struct TicketMatcher {
    pattern: Regex,
}

impl TicketMatcher {
    /// Build a matcher for keys of the form `<project_key>-<digits>`.
    ///
    /// The project key is matched literally and case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern fails to compile.
    pub fn new(project_key: &str) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(&format!(r"\b({}-\d+)\b", regex::escape(project_key)))
            .case_insensitive(true)
            .build()?;
        Ok(Self { pattern })
    }

    /// Return the first ticket key in `text`, uppercased.
    #[must_use]
    pub fn find(&self, text: &str) -> Option<String> {
        self.pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_uppercase())
    }

    /// Correlate a pull request by its title and head branch.
    ///
    /// The title is scanned before the branch.
    #[must_use]
    pub fn find_in_pr(&self, title: &str, branch: &str) -> Option<String> {
        self.find(&format!("{title} {branch}"))
    }
}

/// One-shot form of [`TicketMatcher::find`].
#[must_use]
pub fn extract_ticket_key(text: &str, project_key: &str) -> Option<String> {
    TicketMatcher::new(project_key).ok()?.find(text)
}
