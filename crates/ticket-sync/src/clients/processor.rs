//! Ticket processor backed by an external command.
//!
//! The command is invoked with the ticket key as its final argument and is
//! expected to print a JSON outcome line on stdout, e.g.
//! `{"status": "completed", "pr_url": "https://github.com/o/r/pull/5"}`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::TicketProcessor;
use crate::models::ProcessOutcome;

/// Runs `<program> <args...> <ticket_key>` and parses its outcome.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandProcessor {
    #[must_use]
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            timeout: None,
        }
    }

    /// Split a shell-quoted command line.
    ///
    /// Returns `None` when it is empty or its quotes are unbalanced.
    #[must_use]
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = shlex::split(command_line)?.into_iter();
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout: None,
        })
    }

    /// Kill the command and report a failure if it runs longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl TicketProcessor for CommandProcessor {
    async fn process(&self, ticket_key: &str) -> Result<ProcessOutcome> {
        debug!(program = %self.program, ticket = %ticket_key, "Running ticket processor");

        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(ticket_key).kill_on_drop(true);
        // Own process group: a terminal interrupt stops the watcher between
        // ticks without killing the run it waits on. Dropping the future
        // still kills the child.
        #[cfg(unix)]
        command.process_group(0);
        let run = command.output();

        let output = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, run).await {
                Ok(output) => output,
                Err(_) => {
                    warn!(ticket = %ticket_key, ?timeout, "Ticket processor timed out");
                    return Ok(ProcessOutcome::failed(&format!(
                        "processor timed out after {}s",
                        timeout.as_secs()
                    )));
                }
            },
            None => run.await,
        }
        .with_context(|| format!("Failed to run ticket processor '{}'", self.program))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(parse_outcome(&stdout, &stderr, output.status.success()))
    }
}

/// Interpret processor output.
///
/// The last stdout line that parses as an outcome wins, so the command may log
/// freely before it. Without one, the exit status decides the failure text.
fn parse_outcome(stdout: &str, stderr: &str, success: bool) -> ProcessOutcome {
    let parsed = stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<ProcessOutcome>(line).ok());

    if let Some(outcome) = parsed {
        return outcome;
    }

    if success {
        ProcessOutcome::failed("processor exited without reporting an outcome")
    } else {
        let stderr = stderr.trim();
        if stderr.is_empty() {
            ProcessOutcome::failed("processor exited with an error")
        } else {
            ProcessOutcome::failed(stderr)
        }
    }
}
