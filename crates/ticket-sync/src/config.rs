//! Configuration for the watcher and its upstream credentials.
//!
//! Resolution order: CLI flags > environment (via clap) > config file > defaults.

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::store::default_store_path;

/// Target repository/project and polling settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// GitHub repository (owner/name)
    pub repository: String,
    /// Jira project key, e.g. `PROJ`
    pub project_key: String,
    /// Status marking a ticket ready for processing
    pub trigger_status: String,
    /// Status a ticket moves to once its PR merges
    pub done_status: String,
    /// Delay between poll ticks
    pub poll_interval: Duration,
    /// Maximum tickets fetched per tick
    pub search_limit: usize,
    /// Maximum closed PRs fetched per tick
    pub pr_page_size: usize,
    /// Store file override (defaults to the per-user path)
    pub store_path: Option<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            repository: String::new(),
            project_key: String::new(),
            trigger_status: "Ready for Agent".to_string(),
            done_status: "Done".to_string(),
            poll_interval: Duration::from_secs(60),
            search_limit: 10,
            pr_page_size: 30,
            store_path: None,
        }
    }
}

/// Optional settings read from a TOML config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub repository: Option<String>,
    pub project_key: Option<String>,
    pub trigger_status: Option<String>,
    pub done_status: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub search_limit: Option<usize>,
    pub pr_page_size: Option<usize>,
    pub store_path: Option<PathBuf>,
}

impl FileConfig {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl WatchConfig {
    /// Defaults overlaid with an optional config file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = path {
            config.apply_file(FileConfig::load(path)?);
        }
        Ok(config)
    }

    /// Overlay every value set in `file`.
    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(repository) = file.repository {
            self.repository = repository;
        }
        if let Some(project_key) = file.project_key {
            self.project_key = project_key;
        }
        if let Some(trigger_status) = file.trigger_status {
            self.trigger_status = trigger_status;
        }
        if let Some(done_status) = file.done_status {
            self.done_status = done_status;
        }
        if let Some(secs) = file.poll_interval_secs {
            self.poll_interval = Duration::from_secs(secs);
        }
        if let Some(search_limit) = file.search_limit {
            self.search_limit = search_limit;
        }
        if let Some(pr_page_size) = file.pr_page_size {
            self.pr_page_size = pr_page_size;
        }
        if file.store_path.is_some() {
            self.store_path = file.store_path;
        }
    }

    /// Split `repository` into owner and name.
    pub fn owner_and_name(&self) -> Result<(&str, &str), ConfigError> {
        if self.repository.is_empty() {
            return Err(ConfigError::Missing("repository"));
        }
        match self.repository.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok((owner, name))
            }
            _ => Err(ConfigError::InvalidRepository(self.repository.clone())),
        }
    }

    /// Check everything the watch loop depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.owner_and_name()?;
        if self.project_key.trim().is_empty() {
            return Err(ConfigError::Missing("project_key"));
        }
        if self.trigger_status.trim().is_empty() {
            return Err(ConfigError::Missing("trigger_status"));
        }
        if self.done_status.trim().is_empty() {
            return Err(ConfigError::Missing("done_status"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "poll_interval",
                reason: "must be at least one second".to_string(),
            });
        }
        if self.search_limit == 0 {
            return Err(ConfigError::InvalidValue {
                name: "search_limit",
                reason: "must be positive".to_string(),
            });
        }
        if self.pr_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "pr_page_size",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// JQL selecting this project's tickets in the trigger status.
    #[must_use]
    pub fn trigger_jql(&self) -> String {
        format!(
            "project = {} AND status = \"{}\"",
            self.project_key,
            self.trigger_status.replace('"', "\\\"")
        )
    }

    /// Store file location: the override, else the per-user default.
    pub fn resolved_store_path(&self) -> Result<PathBuf, ConfigError> {
        self.store_path
            .clone()
            .or_else(default_store_path)
            .ok_or(ConfigError::Missing("store_path (no home directory)"))
    }
}

/// Credentials and collaborator settings, read from the environment.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Jira instance URL (e.g. `https://your-domain.atlassian.net`)
    pub jira_base_url: Option<String>,
    /// Account email for Jira basic auth
    pub jira_email: Option<String>,
    /// Jira API token
    pub jira_api_token: Option<String>,
    /// GitHub token for API calls
    pub github_token: Option<String>,
    /// Command line of the ticket processor
    pub processor_command: Option<String>,
    /// Processor timeout in seconds
    pub processor_timeout_secs: Option<u64>,
}

impl Credentials {
    /// Load credentials from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            jira_base_url: non_empty_var("JIRA_BASE_URL"),
            jira_email: non_empty_var("JIRA_EMAIL"),
            jira_api_token: non_empty_var("JIRA_API_TOKEN"),
            github_token: non_empty_var("GITHUB_TOKEN"),
            processor_command: non_empty_var("TICKET_PROCESSOR_CMD"),
            processor_timeout_secs: env::var("TICKET_PROCESSOR_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Jira URL, email and token, all required together.
    pub fn jira(&self) -> Result<(&str, &str, &str), ConfigError> {
        Ok((
            required(self.jira_base_url.as_deref(), "JIRA_BASE_URL")?,
            required(self.jira_email.as_deref(), "JIRA_EMAIL")?,
            required(self.jira_api_token.as_deref(), "JIRA_API_TOKEN")?,
        ))
    }

    pub fn github_token(&self) -> Result<&str, ConfigError> {
        required(self.github_token.as_deref(), "GITHUB_TOKEN")
    }

    pub fn processor_command(&self) -> Result<&str, ConfigError> {
        required(self.processor_command.as_deref(), "TICKET_PROCESSOR_CMD")
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("Credentials")
            .field("jira_base_url", &self.jira_base_url)
            .field("jira_email", &self.jira_email)
            .field("jira_api_token", &redact(&self.jira_api_token))
            .field("github_token", &redact(&self.github_token))
            .field("processor_command", &self.processor_command)
            .field("processor_timeout_secs", &self.processor_timeout_secs)
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, ConfigError> {
    value.ok_or(ConfigError::Missing(name))
}
