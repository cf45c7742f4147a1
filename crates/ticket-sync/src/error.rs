//! Error types for the store and configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`LifecycleStore`](crate::store::LifecycleStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record for this repository and PR number already exists
    #[error("Pull request {key} is already tracked")]
    AlreadyTracked { key: String },

    /// The store file exists but could not be read
    #[error("Failed to read PR store {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The store file could not be parsed
    #[error("PR store {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The store file could not be written
    #[error("Failed to write PR store {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised while resolving watcher configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required value was not provided by flag, file or environment
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// Repository is not in `owner/name` form
    #[error("Invalid repository '{0}' (expected owner/name)")]
    InvalidRepository(String),

    /// A value is present but unusable
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    /// Config file could not be read
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config file is not valid TOML
    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
