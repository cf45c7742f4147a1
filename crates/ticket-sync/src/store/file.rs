//! JSON file backend.
//!
//! The whole record set is loaded once on open and the document is rewritten
//! after every mutation. There is no locking: only one process may own a
//! store file at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::records::PrRecords;
use super::LifecycleStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{PrUpdate, TrackedPullRequest};

const STORE_DIR: &str = ".ticket-sync";
const STORE_FILE: &str = "pr_tracker.json";

/// Default per-user store location (`~/.ticket-sync/pr_tracker.json`).
#[must_use]
pub fn default_store_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(STORE_DIR).join(STORE_FILE))
}

/// On-disk document layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    prs: PrRecords,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

/// Lifecycle store persisted as a single JSON document.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: PrRecords,
}

impl JsonFileStore {
    /// Open the store at `path`, loading any existing records.
    ///
    /// A missing file is an empty store. An unreadable or unparseable file is
    /// an error; callers should treat it as fatal rather than start over.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match fs::read_to_string(&path) {
            Ok(content) => {
                let document: StoreDocument =
                    serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                document.prs
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PrRecords::new(),
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        info!(path = %path.display(), tracked = records.len(), "Loaded PR store");
        Ok(Self { path, records })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rewrite the whole document via a temp file and rename.
    ///
    /// Mutations build the next record set on a copy and only adopt it once
    /// it is on disk, so a failed write leaves memory matching the file.
    fn save(&self, records: &PrRecords) -> StoreResult<()> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let document = StoreDocument {
            prs: records.clone(),
            updated_at: Some(Utc::now()),
        };
        let content = serde_json::to_string_pretty(&document)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;

        debug!(path = %self.path.display(), tracked = records.len(), "Saved PR store");
        Ok(())
    }
}

impl LifecycleStore for JsonFileStore {
    fn add(
        &mut self,
        pr_number: u64,
        pr_url: &str,
        repo: &str,
        ticket_key: &str,
        branch: &str,
    ) -> StoreResult<TrackedPullRequest> {
        let mut next = self.records.clone();
        let pr = next.add(pr_number, pr_url, repo, ticket_key, branch)?;
        self.save(&next)?;
        self.records = next;
        info!(repo = %repo, pr_number, ticket = %ticket_key, "Tracking PR");
        Ok(pr)
    }

    fn update(
        &mut self,
        repo: &str,
        pr_number: u64,
        update: &PrUpdate,
    ) -> StoreResult<Option<TrackedPullRequest>> {
        let mut next = self.records.clone();
        let Some(pr) = next.update(repo, pr_number, update) else {
            return Ok(None);
        };
        self.save(&next)?;
        self.records = next;
        Ok(Some(pr))
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
        let mut next = self.records.clone();
        if !next.remove(repo, pr_number) {
            return Ok(false);
        }
        self.save(&next)?;
        self.records = next;
        Ok(true)
    }

    fn cleanup_closed(&mut self) -> StoreResult<usize> {
        let mut next = self.records.clone();
        let removed = next.cleanup_closed();
        if removed > 0 {
            self.save(&next)?;
            self.records = next;
            info!(removed, "Removed merged/closed PRs from store");
        }
        Ok(removed)
    }
}
