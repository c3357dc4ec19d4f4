//! Persisted sync metadata: how many messages were indexed and when.
//!
//! One small JSON file per data type sits next to its index directory:
//!
//! ```json
//! { "message_count": 42, "last_update": "2025-10-15T10:00:00Z" }
//! ```
//!
//! The file is advisory. It is not written in the same transaction as the
//! index, so a crash between the two writes can leave the count behind the
//! index; the orchestrator reconciles that on load.
//!
//! Loading never fails: a missing, unreadable, or corrupt file yields the
//! default `{0, null}`. Saving goes through a temp file and a rename so a
//! reader never sees a half-written record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::MetadataError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub message_count: u64,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> SyncMetadata {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "metadata unreadable; using defaults");
                }
                return SyncMetadata::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "metadata corrupt; using defaults");
                SyncMetadata::default()
            }
        }
    }

    /// Overwrite the record. `last_update` defaults to now.
    pub fn save(
        &self,
        message_count: u64,
        last_update: Option<DateTime<Utc>>,
    ) -> Result<SyncMetadata, MetadataError> {
        let meta = SyncMetadata {
            message_count,
            last_update: Some(last_update.unwrap_or_else(Utc::now)),
        };
        self.write(&meta).map_err(|source| MetadataError {
            path: self.path.clone(),
            source,
        })?;
        Ok(meta)
    }

    fn write(&self, meta: &SyncMetadata) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(meta)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }

    /// Delete the file. Absent counts as success.
    pub fn remove(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
