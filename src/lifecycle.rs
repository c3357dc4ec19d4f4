//! Index lifecycle: create, load, append to, and tear down one index directory.
//!
//! ```text
//! Absent ──bootstrap──▶ Created ──load──▶ Loaded ⇄ Updated (append)
//!    ▲                                       │
//!    └──────────────── reset ◀───────────────┘   (from any state)
//! ```
//!
//! The lifecycle manager is the only component that opens, writes, or
//! deletes the index. Everything else asks through this interface.
//!
//! # Reset
//!
//! Deleting a directory can fail while another handle to a file inside it
//! is still closing, most often on Windows. [`IndexLifecycle::reset`]
//! escalates:
//!
//! 1. Direct recursive delete via [`DirRemover`], retried `max_attempts`
//!    times with a fixed backoff.
//! 2. A [`PrivilegedDelete`] strategy (OS shell forced removal), only when
//!    `force` is set.
//! 3. Give up with a [`ManualDeletionGuide`] for the operator.
//!
//! A successful reset also removes the metadata file. Resetting an absent
//! index succeeds immediately.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use convo_sync_core::embedding::{embed_query, EmbeddingProvider};
use convo_sync_core::models::{IndexedMessage, MessageRecord};
use convo_sync_core::store::IndexStore;

use crate::config::ResetConfig;
use crate::error::{ManualDeletionGuide, SyncError};
use crate::metadata::MetadataStore;
use crate::sqlite_store::IndexBackend;

/// Direct recursive deletion. Synchronous, like the filesystem call it wraps.
pub trait DirRemover: Send + Sync {
    fn remove_dir_all(&self, path: &Path) -> std::io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdRemover;

impl DirRemover for StdRemover {
    fn remove_dir_all(&self, path: &Path) -> std::io::Result<()> {
        std::fs::remove_dir_all(path)
    }
}

/// Last-resort OS-level removal.
#[async_trait]
pub trait PrivilegedDelete: Send + Sync {
    async fn force_delete(&self, path: &Path) -> Result<()>;
}

/// Forced removal through the platform shell: `Remove-Item -Recurse -Force`
/// under PowerShell on Windows, `rm -rf` elsewhere.
#[derive(Debug, Clone)]
pub struct ShellForceDelete {
    timeout: Duration,
}

impl ShellForceDelete {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl PrivilegedDelete for ShellForceDelete {
    async fn force_delete(&self, path: &Path) -> Result<()> {
        let mut cmd = if cfg!(windows) {
            let mut c = tokio::process::Command::new("powershell");
            c.arg("-NoProfile").arg("-Command").arg(format!(
                "Remove-Item -LiteralPath '{}' -Recurse -Force -ErrorAction SilentlyContinue",
                path.display().to_string().replace('\'', "''")
            ));
            c
        } else {
            let mut c = tokio::process::Command::new("rm");
            c.arg("-rf").arg(path);
            c
        };
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .with_context(|| format!("forced removal timed out after {:?}", self.timeout))?
            .context("failed to launch forced removal")?;

        if !output.status.success() {
            tracing::debug!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "forced removal exited unsuccessfully"
            );
        }
        // Exit status is unreliable across shells; the caller checks the path.
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for ResetPolicy {
    fn default() -> Self {
        Self::from(&ResetConfig::default())
    }
}

impl From<&ResetConfig> for ResetPolicy {
    fn from(config: &ResetConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

/// How a [`IndexLifecycle::reset`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Nothing to delete.
    AlreadyAbsent,
    /// Direct deletion succeeded on attempt `attempts`.
    Deleted { attempts: u32 },
    /// Direct deletion failed; the privileged strategy removed it.
    ForceDeleted,
    /// Every strategy failed. The directory is still on disk.
    NeedsManualIntervention(ManualDeletionGuide),
}

impl ResetOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self, ResetOutcome::NeedsManualIntervention(_))
    }
}

/// Owner of one data type's index directory and metadata file.
pub struct IndexLifecycle {
    index_dir: PathBuf,
    metadata: MetadataStore,
    backend: Arc<dyn IndexBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    remover: Arc<dyn DirRemover>,
    privileged: Arc<dyn PrivilegedDelete>,
    policy: ResetPolicy,
}

impl IndexLifecycle {
    pub fn new(
        index_dir: impl Into<PathBuf>,
        metadata: MetadataStore,
        backend: Arc<dyn IndexBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            index_dir: index_dir.into(),
            metadata,
            backend,
            embedder,
            batch_size: 64,
            remover: Arc::new(StdRemover),
            privileged: Arc::new(ShellForceDelete::new(Duration::from_secs(30))),
            policy: ResetPolicy::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_remover(mut self, remover: Arc<dyn DirRemover>) -> Self {
        self.remover = remover;
        self
    }

    pub fn with_privileged_delete(mut self, privileged: Arc<dyn PrivilegedDelete>) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn with_reset_policy(mut self, policy: ResetPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn exists(&self) -> bool {
        self.index_dir.is_dir()
    }

    /// Embed `records` and persist them as a brand-new index.
    ///
    /// Vectors are computed before the directory is created, so an upstream
    /// failure leaves the index absent rather than half-built.
    pub async fn bootstrap(
        &self,
        records: &[MessageRecord],
    ) -> Result<Arc<dyn IndexStore>, SyncError> {
        if self.exists() {
            return Err(anyhow::anyhow!(
                "index already exists at {}; reset it first",
                self.index_dir.display()
            )
            .into());
        }
        if records.is_empty() {
            return Err(SyncError::NoData);
        }

        let vectors = self.embed_all(records).await?;
        let store = self.backend.create(&self.index_dir).await?;
        if let Err(e) = store.add_entries(records, &vectors).await {
            store.close().await;
            let outcome = self.reset(true).await;
            tracing::warn!(?outcome, "removed partially written index");
            return Err(e.into());
        }

        tracing::info!(
            dir = %self.index_dir.display(),
            records = records.len(),
            model = self.embedder.model_name(),
            "created index"
        );
        Ok(store)
    }

    /// Open the existing index and probe it.
    ///
    /// A store that cannot be opened or fails its probe is closed and reset;
    /// the caller gets [`SyncError::Corrupt`] and is expected to bootstrap.
    pub async fn load(&self) -> Result<Arc<dyn IndexStore>, SyncError> {
        if !self.exists() {
            return Err(anyhow::anyhow!("no index at {}", self.index_dir.display()).into());
        }

        let reason = match self.backend.open(&self.index_dir).await {
            Ok(store) => match store.probe().await {
                Ok(()) => return Ok(store),
                Err(e) => {
                    store.close().await;
                    format!("{:#}", e)
                }
            },
            Err(e) => format!("{:#}", e),
        };

        tracing::warn!(dir = %self.index_dir.display(), %reason, "index unusable; discarding");
        match self.reset(true).await {
            ResetOutcome::NeedsManualIntervention(guide) => {
                Err(SyncError::ManualIntervention(guide))
            }
            _ => Err(SyncError::Corrupt {
                path: self.index_dir.clone(),
                reason,
            }),
        }
    }

    /// Open and probe the existing index without any recovery.
    pub async fn open_existing(&self) -> Result<Arc<dyn IndexStore>> {
        let store = self.backend.open(&self.index_dir).await?;
        if let Err(e) = store.probe().await {
            store.close().await;
            return Err(e);
        }
        Ok(store)
    }

    /// Entry count of the index on disk, without recovery.
    pub async fn count_entries(&self) -> Result<u64> {
        let store = self.open_existing().await?;
        let count = store.count().await;
        store.close().await;
        count
    }

    /// Embed and append `new_records`. Returns how many were written.
    pub async fn append(
        &self,
        store: &dyn IndexStore,
        new_records: &[MessageRecord],
    ) -> Result<usize, SyncError> {
        if new_records.is_empty() {
            return Ok(0);
        }
        let vectors = self.embed_all(new_records).await?;
        store.add_entries(new_records, &vectors).await?;
        tracing::info!(records = new_records.len(), "appended to index");
        Ok(new_records.len())
    }

    /// Embed `text` and return the `k` most similar stored messages.
    pub async fn similarity_query(
        &self,
        store: &dyn IndexStore,
        text: &str,
        k: usize,
    ) -> Result<Vec<IndexedMessage>, SyncError> {
        let query_vec = embed_query(self.embedder.as_ref(), text).await?;
        Ok(store.similarity_query(&query_vec, k).await?)
    }

    /// Delete the index directory and its metadata file.
    ///
    /// Open stores must be closed first. Without `force`, the privileged
    /// strategy is skipped.
    ///
    /// A regular file squatting on the index path is removed as a file.
    pub async fn reset(&self, force: bool) -> ResetOutcome {
        if !self.occupied() {
            self.forget_metadata();
            return ResetOutcome::AlreadyAbsent;
        }

        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                tracing::info!(
                    attempt,
                    max = self.policy.max_attempts,
                    "retrying index deletion"
                );
                tokio::time::sleep(self.policy.backoff).await;
            }
            match self.remove_entry() {
                Ok(()) => {
                    self.forget_metadata();
                    return ResetOutcome::Deleted { attempts: attempt };
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    self.forget_metadata();
                    return ResetOutcome::Deleted { attempts: attempt };
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, dir = %self.index_dir.display(), "index deletion failed");
                    last_error = e.to_string();
                }
            }
        }

        if force {
            tracing::warn!(dir = %self.index_dir.display(), "escalating to forced removal");
            match self.privileged.force_delete(&self.index_dir).await {
                Ok(()) if !self.occupied() => {
                    self.forget_metadata();
                    return ResetOutcome::ForceDeleted;
                }
                Ok(()) => {
                    last_error = format!("{} (directory still present after forced removal)", last_error);
                }
                Err(e) => {
                    last_error = format!("{:#}", e);
                }
            }
        }

        tracing::error!(dir = %self.index_dir.display(), error = %last_error, "index deletion requires manual intervention");
        ResetOutcome::NeedsManualIntervention(ManualDeletionGuide {
            path: self.index_dir.clone(),
            last_error,
        })
    }

    /// Anything at the index path, directory or not.
    fn occupied(&self) -> bool {
        self.index_dir.symlink_metadata().is_ok()
    }

    fn remove_entry(&self) -> std::io::Result<()> {
        if self.index_dir.is_dir() {
            self.remover.remove_dir_all(&self.index_dir)
        } else {
            std::fs::remove_file(&self.index_dir)
        }
    }

    fn forget_metadata(&self) {
        if let Err(e) = self.metadata.remove() {
            tracing::warn!(path = %self.metadata.path().display(), error = %e, "could not remove metadata file");
        }
    }

    async fn embed_all(&self, records: &[MessageRecord]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(records.len());
        for batch in records.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(MessageRecord::content).collect();
            let mut embedded = self.embedder.embed_texts(&texts).await?;
            if embedded.len() != batch.len() {
                bail!(
                    "embedding provider returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                );
            }
            vectors.append(&mut embedded);
        }
        Ok(vectors)
    }
}
