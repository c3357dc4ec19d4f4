//! Sync orchestration for one data type.
//!
//! [`SyncOrchestrator`] composes the message source, diff engine, index
//! lifecycle, and metadata store into the two operations callers use:
//!
//! - [`ensure_ready`](SyncOrchestrator::ensure_ready): bootstrap a missing
//!   index, or load an existing one. A load that fails is answered with one
//!   forced reset and one fresh bootstrap, never more.
//! - [`sync`](SyncOrchestrator::sync): fetch, diff against the loaded
//!   index, append what is new, and bump the stored count.
//!
//! Fetched records have their `time` canonicalized by the locale adapter
//! before diffing, so a read marker appearing later does not make a known
//! message look new.
//!
//! Per data type the state moves `NotInitialized → Bootstrapped →
//! Synced(Δ=0) | Synced(Δ>0) → …`. Each data type has its own index
//! directory and metadata file; one orchestrator handles exactly one.
//!
//! # Message count
//!
//! The index is the source of truth. On load, a stored count that is lower
//! than what the index holds (a crash between the two writes) is raised to
//! match. A higher stored count is only reported, so the count never
//! decreases outside of a reset. [`sync`](SyncOrchestrator::sync) adds to
//! the larger of the two.

use anyhow::anyhow;
use std::sync::Arc;

use convo_sync_core::context::{recent_context, RecentContext};
use convo_sync_core::diff::diff;
use convo_sync_core::embedding::EmbeddingProvider;
use convo_sync_core::models::{DataType, IndexedMessage, MessageRecord};
use convo_sync_core::store::IndexStore;
use convo_sync_core::timestamp::{canonicalize, TalkPageLocale, TimestampParser};

use crate::config::Config;
use crate::error::SyncError;
use crate::generation::{
    analysis_prompt, context_lines, reply_prompt, wishlist_prompt, Generator,
};
use crate::lifecycle::{IndexLifecycle, ResetOutcome, ResetPolicy, ShellForceDelete};
use crate::metadata::{MetadataStore, SyncMetadata};
use crate::sources::MessageSource;
use crate::sqlite_store::SqliteBackend;

/// How [`SyncOrchestrator::ensure_ready`] obtained the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// No index existed; one was built from a full fetch.
    Bootstrapped,
    /// The existing index passed its probe.
    Loaded,
    /// The existing index was unusable, reset, and rebuilt.
    Rebuilt,
}

pub struct ReadyIndex {
    pub store: Arc<dyn IndexStore>,
    pub readiness: Readiness,
    pub metadata: SyncMetadata,
    /// Non-fatal problems, e.g. metadata that could not be saved.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub new_records: usize,
    pub message_count: u64,
    pub warnings: Vec<String>,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.new_records == 0
    }
}

/// Snapshot for display.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub data_type: DataType,
    pub exists: bool,
    pub metadata: SyncMetadata,
    /// Entries actually in the index, when it could be opened.
    pub indexed: Option<u64>,
    pub partner_nickname: Option<String>,
}

pub struct SyncOrchestrator {
    data_type: DataType,
    lifecycle: IndexLifecycle,
    source: Arc<dyn MessageSource>,
    parser: Arc<dyn TimestampParser>,
}

impl SyncOrchestrator {
    pub fn new(
        data_type: DataType,
        lifecycle: IndexLifecycle,
        source: Arc<dyn MessageSource>,
        parser: Arc<dyn TimestampParser>,
    ) -> Self {
        Self {
            data_type,
            lifecycle,
            source,
            parser,
        }
    }

    /// Wire up the SQLite backend and shell force-delete from `config`.
    pub fn from_config(
        config: &Config,
        data_type: DataType,
        embedder: Arc<dyn EmbeddingProvider>,
        source: Arc<dyn MessageSource>,
    ) -> Self {
        let lifecycle = IndexLifecycle::new(
            config.data.index_dir(data_type),
            MetadataStore::new(config.data.metadata_file(data_type)),
            Arc::new(SqliteBackend),
            embedder,
        )
        .with_batch_size(config.embedding.batch_size)
        .with_reset_policy(ResetPolicy::from(&config.reset))
        .with_privileged_delete(Arc::new(ShellForceDelete::new(
            std::time::Duration::from_secs(config.reset.force_timeout_secs),
        )));
        let parser = Arc::new(TalkPageLocale::new(config.source.read_marker.clone()));
        Self::new(data_type, lifecycle, source, parser)
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn lifecycle(&self) -> &IndexLifecycle {
        &self.lifecycle
    }

    /// Bootstrap or load the index for this data type.
    pub async fn ensure_ready(&self) -> Result<ReadyIndex, SyncError> {
        if !self.lifecycle.exists() {
            return self.bootstrap(Readiness::Bootstrapped).await;
        }

        match self.lifecycle.load().await {
            Ok(store) => {
                let (metadata, warnings) = self.reconcile(store.as_ref()).await;
                tracing::info!(
                    data_type = %self.data_type,
                    message_count = metadata.message_count,
                    "loaded existing index"
                );
                Ok(ReadyIndex {
                    store,
                    readiness: Readiness::Loaded,
                    metadata,
                    warnings,
                })
            }
            Err(SyncError::ManualIntervention(guide)) => Err(SyncError::ManualIntervention(guide)),
            Err(e) => {
                tracing::warn!(data_type = %self.data_type, error = %e, "rebuilding index");
                if let ResetOutcome::NeedsManualIntervention(guide) = self.lifecycle.reset(true).await {
                    return Err(SyncError::ManualIntervention(guide));
                }
                self.bootstrap(Readiness::Rebuilt).await
            }
        }
    }

    /// Ingest whatever the source has that `store` does not.
    pub async fn sync(&self, store: &dyn IndexStore) -> Result<SyncReport, SyncError> {
        let new_records = self.pending(store).await?;
        let base = self.known_count(store).await;

        if new_records.is_empty() {
            tracing::info!(data_type = %self.data_type, "no new messages");
            return Ok(SyncReport {
                new_records: 0,
                message_count: base,
                warnings: Vec::new(),
            });
        }

        self.lifecycle.append(store, &new_records).await?;

        let message_count = base + new_records.len() as u64;
        let mut warnings = Vec::new();
        if let Err(e) = self.lifecycle.metadata().save(message_count, None) {
            tracing::warn!(error = %e, "sync metadata not saved");
            warnings.push(e.to_string());
        }

        tracing::info!(
            data_type = %self.data_type,
            new = new_records.len(),
            message_count,
            "synced"
        );
        Ok(SyncReport {
            new_records: new_records.len(),
            message_count,
            warnings,
        })
    }

    /// Records the next [`sync`](Self::sync) would append, without writing.
    pub async fn pending(&self, store: &dyn IndexStore) -> Result<Vec<MessageRecord>, SyncError> {
        let current = self.fetch().await?;
        Ok(diff(&current, Some(store)).await)
    }

    /// Close `store` if given, then delete the index and its metadata.
    pub async fn reset(&self, store: Option<Arc<dyn IndexStore>>) -> ResetOutcome {
        if let Some(store) = store {
            store.close().await;
        }
        self.lifecycle.reset(true).await
    }

    /// Metadata plus the real entry count. Never modifies anything.
    pub async fn status(&self) -> StatusReport {
        let exists = self.lifecycle.exists();
        let indexed = if exists {
            match self.lifecycle.count_entries().await {
                Ok(n) => Some(n),
                Err(e) => {
                    tracing::warn!(error = %e, "could not count index entries");
                    None
                }
            }
        } else {
            None
        };
        let partner_nickname = match self.source.partner_nickname().await {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(error = %e, "could not read partner nickname");
                None
            }
        };
        StatusReport {
            data_type: self.data_type,
            exists,
            metadata: self.lifecycle.metadata().load(),
            indexed,
            partner_nickname,
        }
    }

    /// Partner display name for prompts, `"the partner"` when unknown.
    pub async fn partner_name(&self) -> String {
        match self.source.partner_nickname().await {
            Ok(Some(name)) => name,
            Ok(None) => "the partner".to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read partner nickname");
                "the partner".to_string()
            }
        }
    }

    pub async fn query(
        &self,
        store: &dyn IndexStore,
        text: &str,
        k: usize,
    ) -> Result<Vec<IndexedMessage>, SyncError> {
        self.lifecycle.similarity_query(store, text, k).await
    }

    /// Latest `n` messages of the whole thread, both speakers.
    pub async fn recent(&self, n: usize) -> Result<RecentContext, SyncError> {
        let records = self.source.fetch().await?;
        Ok(recent_context(&records, n, self.parser.as_ref()))
    }

    /// Draft a reply to the partner's latest message, grounded in the `k`
    /// most similar indexed messages.
    pub async fn draft_reply(
        &self,
        store: &dyn IndexStore,
        generator: &dyn Generator,
        recent_n: usize,
        k: usize,
    ) -> Result<String, SyncError> {
        let recent = self.recent(recent_n).await?;
        let partner = self.partner_name().await;
        let (Some(prompt), Some(latest)) = (
            reply_prompt(&recent, &partner),
            recent.latest_partner.as_ref(),
        ) else {
            return Err(anyhow!("no message from the partner to reply to").into());
        };
        let hits = self.query(store, &latest.text, k).await?;
        Ok(generator.generate(&prompt, &context_lines(&hits)).await?)
    }

    /// Describe the partner from the `k` messages closest to the analysis prompt.
    pub async fn analyze(
        &self,
        store: &dyn IndexStore,
        generator: &dyn Generator,
        k: usize,
    ) -> Result<String, SyncError> {
        let prompt = analysis_prompt(&self.partner_name().await);
        let hits = self.query(store, &prompt, k).await?;
        Ok(generator.generate(&prompt, &context_lines(&hits)).await?)
    }

    /// Checklist of plans both people mentioned, as Markdown.
    ///
    /// Draws on both speakers, so it only runs against a
    /// `full_conversation` index.
    pub async fn wishlist(
        &self,
        store: &dyn IndexStore,
        generator: &dyn Generator,
        k: usize,
    ) -> Result<String, SyncError> {
        if self.data_type != DataType::FullConversation {
            return Err(anyhow!(
                "wishlist needs the {} index, not {}",
                DataType::FullConversation,
                self.data_type
            )
            .into());
        }
        let prompt = wishlist_prompt(&self.partner_name().await);
        let hits = self.query(store, &prompt, k).await?;
        Ok(generator.generate(&prompt, &context_lines(&hits)).await?)
    }

    /// Current records from the source, filtered to this data type.
    pub async fn fetch(&self) -> Result<Vec<MessageRecord>, SyncError> {
        let records = self.source.fetch().await?;
        let selected = canonicalize(self.data_type.select(records), self.parser.as_ref());
        tracing::debug!(
            source = %self.source.name(),
            data_type = %self.data_type,
            records = selected.len(),
            "fetched records"
        );
        Ok(selected)
    }

    async fn bootstrap(&self, readiness: Readiness) -> Result<ReadyIndex, SyncError> {
        let records = self.fetch().await?;
        let store = self.lifecycle.bootstrap(&records).await?;

        let message_count = records.len() as u64;
        let mut warnings = Vec::new();
        let metadata = match self.lifecycle.metadata().save(message_count, None) {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!(error = %e, "sync metadata not saved");
                warnings.push(e.to_string());
                SyncMetadata {
                    message_count,
                    last_update: Some(chrono::Utc::now()),
                }
            }
        };

        Ok(ReadyIndex {
            store,
            readiness,
            metadata,
            warnings,
        })
    }

    /// Stored count, raised to the index's entry count if that is higher.
    async fn known_count(&self, store: &dyn IndexStore) -> u64 {
        let stored = self.lifecycle.metadata().load().message_count;
        match store.count().await {
            Ok(actual) => stored.max(actual),
            Err(e) => {
                tracing::warn!(error = %e, "could not count index entries");
                stored
            }
        }
    }

    async fn reconcile(&self, store: &dyn IndexStore) -> (SyncMetadata, Vec<String>) {
        let metadata = self.lifecycle.metadata().load();
        let mut warnings = Vec::new();

        let actual = match store.count().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "could not count index entries");
                return (metadata, warnings);
            }
        };

        if metadata.message_count < actual {
            tracing::warn!(
                stored = metadata.message_count,
                actual,
                "metadata behind index; raising count"
            );
            match self.lifecycle.metadata().save(actual, metadata.last_update) {
                Ok(saved) => return (saved, warnings),
                Err(e) => {
                    warnings.push(e.to_string());
                    return (
                        SyncMetadata {
                            message_count: actual,
                            ..metadata
                        },
                        warnings,
                    );
                }
            }
        }
        if metadata.message_count > actual {
            let msg = format!(
                "metadata reports {} messages but the index holds {}",
                metadata.message_count, actual
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
        }
        (metadata, warnings)
    }
}
