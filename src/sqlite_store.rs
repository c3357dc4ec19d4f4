//! SQLite-backed [`IndexStore`] implementation.
//!
//! Entries are appended to a single `entries` table; embeddings are stored
//! as little-endian `f32` BLOBs and similarity queries are brute-force
//! cosine similarity, which is plenty for a single chat thread.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;

use convo_sync_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use convo_sync_core::fingerprint::fingerprint;
use convo_sync_core::models::{IndexedMessage, MessageRecord, Speaker};
use convo_sync_core::store::IndexStore;

use crate::db;
use crate::migrate;

/// Opens and creates index stores inside a directory.
///
/// The lifecycle manager talks to storage only through this seam, so tests
/// can substitute an in-memory or deliberately broken backend.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Create a fresh, empty store in `dir`.
    async fn create(&self, dir: &Path) -> Result<Arc<dyn IndexStore>>;
    /// Open the existing store in `dir`.
    async fn open(&self, dir: &Path) -> Result<Arc<dyn IndexStore>>;
}

/// Backend producing [`SqliteStore`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteBackend;

#[async_trait]
impl IndexBackend for SqliteBackend {
    async fn create(&self, dir: &Path) -> Result<Arc<dyn IndexStore>> {
        let pool = db::connect(dir, true).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Arc::new(SqliteStore::new(pool)))
    }

    async fn open(&self, dir: &Path) -> Result<Arc<dyn IndexStore>> {
        let pool = db::connect(dir, false).await?;
        Ok(Arc::new(SqliteStore::new(pool)))
    }
}

/// SQLite implementation of the [`IndexStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<MessageRecord> {
    let speaker: String = row.try_get("speaker")?;
    Ok(MessageRecord {
        date: row.try_get("date")?,
        time: row.try_get("time")?,
        speaker: speaker.parse::<Speaker>()?,
        text: row.try_get("text")?,
    })
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn add_entries(&self, records: &[MessageRecord], vectors: &[Vec<f32>]) -> Result<()> {
        if records.len() != vectors.len() {
            anyhow::bail!(
                "record/vector count mismatch: {} records, {} vectors",
                records.len(),
                vectors.len()
            );
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for (record, vector) in records.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO entries (fingerprint, date, time, speaker, text, content, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(fingerprint(record).as_str())
            .bind(&record.date)
            .bind(&record.time)
            .bind(record.speaker.as_str())
            .bind(&record.text)
            .bind(record.content())
            .bind(vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn all_records(&self) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query("SELECT date, time, speaker, text FROM entries ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn similarity_query(&self, query_vec: &[f32], k: usize) -> Result<Vec<IndexedMessage>> {
        let rows = sqlx::query("SELECT date, time, speaker, text, embedding FROM entries")
            .fetch_all(&self.pool)
            .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            hits.push(IndexedMessage {
                record: record_from_row(row)?,
                score: cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn probe(&self) -> Result<()> {
        let check: String = sqlx::query_scalar("PRAGMA quick_check")
            .fetch_one(&self.pool)
            .await?;
        if check != "ok" {
            anyhow::bail!("index integrity check failed: {}", check);
        }
        self.count().await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
