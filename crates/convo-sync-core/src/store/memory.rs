//! In-memory [`IndexStore`] implementation for testing.
//!
//! Uses a `Vec` behind `std::sync::RwLock`. Similarity search is brute-force
//! cosine similarity over all stored vectors.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{IndexedMessage, MessageRecord};

use super::IndexStore;

struct StoredEntry {
    record: MessageRecord,
    vector: Vec<f32>,
}

/// In-memory store for tests and ephemeral sessions.
pub struct InMemoryStore {
    entries: RwLock<Vec<StoredEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory index lock poisoned")
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn add_entries(&self, records: &[MessageRecord], vectors: &[Vec<f32>]) -> Result<()> {
        if records.len() != vectors.len() {
            anyhow::bail!(
                "record/vector count mismatch: {} records, {} vectors",
                records.len(),
                vectors.len()
            );
        }
        let mut entries = self.entries.write().map_err(poisoned)?;
        for (record, vector) in records.iter().zip(vectors.iter()) {
            entries.push(StoredEntry {
                record: record.clone(),
                vector: vector.clone(),
            });
        }
        Ok(())
    }

    async fn all_records(&self) -> Result<Vec<MessageRecord>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.iter().map(|e| e.record.clone()).collect())
    }

    async fn similarity_query(&self, query_vec: &[f32], k: usize) -> Result<Vec<IndexedMessage>> {
        let entries = self.entries.read().map_err(poisoned)?;
        let mut hits: Vec<IndexedMessage> = entries
            .iter()
            .map(|e| IndexedMessage {
                record: e.record.clone(),
                score: cosine_similarity(query_vec, &e.vector) as f64,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.entries.read().map_err(poisoned)?.len() as u64)
    }

    async fn probe(&self) -> Result<()> {
        let _guard = self.entries.read().map_err(poisoned)?;
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Speaker;

    fn rec(text: &str) -> MessageRecord {
        MessageRecord::new("2025/1/1", "10:00", Speaker::Partner, text)
    }

    #[tokio::test]
    async fn test_add_and_read_back_in_order() {
        let store = InMemoryStore::new();
        store
            .add_entries(&[rec("a"), rec("b")], &[vec![1.0, 0.0], vec![0.0, 1.0]])
            .await
            .unwrap();
        let all = store.all_records().await.unwrap();
        assert_eq!(all.iter().map(|r| r.text.as_str()).collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_similarity_ranks_closest_first() {
        let store = InMemoryStore::new();
        store
            .add_entries(
                &[rec("x"), rec("y"), rec("z")],
                &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
            )
            .await
            .unwrap();
        let hits = store.similarity_query(&[0.0, 1.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.text, "y");
        assert_eq!(hits[1].record.text, "z");
    }

    #[tokio::test]
    async fn test_mismatched_lengths_rejected() {
        let store = InMemoryStore::new();
        assert!(store.add_entries(&[rec("a")], &[]).await.is_err());
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
