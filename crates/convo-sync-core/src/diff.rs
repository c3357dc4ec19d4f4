//! Incremental diff between a fresh scrape and a persisted index.
//!
//! Builds the fingerprint set of everything already stored (by reading the
//! stored records back and fingerprinting them again) and keeps the current
//! records whose fingerprint is not in that set. Relative order of the
//! current records is preserved. Runs in O(n + m).
//!
//! If the index cannot be read back, every current record is treated as new.

use std::collections::HashSet;

use crate::fingerprint::{fingerprint, fingerprint_set, Fingerprint};
use crate::models::MessageRecord;
use crate::store::IndexStore;

/// Keep the records whose fingerprint is absent from `existing`.
pub fn filter_new(current: &[MessageRecord], existing: &HashSet<Fingerprint>) -> Vec<MessageRecord> {
    current
        .iter()
        .filter(|r| !existing.contains(&fingerprint(r)))
        .cloned()
        .collect()
}

/// Compute the records in `current` that are not yet in `existing`.
///
/// With no existing index every record is new (bootstrap case).
pub async fn diff(
    current: &[MessageRecord],
    existing: Option<&dyn IndexStore>,
) -> Vec<MessageRecord> {
    let Some(store) = existing else {
        return current.to_vec();
    };

    match store.all_records().await {
        Ok(stored) => {
            let known = fingerprint_set(&stored);
            let fresh = filter_new(current, &known);
            tracing::debug!(
                stored = stored.len(),
                current = current.len(),
                new = fresh.len(),
                "computed index diff"
            );
            fresh
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                current = current.len(),
                "could not read back existing index; treating all scraped records as new"
            );
            current.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndexedMessage, Speaker};
    use crate::store::memory::InMemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;

    fn rec(time: &str, text: &str) -> MessageRecord {
        MessageRecord::new("2025/10/15(水)", time, Speaker::Partner, text)
    }

    async fn store_with(records: &[MessageRecord]) -> InMemoryStore {
        let store = InMemoryStore::new();
        let vectors = vec![vec![1.0f32]; records.len()];
        store.add_entries(records, &vectors).await.unwrap();
        store
    }

    struct UnreadableStore;

    #[async_trait]
    impl IndexStore for UnreadableStore {
        async fn add_entries(&self, _: &[MessageRecord], _: &[Vec<f32>]) -> Result<()> {
            Ok(())
        }
        async fn all_records(&self) -> Result<Vec<MessageRecord>> {
            anyhow::bail!("database disk image is malformed")
        }
        async fn similarity_query(&self, _: &[f32], _: usize) -> Result<Vec<IndexedMessage>> {
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<u64> {
            Ok(0)
        }
        async fn probe(&self) -> Result<()> {
            Ok(())
        }
        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_no_index_means_everything_new() {
        let current = vec![rec("10:00", "A"), rec("10:01", "B")];
        assert_eq!(diff(&current, None).await, current);
    }

    #[tokio::test]
    async fn test_same_set_is_empty() {
        let current = vec![rec("10:00", "A"), rec("10:01", "B")];
        let store = store_with(&current).await;
        assert!(diff(&current, Some(&store as &dyn IndexStore)).await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_diff_preserves_order() {
        let a = rec("10:00", "A");
        let b = rec("10:01", "B");
        let c = rec("10:02", "C");
        let d = rec("10:03", "D");
        let store = store_with(&[a.clone(), b.clone()]).await;

        let current = vec![a, c.clone(), b, d.clone()];
        let fresh = diff(&current, Some(&store as &dyn IndexStore)).await;
        assert_eq!(fresh, vec![c, d]);
    }

    #[tokio::test]
    async fn test_empty_index_returns_all() {
        let store = InMemoryStore::new();
        let current = vec![rec("10:00", "A")];
        assert_eq!(diff(&current, Some(&store as &dyn IndexStore)).await, current);
    }

    #[tokio::test]
    async fn test_unreadable_index_falls_back_to_all() {
        let current = vec![rec("10:00", "A"), rec("10:01", "B")];
        let fresh = diff(&current, Some(&UnreadableStore as &dyn IndexStore)).await;
        assert_eq!(fresh, current);
    }

    #[test]
    fn test_filter_new_with_empty_set() {
        let current = vec![rec("10:00", "A")];
        assert_eq!(filter_new(&current, &HashSet::new()), current);
    }
}
