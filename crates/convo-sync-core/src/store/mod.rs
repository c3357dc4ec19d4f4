//! Storage abstraction for a persistent message index.
//!
//! The [`IndexStore`] trait is the opaque, append-capable store of
//! `(fingerprint, text, metadata)` entries that the index lifecycle manager
//! owns. It supports appending embedded records, reading every stored record
//! back (for diffing), similarity queries, and a cheap liveness probe.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{IndexedMessage, MessageRecord};

/// Abstract storage backend for one data set's index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add_entries`](IndexStore::add_entries) | Append records with their vectors |
/// | [`all_records`](IndexStore::all_records) | Read back every stored record |
/// | [`similarity_query`](IndexStore::similarity_query) | Top-k cosine similarity search |
/// | [`count`](IndexStore::count) | Number of stored entries |
/// | [`probe`](IndexStore::probe) | Liveness check before trusting a loaded store |
/// | [`close`](IndexStore::close) | Release file handles ahead of deletion |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Append records. `vectors[i]` is the embedding of `records[i]`.
    async fn add_entries(&self, records: &[MessageRecord], vectors: &[Vec<f32>]) -> Result<()>;

    /// Read back the full stored content of the index, in insertion order.
    async fn all_records(&self) -> Result<Vec<MessageRecord>>;

    /// Return the `k` entries most similar to `query_vec`, best first.
    async fn similarity_query(&self, query_vec: &[f32], k: usize) -> Result<Vec<IndexedMessage>>;

    async fn count(&self) -> Result<u64>;

    /// Cheap check that the store is usable. Must not call the embedding service.
    async fn probe(&self) -> Result<()>;

    /// Release any open handles. The store must not be used afterwards.
    async fn close(&self);
}
