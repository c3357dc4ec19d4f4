//! # convo-sync core
//!
//! Pure logic shared by the `convo` CLI and any other host: message models,
//! the locale timestamp adapter, fingerprinting, diffing against a persisted
//! index, the index store abstraction, and the embedding trait.
//!
//! This crate performs no filesystem, network, or database I/O of its own.
//! Everything that touches the outside world sits behind [`store::IndexStore`]
//! or [`embedding::EmbeddingProvider`].

pub mod context;
pub mod diff;
pub mod embedding;
pub mod fingerprint;
pub mod models;
pub mod store;
pub mod timestamp;
