//! # Convo Sync
//!
//! Incremental synchronization of a dating-site chat thread into a local
//! vector index, plus the retrieval that reply drafting sits on.
//!
//! Scraped messages are identified by fingerprint, diffed against what the
//! index already holds, and only the new ones are embedded and appended.
//! Each data type (`partner_only`, `full_conversation`, `all_messages`)
//! keeps its own index directory and metadata file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Source    │──▶│  Diff by    │──▶│  Lifecycle   │──▶ SQLite index
//! │ HTML/JSONL  │   │ fingerprint │   │ embed+append │    + metadata
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │
//!                                   ┌────────┴────────┐
//!                                   ▼                 ▼
//!                              ┌─────────┐      ┌───────────┐
//!                              │  query  │      │  reply /  │
//!                              │         │      │  analyze  │
//!                              └─────────┘      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! convo ensure --data-type partner_only     # bootstrap or load
//! convo sync --data-type partner_only       # ingest only new messages
//! convo status --data-type partner_only
//! convo query "週末の予定" --data-type full_conversation -k 5
//! convo reset --data-type partner_only
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and credentials |
//! | [`error`] | Typed upstream, sync, and metadata errors |
//! | [`metadata`] | Per-data-type sync metadata file |
//! | [`db`] | SQLite connections for index directories |
//! | [`migrate`] | Index schema |
//! | [`sqlite_store`] | SQLite index store and backend |
//! | [`embedding`] | Embedding providers (OpenAI, Ollama) |
//! | [`generation`] | Reply, analysis and wishlist generation |
//! | [`sources`] | HTML snapshot and JSONL message sources |
//! | [`lifecycle`] | Index create/load/append/reset |
//! | [`orchestrator`] | `ensure_ready` and `sync` per data type |
//! | [`commands`] | CLI command implementations |

pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod lifecycle;
pub mod metadata;
pub mod migrate;
pub mod orchestrator;
pub mod sources;
pub mod sqlite_store;

pub use convo_sync_core::{context, diff, fingerprint, models, store, timestamp};
