//! SQLite connection management for index directories.
//!
//! Each data type's index lives in its own directory with a single
//! `index.sqlite` file inside (plus SQLite's WAL side files). Opening an
//! existing index never creates one; creating an index makes the directory
//! first.
//!
//! # Write-Ahead Logging (WAL)
//!
//! WAL mode is enabled for all connections. The pool is kept small because
//! only one session touches an index at a time.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

/// File name of the database inside an index directory.
pub const INDEX_FILE: &str = "index.sqlite";

pub fn index_file(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

/// Open a pool on `<dir>/index.sqlite`.
///
/// With `create = true` the directory and database file are created if
/// missing; otherwise a missing database is an error.
pub async fn connect(dir: &Path, create: bool) -> Result<SqlitePool> {
    if create {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory {}", dir.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(index_file(dir))
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open index at {}", dir.display()))?;

    Ok(pool)
}
