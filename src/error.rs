//! Typed outcomes for conditions a caller has to branch on.
//!
//! Plumbing failures travel as `anyhow::Error`. The enums here cover the
//! cases where the caller needs to know *what kind* of failure happened:
//! whether a human has to delete files by hand, or whether an upstream
//! service rejected the credentials versus ran out of quota.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failure talking to the embedding or generation service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} rejected the API key (HTTP {status}); check OPENAI_API_KEY")]
    Unauthorized { service: &'static str, status: u16 },

    #[error("{service} quota exceeded; check billing for the account")]
    QuotaExceeded { service: &'static str },

    #[error("{service} unreachable: {message}")]
    Network {
        service: &'static str,
        message: String,
    },

    #[error("{service} API error {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },
}

impl UpstreamError {
    /// Classify a non-success HTTP response.
    pub fn from_response(service: &'static str, status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();
        if status == 401 || status == 403 || lower.contains("invalid_api_key") {
            UpstreamError::Unauthorized { service, status }
        } else if lower.contains("insufficient_quota")
            || lower.contains("quota")
            || lower.contains("billing")
        {
            UpstreamError::QuotaExceeded { service }
        } else {
            UpstreamError::Api {
                service,
                status,
                body: body.to_string(),
            }
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Network { .. } => true,
            UpstreamError::Api { status, .. } => *status == 429 || *status >= 500,
            UpstreamError::Unauthorized { .. } | UpstreamError::QuotaExceeded { .. } => false,
        }
    }
}

/// Step-by-step remediation shown when automatic deletion gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualDeletionGuide {
    pub path: PathBuf,
    pub last_error: String,
}

impl fmt::Display for ManualDeletionGuide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Automatic deletion failed: {}", self.last_error)?;
        writeln!(f)?;
        writeln!(f, "Manual deletion steps:")?;
        writeln!(f, "  1. Stop every running `convo` process and any app holding the index open.")?;
        writeln!(
            f,
            "  2. Check for leftover processes (Task Manager on Windows, `ps`/`lsof` elsewhere) and end them."
        )?;
        writeln!(f, "  3. Delete this directory by hand:")?;
        writeln!(f, "       {}", self.path.display())?;
        if cfg!(windows) {
            writeln!(
                f,
                "     From an elevated prompt: rmdir /s /q \"{}\"",
                self.path.display()
            )?;
        } else {
            writeln!(f, "     rm -rf '{}'", self.path.display())?;
        }
        writeln!(
            f,
            "  4. If the directory is still reported as in use, reboot and repeat step 3."
        )?;
        write!(f, "  5. Run `convo ensure` again to rebuild the index.")
    }
}

/// Outcome of a sync-level operation that the caller must branch on.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Bootstrap found zero records to index.
    #[error("no messages to index")]
    NoData,

    /// A loaded index failed its liveness probe and was discarded.
    #[error("index at {} failed its liveness probe: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// The index directory could not be removed automatically.
    #[error("index at {} requires manual deletion", .0.path.display())]
    ManualIntervention(ManualDeletionGuide),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Other(anyhow::Error),
}

impl From<anyhow::Error> for SyncError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<UpstreamError>() {
            Ok(upstream) => SyncError::Upstream(upstream),
            Err(other) => SyncError::Other(other),
        }
    }
}

/// Metadata file could not be written. Reported, never fatal.
#[derive(Debug, Error)]
#[error("failed to save sync metadata to {}: {source}", .path.display())]
pub struct MetadataError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
