//! Status document: the ordered outcome list for the most recent run.
//!
//! The document is replaced wholesale on every run via write-to-temp plus
//! rename, so a reader never observes a partial write. Serialization is
//! deterministic: identical input produces byte-identical output.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to write status document {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read status document {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed status document {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Terminal state of one booking attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Success,
    Failed,
    /// Reserved initial state for a not-yet-completed record. No completed
    /// run emits it.
    Pending,
}

/// The result of one agent's attempt, produced exactly once per profile per
/// run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub user: String,
    pub status: BookingStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl OutcomeRecord {
    pub fn success(user: &str, details: impl Into<String>) -> Self {
        Self {
            user: user.to_string(),
            status: BookingStatus::Success,
            timestamp: Utc::now(),
            details: Some(details.into()),
        }
    }

    pub fn failed(user: &str, details: impl Into<String>) -> Self {
        Self {
            user: user.to_string(),
            status: BookingStatus::Failed,
            timestamp: Utc::now(),
            details: Some(details.into()),
        }
    }

    pub fn pending(user: &str) -> Self {
        Self {
            user: user.to_string(),
            status: BookingStatus::Pending,
            timestamp: Utc::now(),
            details: None,
        }
    }
}

/// Atomically replace the status document at `path` with `outcomes`.
pub fn publish(path: &Path, outcomes: &[OutcomeRecord]) -> Result<(), PersistError> {
    let displayed = path.display().to_string();
    let wrap = |source: std::io::Error| PersistError::Write {
        path: displayed.clone(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(wrap)?;
        }
    }

    let mut body = serde_json::to_vec_pretty(outcomes).map_err(|source| PersistError::Parse {
        path: displayed.clone(),
        source,
    })?;
    body.push(b'\n');

    // Write-then-rename in the same directory keeps the replace atomic.
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &body).map_err(wrap)?;
    std::fs::rename(&tmp, path).map_err(wrap)?;

    info!(path = %displayed, records = outcomes.len(), "published status document");
    Ok(())
}

/// Read a status document back. Symmetric with [`publish`]: no lossy
/// transform in either direction.
pub fn read(path: &Path) -> Result<Vec<OutcomeRecord>, PersistError> {
    let display = path.display().to_string();
    let body = std::fs::read(path).map_err(|source| PersistError::Read {
        path: display.clone(),
        source,
    })?;
    serde_json::from_slice(&body).map_err(|source| PersistError::Parse {
        path: display,
        source,
    })
}
