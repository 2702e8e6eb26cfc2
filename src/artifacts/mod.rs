//! Screenshot artifact layout: `screenshots/<date>/run_<seq>/<profile>.png`.
//!
//! The run sequence number comes from the invoking environment (an invocation
//! ordinal), never from process state, so path construction stays a pure
//! function of its inputs. Repeated runs on the same day land in separate
//! `run_<seq>` directories; an existing artifact is never overwritten.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact already exists: {path}")]
    Collision { path: String },

    #[error("failed to write artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Composite key scoping one invocation's artifacts: calendar date plus a
/// per-day run sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunId {
    pub date: NaiveDate,
    pub sequence: u32,
}

impl RunId {
    pub fn new(date: NaiveDate, sequence: u32) -> Self {
        Self { date, sequence }
    }

    /// Today's date (UTC) with the given sequence number.
    pub fn today(sequence: u32) -> Self {
        Self::new(Utc::now().date_naive(), sequence)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/run_{}", self.date.format("%Y-%m-%d"), self.sequence)
    }
}

/// Where a profile's screenshot belongs. Pure; creates nothing.
pub fn screenshot_path(root: &Path, run: &RunId, profile_id: &str) -> PathBuf {
    root.join(run.date.format("%Y-%m-%d").to_string())
        .join(format!("run_{}", run.sequence))
        .join(format!("{profile_id}.png"))
}

/// Persist one screenshot, creating intermediate directories. Refuses to
/// overwrite: a sequence-number collision means the invocation ordinal was
/// reused, which is an environment error worth surfacing.
pub fn write_screenshot(
    root: &Path,
    run: &RunId,
    profile_id: &str,
    bytes: &[u8],
) -> Result<PathBuf, ArtifactError> {
    let path = screenshot_path(root, run, profile_id);
    let displayed = path.display().to_string();

    if path.exists() {
        return Err(ArtifactError::Collision { path: displayed });
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ArtifactError::Io {
            path: displayed.clone(),
            source,
        })?;
    }
    std::fs::write(&path, bytes).map_err(|source| ArtifactError::Io {
        path: displayed.clone(),
        source,
    })?;

    info!(path = %displayed, bytes = bytes.len(), "screenshot saved");
    Ok(path)
}
