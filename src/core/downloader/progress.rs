use std::path::{Path, PathBuf};

use serde::Serialize;

/// Outcome of one processed download.
///
/// `completed` counts processed jobs (successful or not) and increases by
/// one per event; `completed == total` marks the last event of a batch that
/// was not cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub file_name: String,
    pub error: bool,
}

impl ProgressEvent {
    pub fn is_final(&self) -> bool {
        self.completed == self.total
    }
}

/// A single file to fetch into `dest`.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub url: String,
    pub dest: PathBuf,
    /// Expected git blob SHA-1, checked before anything is written.
    pub sha: Option<String>,
}

impl DownloadJob {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
            sha: None,
        }
    }

    pub fn with_sha(mut self, sha: Option<String>) -> Self {
        self.sha = sha;
        self
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.dest)
    }
}

/// Totals for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchTally {
    pub succeeded: usize,
    pub failed: usize,
    /// Jobs never dispatched because the batch was cancelled.
    pub not_started: usize,
}

impl BatchTally {
    pub fn cancelled(&self) -> bool {
        self.not_started > 0
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
