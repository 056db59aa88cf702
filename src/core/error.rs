use std::path::PathBuf;
use thiserror::Error;

use crate::core::auth::CredentialError;

/// Central error type for the launcher backend.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Download timed out after {secs}s: {url}")]
    Timeout { url: String, secs: u64 },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Configuration ───────────────────────────────────
    #[error("Unknown sync target: {0}")]
    UnknownSyncTarget(String),

    #[error("Manifest has no entry for '{0}'")]
    MissingManifestEntry(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    // ── Sync ────────────────────────────────────────────
    #[error("Refusing unsafe remote file name: {0:?}")]
    UnsafeFileName(String),

    #[error("Sync worker failed: {0}")]
    Worker(String),

    // ── Credentials ─────────────────────────────────────
    #[error(transparent)]
    Credential(#[from] CredentialError),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    /// Whether the error is a configuration problem that must stop a sync
    /// before it starts, as opposed to a per-file failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LauncherError::UnknownSyncTarget(_)
                | LauncherError::MissingManifestEntry(_)
                | LauncherError::InvalidSettings(_)
        )
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for LauncherError {
    fn from(err: tokio::task::JoinError) -> Self {
        LauncherError::Worker(err.to_string())
    }
}
