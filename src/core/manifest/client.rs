// ─── Manifest Client ───
// Fetches the launcher configuration and per-category file listings.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::model::{Manifest, RemoteFile};
use crate::core::error::{LauncherError, LauncherResult};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of the remote configuration and listings.
///
/// Listing methods return `None` when the remote is unavailable; callers
/// skip the affected target instead of failing.
#[async_trait]
pub trait ManifestClient: Send + Sync {
    async fn get_config(&self) -> LauncherResult<Manifest>;

    async fn get_filenames(&self, url: &str) -> Option<Vec<String>>;

    async fn get_file_downloads(&self, url: &str) -> Option<Vec<RemoteFile>>;

    async fn get_file_download(&self, url: &str) -> Option<RemoteFile>;
}

/// One entry of a directory listing (GitHub contents API shape).
#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    #[serde(rename = "type", default = "default_entry_type")]
    entry_type: String,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    sha: Option<String>,
}

fn default_entry_type() -> String {
    "file".into()
}

impl ContentEntry {
    fn into_remote_file(self) -> Option<RemoteFile> {
        if self.entry_type != "file" {
            return None;
        }
        let download_url = self.download_url?;
        Some(RemoteFile {
            name: self.name,
            download_url,
            sha: self.sha,
        })
    }
}

/// HTTP-backed manifest client.
///
/// Every request, body included, is bounded by `timeout`.
#[derive(Clone)]
pub struct HttpManifestClient {
    client: Client,
    manifest_url: String,
    timeout: Duration,
}

impl HttpManifestClient {
    pub fn new(client: Client, manifest_url: impl Into<String>) -> Self {
        Self {
            client,
            manifest_url: manifest_url.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> LauncherResult<T> {
        let response = self.client.get(url).timeout(self.timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.json().await?)
    }

    async fn list(&self, url: &str) -> Option<Vec<RemoteFile>> {
        match self.get_json::<Vec<ContentEntry>>(url).await {
            Ok(entries) => {
                let files: Vec<RemoteFile> = entries
                    .into_iter()
                    .filter_map(ContentEntry::into_remote_file)
                    .collect();
                debug!("Listed {} remote files at {}", files.len(), url);
                Some(files)
            }
            Err(e) => {
                warn!("Remote listing unavailable at {}: {}", url, e);
                None
            }
        }
    }
}

#[async_trait]
impl ManifestClient for HttpManifestClient {
    async fn get_config(&self) -> LauncherResult<Manifest> {
        info!("Fetching launcher manifest...");

        let manifest: Manifest = self.get_json(&self.manifest_url).await?;

        let unknown = manifest.unknown_url_keys();
        if !unknown.is_empty() {
            debug!("Ignoring unknown manifest url keys: {:?}", unknown);
        }
        info!("Loaded manifest with {} url entries", manifest.urls.len());
        Ok(manifest)
    }

    async fn get_filenames(&self, url: &str) -> Option<Vec<String>> {
        self.list(url)
            .await
            .map(|files| files.into_iter().map(|f| f.name).collect())
    }

    async fn get_file_downloads(&self, url: &str) -> Option<Vec<RemoteFile>> {
        self.list(url).await
    }

    async fn get_file_download(&self, url: &str) -> Option<RemoteFile> {
        match self.get_json::<ContentEntry>(url).await {
            Ok(entry) => {
                let file = entry.into_remote_file();
                if file.is_none() {
                    warn!("Remote entry at {} is not a downloadable file", url);
                }
                file
            }
            Err(e) => {
                warn!("Remote file unavailable at {}: {}", url, e);
                None
            }
        }
    }
}
