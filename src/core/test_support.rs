//! In-memory remote for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::core::downloader::FileFetcher;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::manifest::{Manifest, ManifestClient, RemoteFile};

/// Scriptable stand-in for the manifest host and file server.
#[derive(Default)]
pub struct FakeRemote {
    manifest: Manifest,
    listings: HashMap<String, Vec<RemoteFile>>,
    singles: HashMap<String, RemoteFile>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    stalled: HashSet<String>,
    on_listing: Option<Box<dyn Fn() + Send + Sync>>,
    fetched: Mutex<Vec<String>>,
}

/// Download URL the fake assigns to `name` inside listing `listing_url`.
pub fn blob_url(listing_url: &str, name: &str) -> String {
    format!("mem://{listing_url}/{name}")
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, key: &str, url: Option<&str>) -> Self {
        self.manifest
            .urls
            .insert(key.to_string(), url.map(str::to_string));
        self
    }

    pub fn with_listing(mut self, listing_url: &str, files: &[(&str, &[u8])]) -> Self {
        let mut entries = Vec::new();
        for (name, content) in files {
            let url = blob_url(listing_url, name);
            self.blobs
                .get_mut()
                .unwrap()
                .insert(url.clone(), content.to_vec());
            entries.push(RemoteFile {
                name: name.to_string(),
                download_url: url,
                sha: None,
            });
        }
        self.listings.insert(listing_url.to_string(), entries);
        self
    }

    pub fn with_single(mut self, url: &str, name: &str, content: &[u8]) -> Self {
        let download_url = blob_url(url, name);
        self.blobs
            .get_mut()
            .unwrap()
            .insert(download_url.clone(), content.to_vec());
        self.singles.insert(
            url.to_string(),
            RemoteFile {
                name: name.to_string(),
                download_url,
                sha: None,
            },
        );
        self
    }

    /// Make fetches of `download_url` fail with a simulated network error.
    pub fn failing(mut self, download_url: &str) -> Self {
        self.failing.insert(download_url.to_string());
        self
    }

    pub fn slow(mut self, download_url: &str, delay: Duration) -> Self {
        self.delays.insert(download_url.to_string(), delay);
        self
    }

    /// Listing or single-file requests for `url` never answer.
    pub fn stalled(mut self, url: &str) -> Self {
        self.stalled.insert(url.to_string());
        self
    }

    /// Run `hook` whenever a directory listing is served.
    pub fn on_listing(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_listing = Some(Box::new(hook));
        self
    }

    async fn stall_if_needed(&self, url: &str) {
        if self.stalled.contains(url) {
            std::future::pending::<()>().await;
        }
    }

    pub fn replace_blob(&self, download_url: &str, content: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(download_url.to_string(), content.to_vec());
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ManifestClient for FakeRemote {
    async fn get_config(&self) -> LauncherResult<Manifest> {
        Ok(self.manifest.clone())
    }

    async fn get_filenames(&self, url: &str) -> Option<Vec<String>> {
        self.stall_if_needed(url).await;
        self.listings
            .get(url)
            .map(|files| files.iter().map(|f| f.name.clone()).collect())
    }

    async fn get_file_downloads(&self, url: &str) -> Option<Vec<RemoteFile>> {
        self.stall_if_needed(url).await;
        if let Some(hook) = &self.on_listing {
            hook();
        }
        self.listings.get(url).cloned()
    }

    async fn get_file_download(&self, url: &str) -> Option<RemoteFile> {
        self.stall_if_needed(url).await;
        self.singles.get(url).cloned()
    }
}

#[async_trait]
impl FileFetcher for FakeRemote {
    async fn fetch(&self, url: &str) -> LauncherResult<Bytes> {
        self.fetched.lock().unwrap().push(url.to_string());

        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(url) {
            return Err(LauncherError::Other(format!(
                "simulated network error for {url}"
            )));
        }

        let blob = self.blobs.lock().unwrap().get(url).cloned();
        blob.map(Bytes::from).ok_or(LauncherError::DownloadFailed {
            url: url.to_string(),
            status: 404,
        })
    }
}
