use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::progress::{file_name_of, BatchTally, DownloadJob, ProgressEvent};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::manifest::RemoteFile;

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const PROGRESS_BUFFER: usize = 64;

/// Fetches the raw bytes behind a URL.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> LauncherResult<Bytes>;
}

/// Plain HTTP GET fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> LauncherResult<Bytes> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?)
    }
}

/// Concurrent downloader with single-attempt semantics.
///
/// Each job is bounded by a timeout and written through a temporary file, so
/// a failed job never leaves a truncated file at its destination.
#[derive(Clone)]
pub struct Downloader {
    fetcher: Arc<dyn FileFetcher>,
    /// Maximum number of parallel downloads.
    concurrency: usize,
    timeout: Duration,
}

impl Downloader {
    pub fn new(fetcher: Arc<dyn FileFetcher>) -> Self {
        Self {
            fetcher,
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    // ── Single file download ────────────────────────────

    /// Download one job to its destination.
    ///
    /// Creates parent directories as needed. The destination is replaced only
    /// after the whole body has been fetched, verified and written.
    pub async fn download_file(&self, job: &DownloadJob) -> LauncherResult<()> {
        let dest = job.dest.as_path();

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let bytes = tokio::time::timeout(self.timeout, self.fetcher.fetch(&job.url))
            .await
            .map_err(|_| LauncherError::Timeout {
                url: job.url.clone(),
                secs: self.timeout.as_secs(),
            })??;

        if let Some(expected) = job.sha.as_deref() {
            let actual = git_blob_sha1(&bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(LauncherError::Sha1Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        let partial = partial_path(dest);
        if let Err(e) = write_then_rename(&partial, dest, &bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        debug!("Downloaded: {} -> {:?}", job.url, dest);
        Ok(())
    }

    /// Fetch `url` into `dest`, reporting only whether it worked.
    pub async fn download(&self, url: &str, dest: &Path) -> bool {
        match self.download_file(&DownloadJob::new(url, dest)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Download failed for {}: {}", url, e);
                false
            }
        }
    }

    // ── Batch concurrent downloads ──────────────────────

    /// Run `jobs` with bounded parallelism, sending one event per finished
    /// job to `progress` in completion order.
    ///
    /// Once `cancel` fires no further job is started; jobs already in flight
    /// finish and are reported.
    pub async fn run_batch(
        &self,
        jobs: Vec<DownloadJob>,
        cancel: &CancellationToken,
        progress: &mpsc::Sender<ProgressEvent>,
    ) -> BatchTally {
        let total = jobs.len();
        info!(
            "Starting batch download: {} files, concurrency={}",
            total, self.concurrency
        );

        let outcomes = stream::iter(jobs)
            .take_until(cancel.clone().cancelled_owned())
            .map(|job| async move {
                let result = self.download_file(&job).await;
                (job, result)
            })
            .buffer_unordered(self.concurrency);
        tokio::pin!(outcomes);

        let mut tally = BatchTally::default();
        let mut completed = 0;

        while let Some((job, result)) = outcomes.next().await {
            completed += 1;
            let error = match result {
                Ok(()) => {
                    tally.succeeded += 1;
                    false
                }
                Err(e) => {
                    warn!("Download failed for {}: {}", job.url, e);
                    tally.failed += 1;
                    true
                }
            };

            let event = ProgressEvent {
                completed,
                total,
                file_name: job.file_name(),
                error,
            };
            if progress.send(event).await.is_err() {
                debug!("Progress receiver dropped; finishing batch unobserved");
            }
        }

        tally.not_started = total - completed;
        if tally.cancelled() {
            info!(
                "Batch cancelled: {} of {} files never started",
                tally.not_started, total
            );
        }
        tally
    }

    /// Spawn `jobs` on a worker task and return the progress sequence.
    pub fn download_all(
        &self,
        jobs: Vec<DownloadJob>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let downloader = self.clone();
        tokio::spawn(async move {
            downloader.run_batch(jobs, &cancel, &tx).await;
        });
        rx
    }

    /// Download remote files into `target_dir`, keeping their names.
    /// Files whose names would escape `target_dir` are skipped.
    pub fn download_files(
        &self,
        files: Vec<RemoteFile>,
        target_dir: &Path,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<ProgressEvent> {
        let jobs = files
            .into_iter()
            .filter(|f| {
                let safe = f.has_safe_name();
                if !safe {
                    warn!("{}", LauncherError::UnsafeFileName(f.name.clone()));
                }
                safe
            })
            .map(|f| DownloadJob::new(f.download_url, target_dir.join(&f.name)).with_sha(f.sha))
            .collect();
        self.download_all(jobs, cancel)
    }
}

/// SHA-1 of `bytes` as git hashes a blob (`"blob <len>\0" + bytes`).
pub fn git_blob_sha1(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", bytes.len()).as_bytes());
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Sibling temp path a download is staged in before the final rename.
pub fn partial_path(dest: &Path) -> PathBuf {
    dest.with_file_name(format!(".{}.part", file_name_of(dest)))
}

async fn write_then_rename(partial: &Path, dest: &Path, bytes: &[u8]) -> LauncherResult<()> {
    // Handle must be closed before the rename on Windows.
    {
        let mut file = tokio::fs::File::create(partial)
            .await
            .map_err(|e| LauncherError::Io {
                path: partial.to_path_buf(),
                source: e,
            })?;
        file.write_all(bytes).await.map_err(|e| LauncherError::Io {
            path: partial.to_path_buf(),
            source: e,
        })?;
        file.flush().await.map_err(|e| LauncherError::Io {
            path: partial.to_path_buf(),
            source: e,
        })?;
        file.sync_all().await.map_err(|e| LauncherError::Io {
            path: partial.to_path_buf(),
            source: e,
        })?;
    }

    tokio::fs::rename(partial, dest)
        .await
        .map_err(|e| LauncherError::Io {
            path: dest.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{blob_url, FakeRemote};

    const LISTING: &str = "https://remote/mods";

    fn job(dir: &Path, name: &str) -> DownloadJob {
        DownloadJob::new(blob_url(LISTING, name), dir.join(name))
    }

    async fn drain(mut rx: mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn git_blob_sha1_matches_git() {
        assert_eq!(
            git_blob_sha1(b""),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
        assert_eq!(
            git_blob_sha1(b"hello\n"),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
    }

    #[test]
    fn partial_path_is_hidden_sibling() {
        assert_eq!(
            partial_path(Path::new("/x/mods/a.jar")),
            PathBuf::from("/x/mods/.a.jar.part")
        );
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeRemote::new()
            .with_listing(
                LISTING,
                &[("a.jar", b"aaa"), ("b.jar", b"bbb"), ("c.jar", b"ccc")],
            )
            .failing(&blob_url(LISTING, "b.jar"));
        let downloader = Downloader::new(Arc::new(remote)).with_concurrency(2);

        let jobs = vec![
            job(dir.path(), "a.jar"),
            job(dir.path(), "b.jar"),
            job(dir.path(), "c.jar"),
        ];
        let events = drain(downloader.download_all(jobs, CancellationToken::new())).await;

        assert_eq!(events.len(), 3);
        assert_eq!(events.iter().filter(|e| e.error).count(), 1);
        assert!(events.iter().any(|e| e.error && e.file_name == "b.jar"));
        assert_eq!(
            events.iter().map(|e| e.completed).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(events.iter().filter(|e| e.is_final()).count(), 1);

        assert_eq!(std::fs::read(dir.path().join("a.jar")).unwrap(), b"aaa");
        assert_eq!(std::fs::read(dir.path().join("c.jar")).unwrap(), b"ccc");
        assert!(!dir.path().join("b.jar").exists());
        assert!(!partial_path(&dir.path().join("b.jar")).exists());
    }

    #[tokio::test]
    async fn failed_download_keeps_previous_destination() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jar"), b"old").unwrap();
        let remote = FakeRemote::new()
            .with_listing(LISTING, &[("a.jar", b"new")])
            .failing(&blob_url(LISTING, "a.jar"));
        let downloader = Downloader::new(Arc::new(remote));

        assert!(downloader
            .download_file(&job(dir.path(), "a.jar"))
            .await
            .is_err());
        assert_eq!(std::fs::read(dir.path().join("a.jar")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn timeout_is_a_per_file_failure() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeRemote::new()
            .with_listing(LISTING, &[("slow.jar", b"zzz"), ("fast.jar", b"fff")])
            .slow(&blob_url(LISTING, "slow.jar"), Duration::from_secs(5));
        let downloader = Downloader::new(Arc::new(remote)).with_timeout(Duration::from_millis(50));

        let jobs = vec![job(dir.path(), "slow.jar"), job(dir.path(), "fast.jar")];
        let events = drain(downloader.download_all(jobs, CancellationToken::new())).await;

        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| e.error && e.file_name == "slow.jar"));
        assert!(events.iter().any(|e| !e.error && e.file_name == "fast.jar"));
        assert!(!dir.path().join("slow.jar").exists());
    }

    #[tokio::test]
    async fn sha_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeRemote::new().with_listing(LISTING, &[("a.jar", b"hello\n")]);
        let downloader = Downloader::new(Arc::new(remote));

        let bad = job(dir.path(), "a.jar").with_sha(Some("deadbeef".into()));
        assert!(matches!(
            downloader.download_file(&bad).await,
            Err(LauncherError::Sha1Mismatch { .. })
        ));
        assert!(!dir.path().join("a.jar").exists());

        let good = job(dir.path(), "a.jar")
            .with_sha(Some("CE013625030BA8DBA906F756967F9E9CA394464A".into()));
        downloader.download_file(&good).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.jar")).unwrap(), b"hello\n");
    }

    #[tokio::test]
    async fn cancellation_stops_dispatching_new_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["1.jar", "2.jar", "3.jar", "4.jar", "5.jar"];
        let files: Vec<(&str, &[u8])> = names.iter().map(|n| (*n, n.as_bytes())).collect();
        let mut remote = FakeRemote::new().with_listing(LISTING, &files);
        for name in &names[1..] {
            remote = remote.slow(&blob_url(LISTING, name), Duration::from_millis(100));
        }
        let remote = Arc::new(remote);
        let downloader = Downloader::new(remote.clone()).with_concurrency(1);

        let cancel = CancellationToken::new();
        let jobs = names.iter().map(|n| job(dir.path(), n)).collect();
        let mut rx = downloader.download_all(jobs, cancel.clone());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.file_name, "1.jar");
        assert!(!first.error);
        cancel.cancel();

        let mut events = vec![first];
        events.extend(drain(rx).await);

        assert!(events.len() <= 2, "got {} events", events.len());
        assert!(remote.fetched().len() <= 2);
        assert!(events.iter().all(|e| e.total == 5 && !e.is_final()));
        assert_eq!(std::fs::read(dir.path().join("1.jar")).unwrap(), b"1.jar");
    }

    #[tokio::test]
    async fn download_files_skips_unsafe_names() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeRemote::new().with_listing(LISTING, &[("ok.jar", b"ok")]);
        let downloader = Downloader::new(Arc::new(remote));

        let files = vec![
            RemoteFile {
                name: "ok.jar".into(),
                download_url: blob_url(LISTING, "ok.jar"),
                sha: None,
            },
            RemoteFile {
                name: "../escape.jar".into(),
                download_url: blob_url(LISTING, "ok.jar"),
                sha: None,
            },
        ];
        let events = drain(downloader.download_files(
            files,
            dir.path(),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(events.len(), 1);
        assert!(dir.path().join("ok.jar").exists());
        assert!(!dir.path().parent().unwrap().join("escape.jar").exists());
    }

    #[tokio::test]
    async fn http_fetcher_downloads_and_reports_status() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/a.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jar-bytes".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/gone.jar"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;
        let base = server.uri();

        let dir = tempfile::tempdir().unwrap();
        let client = crate::core::http::build_http_client(None).unwrap();
        let downloader = Downloader::new(Arc::new(HttpFetcher::new(client)));

        assert!(
            downloader
                .download(&format!("{base}/files/a.jar"), &dir.path().join("a.jar"))
                .await
        );
        assert_eq!(std::fs::read(dir.path().join("a.jar")).unwrap(), b"jar-bytes");

        let err = downloader
            .download_file(&DownloadJob::new(
                format!("{base}/files/gone.jar"),
                dir.path().join("gone.jar"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::DownloadFailed { status: 410, .. }));
        assert!(!dir.path().join("gone.jar").exists());
    }
}
