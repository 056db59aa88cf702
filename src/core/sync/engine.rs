// ─── Sync Engine ───
// Brings the local work dir in line with the server manifest.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use super::enumerator::{list_local_files, remote_names, sanitize_remote};
use super::reconciler::{reconcile, SyncPlan};
use crate::core::downloader::{DownloadJob, Downloader, ProgressEvent};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::manifest::{
    is_safe_file_name, Category, Manifest, ManifestClient, SingletonFile, SyncTarget,
};

const PROGRESS_BUFFER: usize = 64;

/// Where a directory sync currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Enumerating,
    Planning,
    Transferring,
}

/// Final tally of one sync target.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub target: SyncTarget,
    pub deleted: usize,
    pub delete_failures: usize,
    pub downloaded: usize,
    pub failed: usize,
    /// The target was disabled or its listing unavailable; nothing changed.
    pub skipped: bool,
    pub cancelled: bool,
    /// Why the target could not be synced at all.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    fn start(target: SyncTarget) -> Self {
        let now = Utc::now();
        Self {
            target,
            deleted: 0,
            delete_failures: 0,
            downloaded: 0,
            failed: 0,
            skipped: false,
            cancelled: false,
            error: None,
            started_at: now,
            finished_at: now,
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    fn failed_with(mut self, err: &LauncherError) -> Self {
        self.error = Some(err.to_string());
        self.finish()
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.delete_failures == 0 && !self.cancelled && self.error.is_none()
    }
}

/// Result of syncing a singleton file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSyncOutcome {
    Updated,
    Skipped,
    Failed,
}

/// Caller side of a running directory sync.
///
/// Events arrive in completion order; the sequence ends when the worker is
/// done. Call [`SyncHandle::finish`] to get the report.
pub struct SyncHandle {
    events: mpsc::Receiver<ProgressEvent>,
    phase: watch::Receiver<SyncPhase>,
    cancel: CancellationToken,
    worker: JoinHandle<LauncherResult<SyncReport>>,
}

impl SyncHandle {
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    pub fn phase_watcher(&self) -> watch::Receiver<SyncPhase> {
        self.phase.clone()
    }

    /// Stop dispatching new downloads. Files already in flight finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain any remaining events and wait for the worker's report.
    pub async fn finish(mut self) -> LauncherResult<SyncReport> {
        while self.events.recv().await.is_some() {}
        self.worker.await?
    }

    /// Gather every event, then the report.
    pub async fn collect(mut self) -> LauncherResult<(Vec<ProgressEvent>, SyncReport)> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let report = self.worker.await??;
        Ok((events, report))
    }
}

/// Sync façade over one manifest.
///
/// The manifest is fetched once when the engine is built; listings are
/// fetched fresh on every sync call.
#[derive(Clone)]
pub struct SyncEngine {
    manifest: Arc<Manifest>,
    client: Arc<dyn ManifestClient>,
    downloader: Downloader,
    work_dir: PathBuf,
}

impl SyncEngine {
    /// Fetch the manifest and build an engine rooted at `work_dir`.
    pub async fn connect(
        client: Arc<dyn ManifestClient>,
        downloader: Downloader,
        work_dir: PathBuf,
    ) -> LauncherResult<Self> {
        let manifest = client.get_config().await?;

        debug!("Server IP: {}", manifest.client.server_ip);
        debug!("Fabric Version: {}", manifest.client.fabric_version);
        debug!("Loader Version: {}", manifest.client.loader_version);

        Ok(Self::with_manifest(manifest, client, downloader, work_dir))
    }

    pub fn with_manifest(
        manifest: Manifest,
        client: Arc<dyn ManifestClient>,
        downloader: Downloader,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            manifest: Arc::new(manifest),
            client,
            downloader,
            work_dir,
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.work_dir.join(category.as_str())
    }

    pub fn singleton_path(&self, file: SingletonFile) -> PathBuf {
        self.work_dir.join(file.file_name())
    }

    // ── Directory sync ──────────────────────────────────

    /// Start syncing `category` on a worker task.
    ///
    /// A category without a URL yields an empty event sequence and a
    /// `skipped` report without touching the filesystem.
    pub fn sync_directory(&self, category: Category, cancel: CancellationToken) -> SyncHandle {
        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let (phase_tx, phase_rx) = watch::channel(SyncPhase::Idle);

        let job = DirectorySync {
            category,
            url: self.manifest.directory_url(category).map(str::to_string),
            dir: self.category_dir(category),
            client: self.client.clone(),
            downloader: self.downloader.clone(),
        };

        let span = info_span!("sync", category = %category, session = %Uuid::new_v4());
        let worker_cancel = cancel.clone();
        let worker = tokio::spawn(
            async move {
                let result = job.run(&worker_cancel, &tx, &phase_tx).await;
                phase_tx.send_replace(SyncPhase::Idle);
                result
            }
            .instrument(span),
        );

        SyncHandle {
            events: rx,
            phase: phase_rx,
            cancel,
            worker,
        }
    }

    /// Compute what a sync of `category` would do, without changing anything.
    /// `None` when the category is disabled or its listing unavailable.
    pub async fn plan(&self, category: Category) -> LauncherResult<Option<SyncPlan>> {
        let Some(url) = self.manifest.directory_url(category) else {
            return Ok(None);
        };
        let Some(names) = self.client.get_filenames(url).await else {
            return Ok(None);
        };

        let remote: BTreeSet<String> = names
            .into_iter()
            .filter(|n| is_safe_file_name(n))
            .collect();
        let local = list_local_files(&self.category_dir(category))?;
        Ok(Some(reconcile(&local, &remote)))
    }

    // ── Singleton sync ──────────────────────────────────

    /// Re-fetch a singleton file and overwrite the local copy.
    ///
    /// A file whose key is missing from the manifest is a configuration
    /// error; a null URL or unavailable remote is a skip.
    #[instrument(skip(self))]
    pub async fn sync_file(&self, file: SingletonFile) -> LauncherResult<FileSyncOutcome> {
        let Some(url) = self.manifest.file_url(file)? else {
            warn!("Remote file '{}' is not set", file);
            return Ok(FileSyncOutcome::Skipped);
        };

        let Some(remote) = self.client.get_file_download(url).await else {
            warn!("Remote file '{}' unavailable; keeping local copy", file);
            return Ok(FileSyncOutcome::Skipped);
        };

        let dest = self.singleton_path(file);
        let job = DownloadJob::new(remote.download_url, dest.clone()).with_sha(remote.sha);
        match self.downloader.download_file(&job).await {
            Ok(()) => {
                info!("Synced '{}' to {:?}", file, dest);
                Ok(FileSyncOutcome::Updated)
            }
            Err(e) => {
                warn!("Failed to sync '{}': {}", file, e);
                Ok(FileSyncOutcome::Failed)
            }
        }
    }

    // ── Full update ─────────────────────────────────────

    /// Sync every target in launch order, forwarding progress to `on_event`.
    ///
    /// Stops before the next target once `cancel` fires. Configuration errors
    /// abort the run; any other failure is recorded in that target's report
    /// and the run moves on.
    #[instrument(skip(self, cancel, on_event))]
    pub async fn sync_all<F>(
        &self,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> LauncherResult<Vec<SyncReport>>
    where
        F: FnMut(SyncTarget, &ProgressEvent),
    {
        let mut reports = Vec::with_capacity(SyncTarget::ALL.len());

        for target in SyncTarget::ALL {
            if cancel.is_cancelled() {
                info!("Sync cancelled before '{}'", target);
                break;
            }

            let report = match target {
                SyncTarget::Directory(category) => {
                    let mut handle = self.sync_directory(category, cancel.clone());
                    while let Some(event) = handle.next_event().await {
                        on_event(target, &event);
                    }
                    match handle.finish().await {
                        Ok(report) => report,
                        Err(e) if e.is_configuration() => return Err(e),
                        Err(e) => {
                            warn!("Sync of '{}' failed: {}", target, e);
                            SyncReport::start(target).failed_with(&e)
                        }
                    }
                }
                SyncTarget::File(file) => {
                    let mut report = SyncReport::start(target);
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        outcome = self.sync_file(file) => Some(outcome?),
                    };
                    let Some(outcome) = outcome else {
                        info!("Sync of '{}' cancelled", target);
                        report.cancelled = true;
                        reports.push(report.finish());
                        break;
                    };
                    if outcome == FileSyncOutcome::Skipped {
                        report.skipped = true;
                    } else {
                        let error = outcome == FileSyncOutcome::Failed;
                        if error {
                            report.failed = 1;
                        } else {
                            report.downloaded = 1;
                        }
                        on_event(
                            target,
                            &ProgressEvent {
                                completed: 1,
                                total: 1,
                                file_name: file.file_name().to_string(),
                                error,
                            },
                        );
                    }
                    report.finish()
                }
            };
            reports.push(report);
        }

        Ok(reports)
    }
}

/// Everything a directory-sync worker needs, detached from the engine.
struct DirectorySync {
    category: Category,
    url: Option<String>,
    dir: PathBuf,
    client: Arc<dyn ManifestClient>,
    downloader: Downloader,
}

impl DirectorySync {
    async fn run(
        self,
        cancel: &CancellationToken,
        progress: &mpsc::Sender<ProgressEvent>,
        phase: &watch::Sender<SyncPhase>,
    ) -> LauncherResult<SyncReport> {
        let category = self.category;
        let mut report = SyncReport::start(SyncTarget::Directory(category));

        let Some(url) = self.url else {
            warn!("Remote directory '{}' is not set", category);
            report.skipped = true;
            return Ok(report.finish());
        };

        // ── Enumerating ──
        phase.send_replace(SyncPhase::Enumerating);
        let local = list_local_files(&self.dir)?;

        let listing = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Sync of '{}' cancelled while listing", category);
                report.cancelled = true;
                return Ok(report.finish());
            }
            listing = self.client.get_file_downloads(&url) => listing,
        };
        let Some(remote) = listing else {
            warn!("Server file list for '{}' unavailable; skipping", category);
            report.skipped = true;
            return Ok(report.finish());
        };
        let remote = sanitize_remote(remote);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| LauncherError::Io {
                path: self.dir.clone(),
                source: e,
            })?;

        // ── Planning ──
        phase.send_replace(SyncPhase::Planning);
        let plan = reconcile(&local, &remote_names(&remote));
        info!(
            "'{}': {} to delete, {} to fetch, {} up to date",
            category,
            plan.to_delete.len(),
            plan.to_fetch.len(),
            local.len() - plan.to_delete.len()
        );

        if cancel.is_cancelled() {
            info!("Sync of '{}' cancelled before any change", category);
            report.cancelled = true;
            return Ok(report.finish());
        }

        for name in &plan.to_delete {
            let path = self.dir.join(name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    report.deleted += 1;
                    info!("Invalid file {:?} removed", path);
                }
                Err(e) => {
                    report.delete_failures += 1;
                    warn!("Could not remove {:?}: {}", path, e);
                }
            }
        }

        // ── Transferring ──
        phase.send_replace(SyncPhase::Transferring);
        let jobs: Vec<DownloadJob> = remote
            .into_iter()
            .filter(|f| plan.to_fetch.contains(&f.name))
            .map(|f| DownloadJob::new(f.download_url, self.dir.join(&f.name)).with_sha(f.sha))
            .collect();

        let tally = self.downloader.run_batch(jobs, cancel, progress).await;
        report.downloaded = tally.succeeded;
        report.failed = tally.failed;
        report.cancelled = tally.cancelled();

        info!(
            "'{}' synced: {} deleted, {} downloaded, {} failed",
            category, report.deleted, report.downloaded, report.failed
        );
        Ok(report.finish())
    }
}
