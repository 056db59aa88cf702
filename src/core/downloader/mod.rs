pub mod client;
pub mod progress;

pub use client::{
    git_blob_sha1, partial_path, Downloader, FileFetcher, HttpFetcher, DEFAULT_CONCURRENCY,
    DEFAULT_TIMEOUT,
};
pub use progress::{BatchTally, DownloadJob, ProgressEvent};
