pub mod client;
pub mod model;

pub use client::{HttpManifestClient, ManifestClient};
pub use model::{
    is_safe_file_name, Category, ClientConfig, Manifest, RemoteFile, SingletonFile, SyncTarget,
};
