// ─── Hominum Core ───
// Keeps a local Minecraft work directory in step with a remote manifest.
//
// Architecture:
//   core/
//     manifest/   — Remote config + directory listings
//     sync/       — Enumerator, reconciler and the sync façade
//     downloader/ — Concurrent downloads with progress and SHA-1 checks
//     auth/       — Encrypted API token store
//     http/       — Shared reqwest client
//     state/      — Data directory layout + launcher settings

pub mod auth;
pub mod downloader;
pub mod error;
pub mod http;
pub mod manifest;
pub mod state;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;
