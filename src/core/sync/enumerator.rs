use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use tracing::warn;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::manifest::RemoteFile;

/// Names of the regular files directly inside `dir`.
///
/// A missing directory lists as empty. Subdirectories are never listed, so a
/// sync never deletes them. Names that are not valid UTF-8 cannot match a
/// remote name and are left alone.
pub fn list_local_files(dir: &Path) -> LauncherResult<BTreeSet<String>> {
    let mut names = BTreeSet::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => {
            return Err(LauncherError::Io {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    };

    for entry in entries {
        let entry = entry.map_err(|e| LauncherError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        if !entry.path().is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => {
                names.insert(name);
            }
            Err(raw) => warn!("Skipping non UTF-8 file name {:?} in {:?}", raw, dir),
        }
    }

    Ok(names)
}

/// Drop remote entries with unsafe or repeated names, keeping listing order.
pub fn sanitize_remote(files: Vec<RemoteFile>) -> Vec<RemoteFile> {
    let mut seen = HashSet::new();
    files
        .into_iter()
        .filter(|f| {
            if !f.has_safe_name() {
                warn!("{}", LauncherError::UnsafeFileName(f.name.clone()));
                return false;
            }
            if !seen.insert(f.name.clone()) {
                warn!("Duplicate remote file name '{}' ignored", f.name);
                return false;
            }
            true
        })
        .collect()
}

pub fn remote_names(files: &[RemoteFile]) -> BTreeSet<String> {
    files.iter().map(|f| f.name.clone()).collect()
}
