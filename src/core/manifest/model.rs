use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{LauncherError, LauncherResult};

/// A directory the server keeps in sync, one subdirectory of the work dir.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Config,
    Mods,
    Resourcepacks,
    Shaderpacks,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Config,
        Category::Mods,
        Category::Resourcepacks,
        Category::Shaderpacks,
    ];

    /// Manifest key, which is also the local directory name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Config => "config",
            Category::Mods => "mods",
            Category::Resourcepacks => "resourcepacks",
            Category::Shaderpacks => "shaderpacks",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LauncherError::UnknownSyncTarget(s.to_string()))
    }
}

/// A single file that is always overwritten from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SingletonFile {
    Options,
    Servers,
}

impl SingletonFile {
    pub const ALL: [SingletonFile; 2] = [SingletonFile::Options, SingletonFile::Servers];

    pub fn as_str(&self) -> &'static str {
        match self {
            SingletonFile::Options => "options",
            SingletonFile::Servers => "servers",
        }
    }

    /// File name inside the work dir.
    pub fn file_name(&self) -> &'static str {
        match self {
            SingletonFile::Options => "options.txt",
            SingletonFile::Servers => "servers.dat",
        }
    }
}

impl fmt::Display for SingletonFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SingletonFile {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SingletonFile::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LauncherError::UnknownSyncTarget(s.to_string()))
    }
}

/// Anything the engine can sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum SyncTarget {
    Directory(Category),
    File(SingletonFile),
}

impl SyncTarget {
    /// Pre-launch update order: directories first, then singletons.
    pub const ALL: [SyncTarget; 6] = [
        SyncTarget::Directory(Category::Config),
        SyncTarget::Directory(Category::Mods),
        SyncTarget::Directory(Category::Resourcepacks),
        SyncTarget::Directory(Category::Shaderpacks),
        SyncTarget::File(SingletonFile::Options),
        SyncTarget::File(SingletonFile::Servers),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTarget::Directory(c) => c.as_str(),
            SyncTarget::File(f) => f.as_str(),
        }
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTarget {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(category) = s.parse::<Category>() {
            return Ok(SyncTarget::Directory(category));
        }
        s.parse::<SingletonFile>().map(SyncTarget::File)
    }
}

/// Game client parameters published by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub server_ip: String,
    #[serde(default)]
    pub fabric_version: String,
    #[serde(default)]
    pub loader_version: String,
}

/// Remote launcher configuration.
///
/// Fetched once per engine and never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Sync target name → source URL. A `null` URL disables the target.
    #[serde(default)]
    pub urls: HashMap<String, Option<String>>,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub altnames: Option<HashMap<String, String>>,
    #[serde(default)]
    pub bulletin: Option<serde_json::Value>,
}

impl Manifest {
    /// Listing URL for a directory category.
    ///
    /// `None` means the category is disabled: the key is missing, null or
    /// blank. Callers must skip the category rather than treat it as empty.
    pub fn directory_url(&self, category: Category) -> Option<&str> {
        self.url_for(category.as_str())
    }

    /// Source URL for a singleton file.
    ///
    /// A missing key is a configuration error; a present key with a null or
    /// blank URL yields `Ok(None)`.
    pub fn file_url(&self, file: SingletonFile) -> LauncherResult<Option<&str>> {
        if !self.urls.contains_key(file.as_str()) {
            return Err(LauncherError::MissingManifestEntry(file.as_str().to_string()));
        }
        Ok(self.url_for(file.as_str()))
    }

    /// Keys under `urls` that do not name a known sync target.
    pub fn unknown_url_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .urls
            .keys()
            .map(String::as_str)
            .filter(|k| k.parse::<SyncTarget>().is_err())
            .collect();
        keys.sort_unstable();
        keys
    }

    fn url_for(&self, key: &str) -> Option<&str> {
        self.urls
            .get(key)
            .and_then(|u| u.as_deref())
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// A file the server offers for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub download_url: String,
    /// Git blob SHA-1 of the content, when the listing provides it.
    #[serde(default)]
    pub sha: Option<String>,
}

impl RemoteFile {
    /// Whether `name` is a bare file name that stays inside its directory.
    pub fn has_safe_name(&self) -> bool {
        is_safe_file_name(&self.name)
    }
}

/// A bare file name: not empty, not `.`/`..`, no path separators.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}
