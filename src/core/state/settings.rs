use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::downloader::{DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT};
use crate::core::error::{LauncherError, LauncherResult};

pub const SETTINGS_FILE: &str = "launcher_settings.json";

pub const DEFAULT_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/hominum-mc/launcher-config/main/config.json";

/// Game options carried over between launches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub autojoin: bool,
    pub ram_jvm_args: Vec<String>,
    pub additional_jvm_args: Vec<String>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            autojoin: true,
            ram_jvm_args: vec!["-Xms2048M".into(), "-Xmx2048M".into()],
            additional_jvm_args: [
                "-XX:+UnlockExperimentalVMOptions",
                "-XX:+UseG1GC",
                "-XX:G1NewSizePercent=20",
                "-XX:G1ReservePercent=20",
                "-XX:MaxGCPauseMillis=50",
                "-XX:G1HeapRegionSize=32M",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    /// Where the remote launcher configuration lives.
    pub manifest_url: String,
    /// Overrides `<data_dir>/Store/mcdata`.
    pub work_dir: Option<PathBuf>,
    pub download_concurrency: usize,
    pub download_timeout_secs: u64,
    pub game: GameSettings,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            manifest_url: DEFAULT_MANIFEST_URL.into(),
            work_dir: None,
            download_concurrency: DEFAULT_CONCURRENCY,
            download_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            game: GameSettings::default(),
        }
    }
}

impl LauncherSettings {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn validate(&self) -> LauncherResult<()> {
        if self.manifest_url.trim().is_empty() {
            return Err(LauncherError::InvalidSettings("manifest_url is empty".into()));
        }
        if self.download_concurrency == 0 {
            return Err(LauncherError::InvalidSettings(
                "download_concurrency must be at least 1".into(),
            ));
        }
        if self.download_timeout_secs == 0 {
            return Err(LauncherError::InvalidSettings(
                "download_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Set one field from its textual form, as typed on the command line.
    /// Nothing changes unless the result validates.
    pub fn set(&mut self, key: &str, value: &str) -> LauncherResult<()> {
        let invalid = |what: &str| LauncherError::InvalidSettings(format!("{key}: {what}"));
        let mut next = self.clone();

        match key {
            "manifest_url" => next.manifest_url = value.trim().to_string(),
            "work_dir" => {
                next.work_dir = match value.trim() {
                    "" => None,
                    path => Some(PathBuf::from(path)),
                }
            }
            "download_concurrency" => {
                next.download_concurrency =
                    value.trim().parse().map_err(|_| invalid("expected a number"))?
            }
            "download_timeout_secs" => {
                next.download_timeout_secs =
                    value.trim().parse().map_err(|_| invalid("expected a number"))?
            }
            "game.autojoin" => {
                next.game.autojoin = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid("expected true or false"))?
            }
            "game.ram_jvm_args" => next.game.ram_jvm_args = split_args(value),
            "game.additional_jvm_args" => next.game.additional_jvm_args = split_args(value),
            _ => return Err(invalid("unknown setting")),
        }

        next.validate()?;
        *self = next;
        debug!("Setting '{}' updated", key);
        Ok(())
    }

    /// Read settings from `data_dir`, falling back to defaults when the file
    /// is missing or damaged.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {:?}; using defaults", path);
                return Self::default();
            }
            Err(e) => {
                warn!("Cannot read {:?}: {}; using defaults", path, e);
                return Self::default();
            }
        };

        match serde_json::from_str::<Self>(&raw) {
            Ok(settings) => match settings.validate() {
                Ok(()) => settings,
                Err(e) => {
                    warn!("Settings file is invalid ({}); using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Settings file damaged at {:?}: {}; using defaults", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, data_dir: &Path) -> LauncherResult<()> {
        let path = data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::create_dir_all(data_dir).map_err(|source| LauncherError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| LauncherError::Io { path, source })
    }
}

fn split_args(value: &str) -> Vec<String> {
    value.split_whitespace().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(LauncherSettings::load(dir.path()), LauncherSettings::default());
    }

    #[test]
    fn save_then_load_keeps_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = LauncherSettings::default();
        settings.set("download_concurrency", "3").unwrap();
        settings.set("work_dir", "/games/mc").unwrap();
        settings.set("game.autojoin", "false").unwrap();
        settings.save(dir.path()).unwrap();

        let loaded = LauncherSettings::load(dir.path());
        assert_eq!(loaded.download_concurrency, 3);
        assert_eq!(loaded.work_dir, Some(PathBuf::from("/games/mc")));
        assert!(!loaded.game.autojoin);
    }

    #[test]
    fn damaged_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ not json").unwrap();
        assert_eq!(LauncherSettings::load(dir.path()), LauncherSettings::default());

        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"download_concurrency": 0}"#,
        )
        .unwrap();
        assert_eq!(LauncherSettings::load(dir.path()), LauncherSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"manifest_url": "https://example.com/config.json"}"#,
        )
        .unwrap();

        let loaded = LauncherSettings::load(dir.path());
        assert_eq!(loaded.manifest_url, "https://example.com/config.json");
        assert_eq!(loaded.download_concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(loaded.game, GameSettings::default());
    }

    #[test]
    fn set_rejects_bad_input() {
        let mut settings = LauncherSettings::default();
        assert!(settings.set("download_concurrency", "many").is_err());
        assert!(settings.set("download_concurrency", "0").is_err());
        assert!(settings.set("manifest_url", "  ").is_err());
        assert!(settings.set("colour", "blue").is_err());
        assert_eq!(settings, LauncherSettings::default());

        settings.set("game.ram_jvm_args", "-Xms4G  -Xmx4G").unwrap();
        assert_eq!(settings.game.ram_jvm_args, vec!["-Xms4G", "-Xmx4G"]);
    }
}
