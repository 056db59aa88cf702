use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::settings::LauncherSettings;
use crate::core::auth::{CredentialError, CredentialStore};
use crate::core::downloader::{Downloader, HttpFetcher};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::manifest::HttpManifestClient;
use crate::core::sync::SyncEngine;

const APP_DIR_NAME: &str = "Hominum";
const STORE_DIR: &str = "Store";
const WORK_DIR: &str = "mcdata";

pub const PASSPHRASE_ENV: &str = "HOMINUM_PASSPHRASE";

pub struct AppState {
    pub data_dir: PathBuf,
    pub launcher_settings: LauncherSettings,
    /// Session-only work dir, never written back to settings.
    pub work_dir_override: Option<PathBuf>,
}

impl AppState {
    /// Resolve the data directory and load settings from it.
    pub fn new(data_dir: Option<PathBuf>) -> LauncherResult<Self> {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        std::fs::create_dir_all(&data_dir).map_err(|source| LauncherError::Io {
            path: data_dir.clone(),
            source,
        })?;

        let launcher_settings = LauncherSettings::load(&data_dir);
        debug!("Data directory: {:?}", data_dir);

        Ok(Self {
            data_dir,
            launcher_settings,
            work_dir_override: None,
        })
    }

    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join(STORE_DIR)
    }

    /// Root the sync engine writes into.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir_override
            .as_ref()
            .or(self.launcher_settings.work_dir.as_ref())
            .cloned()
            .unwrap_or_else(|| self.store_dir().join(WORK_DIR))
    }

    pub fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(&self.store_dir())
    }

    pub fn save_settings(&self) -> LauncherResult<()> {
        self.launcher_settings.validate()?;
        self.launcher_settings.save(&self.data_dir)
    }

    /// Decrypt the API token with `passphrase`, if one is stored.
    ///
    /// Only a missing credential is tolerated; a stored credential that
    /// cannot be decrypted is an error.
    pub fn api_token(&self, passphrase: Option<&str>) -> LauncherResult<Option<String>> {
        let Some(passphrase) = passphrase else {
            debug!("{} not set; connecting without API token", PASSPHRASE_ENV);
            return Ok(None);
        };

        match self.credential_store().load(passphrase) {
            Ok(token) => Ok(Some(token)),
            Err(CredentialError::NotFound(path)) => {
                debug!("No API token at {:?}", path);
                Ok(None)
            }
            Err(e) => {
                warn!("API token unusable: {}", e);
                Err(e.into())
            }
        }
    }

    /// Build the HTTP stack from settings and fetch the manifest.
    pub async fn connect_engine(&self, passphrase: Option<&str>) -> LauncherResult<SyncEngine> {
        self.launcher_settings.validate()?;
        let settings = &self.launcher_settings;

        let token = self.api_token(passphrase)?;
        let http = build_http_client(token.as_deref())?;

        let client = Arc::new(
            HttpManifestClient::new(http.clone(), settings.manifest_url.clone())
                .with_timeout(settings.download_timeout()),
        );
        let downloader = Downloader::new(Arc::new(HttpFetcher::new(http)))
            .with_concurrency(settings.download_concurrency)
            .with_timeout(settings.download_timeout());

        let work_dir = self.work_dir();
        info!("Syncing into {:?} from {}", work_dir, settings.manifest_url);
        SyncEngine::connect(client, downloader, work_dir).await
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Some(dir.path().to_path_buf())).unwrap();

        assert_eq!(state.store_dir(), dir.path().join("Store"));
        assert_eq!(state.work_dir(), dir.path().join("Store").join("mcdata"));
        assert_eq!(
            state.credential_store().path(),
            dir.path().join("Store").join("creds")
        );
    }

    #[test]
    fn work_dir_override_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = AppState::new(Some(dir.path().to_path_buf())).unwrap();
        state.launcher_settings.work_dir = Some(dir.path().join("game"));
        state.save_settings().unwrap();

        let mut reloaded = AppState::new(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(reloaded.work_dir(), dir.path().join("game"));

        reloaded.work_dir_override = Some(dir.path().join("session"));
        reloaded.save_settings().unwrap();
        assert_eq!(reloaded.work_dir(), dir.path().join("session"));
        assert_eq!(
            LauncherSettings::load(dir.path()).work_dir,
            Some(dir.path().join("game"))
        );
    }

    #[test]
    fn api_token_tolerates_only_a_missing_credential() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Some(dir.path().to_path_buf())).unwrap();

        assert_eq!(state.api_token(None).unwrap(), None);
        assert_eq!(state.api_token(Some("pass")).unwrap(), None);

        state.credential_store().store("pass", "tok-123").unwrap();
        assert_eq!(
            state.api_token(Some("pass")).unwrap().as_deref(),
            Some("tok-123")
        );
        assert!(matches!(
            state.api_token(Some("wrong")),
            Err(LauncherError::Credential(CredentialError::DecryptionFailed(_)))
        ));
    }

    #[tokio::test]
    async fn connect_rejects_invalid_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = AppState::new(Some(dir.path().to_path_buf())).unwrap();
        state.launcher_settings.download_concurrency = 0;

        let err = state.connect_engine(None).await.err().unwrap();
        assert!(err.is_configuration());
    }
}
