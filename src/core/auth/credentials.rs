use std::path::{Path, PathBuf};

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, error};

const CREDS_FILE: &str = "creds";
const KDF_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Why a stored credential could not be produced.
///
/// `NotFound` means nothing was ever stored; the other kinds mean something
/// is stored but unusable with the supplied passphrase.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("No credential stored at {0:?}")]
    NotFound(PathBuf),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Credential decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Credential storage error: {0}")]
    Storage(String),
}

/// File-backed store for a single encrypted secret.
///
/// The file holds base64 of `salt || nonce || AES-256-GCM ciphertext`; the
/// key is derived from the passphrase and salt with PBKDF2-HMAC-SHA256.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(store_dir: &Path) -> Self {
        Self {
            path: store_dir.join(CREDS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Decrypt the stored secret.
    pub fn load(&self, passphrase: &str) -> Result<String, CredentialError> {
        let encoded = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!("API key file not found at {:?}", self.path);
                return Err(CredentialError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(CredentialError::Storage(e.to_string())),
        };

        let secret = decrypt(encoded.trim(), passphrase).inspect_err(|e| error!("{e}"))?;

        debug!("Credential loaded from {:?}", self.path);
        Ok(secret)
    }

    /// Encrypt `secret` under `passphrase` and persist it, replacing any
    /// previous value. A fresh salt and nonce are used on every call.
    pub fn store(&self, passphrase: &str, secret: &str) -> Result<(), CredentialError> {
        let encoded = encrypt(secret, passphrase)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CredentialError::Storage(e.to_string()))?;
        }
        std::fs::write(&self.path, encoded).map_err(|e| CredentialError::Storage(e.to_string()))?;

        debug!("Credential stored at {:?}", self.path);
        Ok(())
    }
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_LEN], CredentialError> {
    if passphrase.is_empty() {
        return Err(CredentialError::KeyDerivationFailed(
            "passphrase is empty".into(),
        ));
    }

    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, KDF_ROUNDS, &mut key);
    Ok(key)
}

fn cipher(key: &[u8; KEY_LEN]) -> Result<Aes256Gcm, CredentialError> {
    Aes256Gcm::new_from_slice(key).map_err(|e| CredentialError::KeyDerivationFailed(e.to_string()))
}

fn encrypt(secret: &str, passphrase: &str) -> Result<String, CredentialError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let cipher = cipher(&derive_key(passphrase, &salt)?)?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, secret.as_bytes())
        .map_err(|e| CredentialError::Storage(format!("encrypt secret: {e}")))?;

    let mut payload = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    payload.extend_from_slice(&salt);
    payload.extend_from_slice(nonce.as_slice());
    payload.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(payload))
}

fn decrypt(encoded: &str, passphrase: &str) -> Result<String, CredentialError> {
    if passphrase.is_empty() {
        return Err(CredentialError::KeyDerivationFailed(
            "passphrase is empty".into(),
        ));
    }

    let data = BASE64
        .decode(encoded)
        .map_err(|e| CredentialError::DecryptionFailed(format!("decode secret: {e}")))?;

    if data.len() <= SALT_LEN + NONCE_LEN {
        return Err(CredentialError::DecryptionFailed(
            "stored secret payload too small".into(),
        ));
    }

    let (salt, rest) = data.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
    let key = derive_key(passphrase, salt)?;
    let plaintext = cipher(&key)?
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CredentialError::DecryptionFailed("authentication failed".into()))?;

    String::from_utf8(plaintext)
        .map_err(|_| CredentialError::DecryptionFailed("secret is not valid UTF-8".into()))
}
