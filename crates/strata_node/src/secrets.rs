//! Password-sealed key material.
//!
//! The secrets file holds a random salt and the node's signing and encryption
//! keys sealed under a key derived from the password with Argon2id. Nothing
//! is readable until [`SecretStore::unlock`] succeeds.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use argon2::Argon2;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use strata_core::crypto::{self, public_key_hex, EncryptionKey};
use strata_core::Address;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("Account is locked")]
    Locked,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Secrets file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("No secrets file at {0}, create an account first")]
    Missing(PathBuf),

    #[error("Key derivation failed: {0}")]
    Kdf(String),

    #[error("Corrupt secrets file: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Unlocked key material.
pub struct Secrets {
    pub signing_key: SigningKey,
    pub encryption_key: EncryptionKey,
}

impl Secrets {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            encryption_key: EncryptionKey::generate(),
        }
    }

    /// Hex of the verifying key.
    pub fn owner_key(&self) -> String {
        public_key_hex(&self.signing_key)
    }

    pub fn address(&self) -> Address {
        Address::new(self.owner_key())
    }
}

#[derive(Serialize, Deserialize)]
struct SealedFile {
    salt: String,
    sealed: String,
}

#[derive(Serialize, Deserialize)]
struct PlainSecrets {
    signing_key: String,
    encryption_key: String,
}

pub struct SecretStore {
    path: PathBuf,
    unlocked: RwLock<Option<Arc<Secrets>>>,
}

fn derive_key(password: &str, salt: &[u8]) -> Result<EncryptionKey, SecretsError> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| SecretsError::Kdf(e.to_string()))?;
    Ok(EncryptionKey::new(key))
}

fn decode_32(field: &str, value: &str) -> Result<[u8; 32], SecretsError> {
    hex::decode(value)
        .map_err(|e| SecretsError::Corrupt(format!("{field}: {e}")))?
        .try_into()
        .map_err(|_| SecretsError::Corrupt(format!("{field}: expected 32 bytes")))
}

impl SecretStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            unlocked: RwLock::new(None),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn is_locked(&self) -> bool {
        self.unlocked
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Generate fresh keys, seal them under `password` and leave the store
    /// unlocked.
    pub fn create(&self, password: &str) -> Result<Address, SecretsError> {
        if self.exists() {
            return Err(SecretsError::AlreadyExists(self.path.clone()));
        }

        let secrets = Secrets::generate();
        let plain = PlainSecrets {
            signing_key: hex::encode(secrets.signing_key.to_bytes()),
            encryption_key: hex::encode(secrets.encryption_key.as_bytes()),
        };
        let plain =
            serde_json::to_vec(&plain).map_err(|e| SecretsError::Corrupt(e.to_string()))?;

        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let key = derive_key(password, &salt)?;
        let sealed =
            crypto::encrypt(&key, &plain).map_err(|e| SecretsError::Corrupt(e.to_string()))?;

        let file = SealedFile {
            salt: hex::encode(salt),
            sealed: hex::encode(sealed),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(
            &self.path,
            serde_json::to_vec_pretty(&file).map_err(|e| SecretsError::Corrupt(e.to_string()))?,
        )?;

        let address = secrets.address();
        self.store(secrets);
        info!("Created account {address}");
        Ok(address)
    }

    /// Decrypt the secrets file into memory.
    pub fn unlock(&self, password: &str) -> Result<Address, SecretsError> {
        if !self.exists() {
            return Err(SecretsError::Missing(self.path.clone()));
        }

        let raw = fs::read(&self.path)?;
        let file: SealedFile =
            serde_json::from_slice(&raw).map_err(|e| SecretsError::Corrupt(e.to_string()))?;
        let salt = hex::decode(&file.salt).map_err(|e| SecretsError::Corrupt(e.to_string()))?;
        let sealed =
            hex::decode(&file.sealed).map_err(|e| SecretsError::Corrupt(e.to_string()))?;

        let key = derive_key(password, &salt)?;
        let plain = crypto::decrypt(&key, &sealed).map_err(|_| SecretsError::InvalidPassword)?;
        let plain: PlainSecrets =
            serde_json::from_slice(&plain).map_err(|e| SecretsError::Corrupt(e.to_string()))?;

        let secrets = Secrets {
            signing_key: SigningKey::from_bytes(&decode_32("signing_key", &plain.signing_key)?),
            encryption_key: EncryptionKey::new(decode_32(
                "encryption_key",
                &plain.encryption_key,
            )?),
        };
        let address = secrets.address();
        self.store(secrets);
        info!("Unlocked account {address}");
        Ok(address)
    }

    /// Unlocked secrets, or `Locked`.
    pub fn secrets(&self) -> Result<Arc<Secrets>, SecretsError> {
        self.unlocked
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(SecretsError::Locked)
    }

    /// Install already-available secrets, bypassing the file.
    pub fn store(&self, secrets: Secrets) {
        *self.unlocked.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(secrets));
    }

    pub fn lock(&self) {
        *self.unlocked.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
