//! Storage backends for the tiered credential store.
//!
//! Three tiers, in preference order:
//! - OS keyring (JSON record as the entry secret)
//! - encrypted file (ChaCha20-Poly1305 envelope plus a local key file)
//! - plaintext `KEY=VALUE` file
//!
//! All file writes go through a temp-file-then-rename so a reader never
//! observes a partially written record.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::crypto::{restrict_permissions, Envelope, FileCipher};
use super::{CredentialRecord, StorageTier};
use crate::error::{CliError, Result};

/// Keyring service name for ytrack credentials.
const KEYRING_SERVICE: &str = "ytrack";

/// Keyring account name. One credential set per machine user.
const KEYRING_USER: &str = "default";

/// Encrypted data file name inside the data directory.
const ENCRYPTED_FILE: &str = "credentials.enc";

/// Encryption key file name inside the data directory.
const KEY_FILE: &str = "credentials.key";

/// Plaintext fallback file name inside the data directory.
const PLAINTEXT_FILE: &str = "credentials";

/// A single credential storage location.
///
/// `load` distinguishes "nothing stored" (`Ok(None)`) from "tier unusable"
/// (`Err`). The store walks past both, but only the latter contributes to
/// the failure details when every tier comes up empty.
pub trait CredentialBackend {
    /// The tier this backend implements.
    fn tier(&self) -> StorageTier;

    /// Read the stored record, if any.
    fn load(&self) -> Result<Option<CredentialRecord>>;

    /// Persist a record, replacing any previous one.
    fn store(&self, record: &CredentialRecord) -> Result<()>;

    /// Remove any stored record. Absent data is not an error.
    fn clear(&self) -> Result<()>;
}

/// OS keyring tier.
pub struct KeyringBackend {
    service: String,
    user: String,
}

impl KeyringBackend {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            user: KEYRING_USER.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.user)
            .map_err(|e| CliError::Internal(format!("keyring unavailable: {}", e)))
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialBackend for KeyringBackend {
    fn tier(&self) -> StorageTier {
        StorageTier::Keyring
    }

    fn load(&self) -> Result<Option<CredentialRecord>> {
        let payload = match self.entry()?.get_password() {
            Ok(payload) => payload,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => {
                return Err(CliError::Internal(format!("keyring read failed: {}", e)));
            }
        };

        let mut record: CredentialRecord = serde_json::from_str(&payload)
            .map_err(|e| CliError::Internal(format!("stored keyring entry is corrupt: {}", e)))?;
        record.validate()?;
        record.storage_tier = Some(StorageTier::Keyring);
        Ok(Some(record))
    }

    fn store(&self, record: &CredentialRecord) -> Result<()> {
        let payload = serde_json::to_string(record)
            .map_err(|e| CliError::Internal(format!("failed to serialize credentials: {}", e)))?;
        self.entry()?
            .set_password(&payload)
            .map_err(|e| CliError::Internal(format!("keyring write failed: {}", e)))
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CliError::Internal(format!("keyring delete failed: {}", e))),
        }
    }
}

/// Encrypted file tier.
pub struct EncryptedFileBackend {
    data_path: PathBuf,
    key_path: PathBuf,
}

impl EncryptedFileBackend {
    pub fn new(dir: &Path) -> Self {
        Self {
            data_path: dir.join(ENCRYPTED_FILE),
            key_path: dir.join(KEY_FILE),
        }
    }
}

impl CredentialBackend for EncryptedFileBackend {
    fn tier(&self) -> StorageTier {
        StorageTier::EncryptedFile
    }

    fn load(&self) -> Result<Option<CredentialRecord>> {
        if !self.data_path.exists() {
            return Ok(None);
        }
        if !self.key_path.exists() {
            return Err(CliError::Internal(format!(
                "encryption key missing for {}",
                self.data_path.display()
            )));
        }

        let content = fs::read_to_string(&self.data_path)?;
        let envelope: Envelope = serde_json::from_str(&content).map_err(|e| {
            CliError::Internal(format!("encrypted credential file is corrupt: {}", e))
        })?;

        let plaintext = FileCipher::load(&self.key_path)?.decrypt(&envelope)?;
        let mut record: CredentialRecord = serde_json::from_slice(&plaintext).map_err(|e| {
            CliError::Internal(format!("decrypted credential payload is corrupt: {}", e))
        })?;
        record.validate()?;
        record.storage_tier = Some(StorageTier::EncryptedFile);
        Ok(Some(record))
    }

    fn store(&self, record: &CredentialRecord) -> Result<()> {
        let payload = serde_json::to_vec(record)
            .map_err(|e| CliError::Internal(format!("failed to serialize credentials: {}", e)))?;

        let cipher = FileCipher::load_or_generate(&self.key_path)?;
        let envelope = cipher.encrypt(&payload)?;
        let content = serde_json::to_string(&envelope)
            .map_err(|e| CliError::Internal(format!("failed to serialize envelope: {}", e)))?;

        write_atomic(&self.data_path, content.as_bytes())
    }

    fn clear(&self) -> Result<()> {
        remove_if_exists(&self.data_path)?;
        remove_if_exists(&self.key_path)
    }
}

/// Plaintext `KEY=VALUE` file tier, the last resort.
pub struct PlaintextFileBackend {
    path: PathBuf,
}

impl PlaintextFileBackend {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(PLAINTEXT_FILE),
        }
    }
}

impl CredentialBackend for PlaintextFileBackend {
    fn tier(&self) -> StorageTier {
        StorageTier::PlaintextFile
    }

    fn load(&self) -> Result<Option<CredentialRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let mut record = parse_plaintext(&content)?;
        record.storage_tier = Some(StorageTier::PlaintextFile);
        Ok(Some(record))
    }

    fn store(&self, record: &CredentialRecord) -> Result<()> {
        write_atomic(&self.path, render_plaintext(record).as_bytes())
    }

    fn clear(&self) -> Result<()> {
        remove_if_exists(&self.path)
    }
}

/// Parse the plaintext credential file format.
///
/// Blank lines and `#` comments are skipped; unknown keys are ignored so a
/// newer version of the file still loads.
fn parse_plaintext(content: &str) -> Result<CredentialRecord> {
    let mut record = CredentialRecord::default();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(CliError::Internal(format!(
                "malformed line {} in credential file",
                index + 1
            )));
        };
        let value = value.trim();

        match key.trim() {
            "YOUTRACK_BASE_URL" => record.base_url = value.to_string(),
            "YOUTRACK_TOKEN" => record.token = Some(value.to_string()),
            "YOUTRACK_USERNAME" => record.username = Some(value.to_string()),
            "YOUTRACK_PASSWORD" => record.password = Some(value.to_string()),
            "YOUTRACK_TOKEN_EXPIRES" => {
                let parsed = DateTime::parse_from_rfc3339(value).map_err(|e| {
                    CliError::Internal(format!("invalid expiry timestamp in credential file: {}", e))
                })?;
                record.expires_at = Some(parsed.with_timezone(&Utc));
            }
            other => debug!("ignoring unknown credential file key: {}", other),
        }
    }

    record.validate()?;
    Ok(record)
}

/// Render a record into the plaintext credential file format.
fn render_plaintext(record: &CredentialRecord) -> String {
    let mut lines = vec![format!("YOUTRACK_BASE_URL={}", record.base_url)];
    if let Some(token) = &record.token {
        lines.push(format!("YOUTRACK_TOKEN={}", token));
    }
    if let Some(username) = &record.username {
        lines.push(format!("YOUTRACK_USERNAME={}", username));
    }
    if let Some(password) = &record.password {
        lines.push(format!("YOUTRACK_PASSWORD={}", password));
    }
    if let Some(expires_at) = &record.expires_at {
        lines.push(format!("YOUTRACK_TOKEN_EXPIRES={}", expires_at.to_rfc3339()));
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Write via a temp file in the same directory, then rename over the target.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        CliError::Internal(format!("no parent directory for {}", path.display()))
    })?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| CliError::Internal(format!("invalid file name {}", path.display())))?;
    let tmp = parent.join(format!("{}.tmp", file_name));

    fs::write(&tmp, contents)?;
    restrict_permissions(&tmp)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
