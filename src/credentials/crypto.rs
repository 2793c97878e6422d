//! Envelope encryption for the encrypted credential file backend.
//!
//! A 32-byte key lives next to the data file with owner-only permissions.
//! Records are sealed with ChaCha20-Poly1305 under a fresh random nonce and
//! stored as a small JSON envelope, so a corrupt or truncated file fails
//! authentication instead of yielding garbage.

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

/// Envelope format version.
const ENVELOPE_VERSION: u32 = 1;

/// Key length in bytes.
const KEY_LEN: usize = 32;

/// Nonce length in bytes.
const NONCE_LEN: usize = 12;

/// On-disk encryption envelope. Byte fields are base64-encoded.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub nonce: String,
    pub ciphertext: String,
}

/// Cipher bound to a key file on disk.
pub struct FileCipher {
    cipher: ChaCha20Poly1305,
}

impl FileCipher {
    /// Open the cipher for an existing key file, or generate a new key.
    pub fn load_or_generate(key_path: &Path) -> Result<Self> {
        if key_path.exists() {
            Self::load(key_path)
        } else {
            Self::generate(key_path)
        }
    }

    /// Open the cipher for an existing key file.
    ///
    /// # Errors
    ///
    /// Returns an error if the key file cannot be read or has the wrong
    /// length.
    pub fn load(key_path: &Path) -> Result<Self> {
        let key_bytes = fs::read(key_path).map_err(|e| {
            CliError::Internal(format!(
                "failed to read encryption key {}: {}",
                key_path.display(),
                e
            ))
        })?;

        if key_bytes.len() != KEY_LEN {
            return Err(CliError::Internal(format!(
                "encryption key {} has invalid length {}",
                key_path.display(),
                key_bytes.len()
            )));
        }

        let key = Key::from_slice(&key_bytes);
        Ok(Self {
            cipher: ChaCha20Poly1305::new(key),
        })
    }

    /// Generate a fresh key, persist it with restrictive permissions, and
    /// open the cipher for it.
    fn generate(key_path: &Path) -> Result<Self> {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);

        if let Some(parent) = key_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(key_path, key.as_slice())?;
        restrict_permissions(key_path)?;

        Ok(Self {
            cipher: ChaCha20Poly1305::new(&key),
        })
    }

    /// Seal `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Envelope> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CliError::Internal("credential encryption failed".to_string()))?;

        Ok(Envelope {
            version: ENVELOPE_VERSION,
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    /// Open an envelope, authenticating the ciphertext.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown version, malformed base64, or failed
    /// authentication (wrong key or tampered data).
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        if envelope.version != ENVELOPE_VERSION {
            return Err(CliError::Internal(format!(
                "unsupported credential envelope version {}",
                envelope.version
            )));
        }

        let nonce_bytes = BASE64
            .decode(&envelope.nonce)
            .map_err(|e| CliError::Internal(format!("corrupt envelope nonce: {}", e)))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CliError::Internal(
                "corrupt envelope nonce".to_string(),
            ));
        }

        let ciphertext = BASE64
            .decode(&envelope.ciphertext)
            .map_err(|e| CliError::Internal(format!("corrupt envelope ciphertext: {}", e)))?;

        let nonce = Nonce::from_slice(&nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| CliError::Internal("credential decryption failed".to_string()))
    }
}

/// Restrict a file to owner read/write. No-op on non-Unix platforms.
pub(crate) fn restrict_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
