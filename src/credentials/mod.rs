//! Tiered credential storage and resolution.
//!
//! Credentials live in the most secure tier available:
//! - `KEYRING`: the operating system keyring
//! - `ENCRYPTED_FILE`: a ChaCha20-Poly1305 encrypted file
//! - `PLAINTEXT_FILE`: a plaintext file, last resort
//!
//! Reads walk the tiers in that order and take the first usable record.
//! Environment credentials (`YT_TOKEN`, `YT_USERNAME`/`YT_PASSWORD`) bypass
//! the store entirely.

pub mod backend;
mod crypto;

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{CliError, Result};
use crate::redact::{redact, MASK};

pub use backend::{
    CredentialBackend, EncryptedFileBackend, KeyringBackend, PlaintextFileBackend,
};

/// Seconds in a day, for expiry math.
const DAY_SECS: i64 = 86_400;

/// Where a credential record is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageTier {
    Keyring,
    EncryptedFile,
    PlaintextFile,
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Keyring => "KEYRING",
            Self::EncryptedFile => "ENCRYPTED_FILE",
            Self::PlaintextFile => "PLAINTEXT_FILE",
        };
        write!(f, "{}", name)
    }
}

/// A stored credential set for one YouTrack instance.
///
/// Either `token` or the `username`/`password` pair must be present. The
/// `storage_tier` field is stamped on load and never persisted.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub base_url: String,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub storage_tier: Option<StorageTier>,
}

impl CredentialRecord {
    /// A token-based record.
    pub fn with_token(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// A username/password record.
    pub fn with_password(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Check that the record is complete enough to authenticate with.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(CliError::InvalidInput("a base URL is required".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(CliError::InvalidInput(
                "the base URL must use the http or https scheme".to_string(),
            ));
        }
        let has_pair = self.username.is_some() && self.password.is_some();
        if self.token.is_none() && !has_pair {
            return Err(CliError::InvalidInput(
                "a token or a username and password are required".to_string(),
            ));
        }
        Ok(())
    }

    /// The `Authorization` header value for this record.
    pub fn auth_header(&self) -> Option<String> {
        if let Some(token) = &self.token {
            return Some(format!("Bearer {}", token));
        }
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                let encoded = BASE64.encode(format!("{}:{}", user, pass));
                Some(format!("Basic {}", encoded))
            }
            _ => None,
        }
    }

    /// Expiry state relative to now.
    pub fn token_status(&self, warning_days: i64) -> TokenStatus {
        let Some(expires_at) = self.expires_at else {
            return TokenStatus::Unknown;
        };
        let secs = (expires_at - Utc::now()).num_seconds();
        if secs <= 0 {
            return TokenStatus::Expired;
        }
        // Ceiling division: a token with 71 hours left has three days left.
        let days_left = (secs + DAY_SECS - 1) / DAY_SECS;
        if days_left <= warning_days {
            TokenStatus::Expiring(days_left)
        } else {
            TokenStatus::Valid
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| MASK))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| MASK))
            .field("expires_at", &self.expires_at)
            .field("storage_tier", &self.storage_tier)
            .finish()
    }
}

/// Token expiry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Not within the warning window.
    Valid,
    /// Expires within the warning window; holds whole days left.
    Expiring(i64),
    Expired,
    /// No expiry recorded.
    Unknown,
}

/// Where resolved credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    Store(StorageTier),
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment => write!(f, "environment"),
            Self::Store(tier) => write!(f, "{}", tier),
        }
    }
}

/// Credentials ready for use, with their provenance.
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub record: CredentialRecord,
    pub source: CredentialSource,
}

/// The tiered store. Backends are ordered from most to least preferred.
pub struct CredentialStore {
    backends: Vec<Box<dyn CredentialBackend>>,
}

impl CredentialStore {
    /// A store rooted at the default data directory, with all three tiers.
    pub fn new() -> Result<Self> {
        let dir = crate::config::data_dir()?;
        Ok(Self::with_backends(vec![
            Box::new(KeyringBackend::new()),
            Box::new(EncryptedFileBackend::new(&dir)),
            Box::new(PlaintextFileBackend::new(&dir)),
        ]))
    }

    /// A store over an explicit backend chain.
    pub fn with_backends(backends: Vec<Box<dyn CredentialBackend>>) -> Self {
        Self { backends }
    }

    /// Walk the tiers in preference order and return the first usable record.
    ///
    /// Unusable tiers are skipped with a debug log. `Ok(None)` means no tier
    /// holds anything; if at least one tier failed while none loaded, the
    /// error carries the per-tier failures in its details.
    pub fn load(&self) -> Result<Option<CredentialRecord>> {
        let mut failures = Vec::new();
        for backend in &self.backends {
            match backend.load() {
                Ok(Some(record)) => {
                    debug!(tier = %backend.tier(), "loaded credentials");
                    return Ok(Some(record));
                }
                Ok(None) => continue,
                Err(e) => {
                    debug!(tier = %backend.tier(), error = %e, "skipping unusable credential tier");
                    failures.push(format!("{}: {}", backend.tier(), e));
                }
            }
        }
        if failures.is_empty() {
            Ok(None)
        } else {
            Err(CliError::NoCredentials {
                details: Some(redact(&failures.join("; "))),
            })
        }
    }

    /// Store a record in the most secure tier that accepts it.
    ///
    /// Returns the tier that took the write so callers can warn when the
    /// plaintext fallback was used.
    ///
    /// # Errors
    ///
    /// `CliError::CredentialStoreFailed` when every tier rejects the write.
    pub fn store(&self, record: &CredentialRecord) -> Result<StorageTier> {
        record.validate()?;

        let mut failures = Vec::new();
        for backend in &self.backends {
            match backend.store(record) {
                Ok(()) => {
                    debug!(tier = %backend.tier(), "stored credentials");
                    return Ok(backend.tier());
                }
                Err(e) => {
                    warn!(tier = %backend.tier(), error = %e, "credential tier rejected write, trying next");
                    failures.push(format!("{}: {}", backend.tier(), e));
                }
            }
        }

        let details = if failures.is_empty() {
            "no storage tiers available".to_string()
        } else {
            redact(&failures.join("; "))
        };
        Err(CliError::CredentialStoreFailed { details })
    }

    /// Remove credentials from every tier.
    ///
    /// All tiers are attempted even when one fails; failures are reported
    /// together afterwards.
    pub fn clear(&self) -> Result<()> {
        let mut failures = Vec::new();
        for backend in &self.backends {
            if let Err(e) = backend.clear() {
                warn!(tier = %backend.tier(), error = %e, "failed to clear credential tier");
                failures.push(format!("{}: {}", backend.tier(), e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CliError::CredentialStoreFailed {
                details: redact(&failures.join("; ")),
            })
        }
    }

    /// Resolve credentials for a request: environment first, then the store.
    ///
    /// # Errors
    ///
    /// `CliError::NoCredentials` when neither the environment nor any tier
    /// yields a usable record. `CliError::InvalidInput` when environment
    /// credentials are set but no base URL is configured.
    pub fn resolve(&self, settings: &Settings) -> Result<ResolvedCredentials> {
        if let Some(record) = env_credentials(settings)? {
            debug!("using credentials from environment");
            return Ok(ResolvedCredentials {
                record,
                source: CredentialSource::Environment,
            });
        }

        match self.load()? {
            Some(record) => {
                let tier = record.storage_tier.unwrap_or(StorageTier::PlaintextFile);
                Ok(ResolvedCredentials {
                    record,
                    source: CredentialSource::Store(tier),
                })
            }
            None => Err(CliError::NoCredentials { details: None }),
        }
    }
}

/// Build a record from environment credentials, if any are set.
///
/// `YT_TOKEN` (falling back to `YOUTRACK_TOKEN`) wins over the
/// `YT_USERNAME`/`YT_PASSWORD` pair. The base URL comes from configuration
/// since environment credentials never touch the store.
fn env_credentials(settings: &Settings) -> Result<Option<CredentialRecord>> {
    let token = read_env("YT_TOKEN").or_else(|| read_env("YOUTRACK_TOKEN"));
    let username = read_env("YT_USERNAME");
    let password = read_env("YT_PASSWORD");

    let has_pair = username.is_some() && password.is_some();
    if token.is_none() && !has_pair {
        return Ok(None);
    }

    let Some(base_url) = settings.base_url.clone() else {
        return Err(CliError::InvalidInput(
            "environment credentials require a configured base URL; set YOUTRACK_BASE_URL or base_url in config.toml".to_string(),
        ));
    };

    let record = match (token, username, password) {
        (Some(token), _, _) => CredentialRecord::with_token(base_url, token),
        (None, Some(user), Some(pass)) => CredentialRecord::with_password(base_url, user, pass),
        _ => return Ok(None),
    };
    record.validate()?;
    Ok(Some(record))
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
