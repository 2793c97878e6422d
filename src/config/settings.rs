//! Application settings configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CliError, Result};

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default maximum number of retries for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default audit log capacity.
pub const DEFAULT_AUDIT_MAX_ENTRIES: usize = 1000;

/// Default token expiry warning window in days.
pub const DEFAULT_TOKEN_WARNING_DAYS: i64 = 7;

/// Application-wide settings.
///
/// Serialized fields come from the config file; `quiet` and `secure` are
/// per-invocation CLI state and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the YouTrack instance.
    pub base_url: Option<String>,
    /// Whether TLS certificates are verified.
    pub verify_ssl: bool,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum retries for transient request failures.
    pub max_retries: u32,
    /// Wall-clock budget in seconds for a whole command's requests, retries
    /// and backoff sleeps included. Unset means no budget.
    pub deadline_secs: Option<u64>,
    /// Whether audit entries are persisted to disk.
    pub audit_logging: bool,
    /// Maximum number of retained audit entries.
    pub audit_max_entries: usize,
    /// Days before token expiry at which warnings start.
    pub token_warning_days: i64,
    /// Render errors as bare `CODE: message` lines.
    #[serde(skip)]
    pub quiet: bool,
    /// Skip audit persistence for this invocation.
    #[serde(skip)]
    pub secure: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: None,
            verify_ssl: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            deadline_secs: None,
            audit_logging: true,
            audit_max_entries: DEFAULT_AUDIT_MAX_ENTRIES,
            token_warning_days: DEFAULT_TOKEN_WARNING_DAYS,
            quiet: false,
            secure: false,
        }
    }
}

impl Settings {
    /// Load settings from the default config file and apply env overrides.
    pub fn load() -> Result<Self> {
        let path = super::config_file()?;
        let mut settings = Self::load_from(&path)?;
        settings.apply_env();
        Ok(settings)
    }

    /// Load settings from a specific file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| CliError::ConfigRead(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| CliError::ConfigRead(format!("{}: {}", path.display(), e)))
    }

    /// Write settings to the default config file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&super::config_file()?)
    }

    /// Write settings to a specific file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CliError::ConfigWrite(format!("{}: {}", parent.display(), e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CliError::ConfigWrite(e.to_string()))?;
        fs::write(path, content)
            .map_err(|e| CliError::ConfigWrite(format!("{}: {}", path.display(), e)))
    }

    /// Apply environment variable overrides.
    ///
    /// Invalid values are ignored with a log line rather than failing the
    /// invocation.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("YOUTRACK_BASE_URL") {
            if !url.trim().is_empty() {
                self.base_url = Some(url.trim().to_string());
            }
        }
        if let Some(value) = env_flag("YOUTRACK_VERIFY_SSL") {
            self.verify_ssl = value;
        }
        if let Some(value) = env_flag("YT_AUDIT_LOGGING") {
            self.audit_logging = value;
        }
        if let Ok(raw) = std::env::var("YT_AUDIT_MAX_ENTRIES") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.audit_max_entries = n,
                _ => warn!("ignoring invalid YT_AUDIT_MAX_ENTRIES value: {}", raw),
            }
        }
        if let Ok(raw) = std::env::var("YT_TOKEN_WARNING_DAYS") {
            match raw.trim().parse::<i64>() {
                Ok(n) if n >= 0 => self.token_warning_days = n,
                _ => warn!("ignoring invalid YT_TOKEN_WARNING_DAYS value: {}", raw),
            }
        }
    }

    /// Apply per-invocation CLI flags. Flags take precedence over everything.
    pub fn apply_cli(
        &mut self,
        quiet: bool,
        secure: bool,
        no_verify_ssl: bool,
        timeout: Option<u64>,
        deadline: Option<u64>,
    ) {
        self.quiet = quiet;
        self.secure = secure;
        if no_verify_ssl {
            self.verify_ssl = false;
        }
        if let Some(secs) = timeout {
            if secs > 0 {
                self.timeout_secs = secs;
            }
        }
        if let Some(secs) = deadline {
            if secs > 0 {
                self.deadline_secs = Some(secs);
            }
        }
    }
}

/// Parse a boolean environment variable. Unset or unrecognized values
/// return `None` so the existing setting is kept.
fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!("ignoring invalid boolean {}={}", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.base_url.is_none());
        assert!(settings.verify_ssl);
        assert_eq!(settings.timeout_secs, 30);
        assert_eq!(settings.max_retries, 3);
        assert!(settings.deadline_secs.is_none());
        assert!(settings.audit_logging);
        assert_eq!(settings.audit_max_entries, 1000);
        assert_eq!(settings.token_warning_days, 7);
        assert!(!settings.quiet);
        assert!(!settings.secure);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.base_url = Some("https://yt.example.com".to_string());
        settings.timeout_secs = 10;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.base_url.as_deref(), Some("https://yt.example.com"));
        assert_eq!(loaded.timeout_secs, 10);
        assert_eq!(loaded.max_retries, 3);
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("missing.toml")).unwrap();
        assert!(settings.verify_ssl);
        assert_eq!(settings.timeout_secs, 30);
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "base_url = \"https://yt.example.com\"\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.base_url.as_deref(), Some("https://yt.example.com"));
        assert_eq!(settings.audit_max_entries, 1000);
    }

    #[test]
    fn test_load_invalid_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "verify_ssl = \"maybe").unwrap();

        let err = Settings::load_from(&path).unwrap_err();
        assert_eq!(err.code(), "CFG_001");
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("YOUTRACK_BASE_URL", "https://env.example.com");
        std::env::set_var("YOUTRACK_VERIFY_SSL", "false");
        std::env::set_var("YT_AUDIT_MAX_ENTRIES", "50");
        std::env::set_var("YT_TOKEN_WARNING_DAYS", "14");

        let mut settings = Settings::default();
        settings.apply_env();

        std::env::remove_var("YOUTRACK_BASE_URL");
        std::env::remove_var("YOUTRACK_VERIFY_SSL");
        std::env::remove_var("YT_AUDIT_MAX_ENTRIES");
        std::env::remove_var("YT_TOKEN_WARNING_DAYS");

        assert_eq!(settings.base_url.as_deref(), Some("https://env.example.com"));
        assert!(!settings.verify_ssl);
        assert_eq!(settings.audit_max_entries, 50);
        assert_eq!(settings.token_warning_days, 14);
    }

    #[test]
    #[serial]
    fn test_env_invalid_values_keep_defaults() {
        std::env::set_var("YT_AUDIT_MAX_ENTRIES", "zero");
        std::env::set_var("YOUTRACK_VERIFY_SSL", "maybe");

        let mut settings = Settings::default();
        settings.apply_env();

        std::env::remove_var("YT_AUDIT_MAX_ENTRIES");
        std::env::remove_var("YOUTRACK_VERIFY_SSL");

        assert_eq!(settings.audit_max_entries, 1000);
        assert!(settings.verify_ssl);
    }

    #[test]
    fn test_cli_flags_take_precedence() {
        let mut settings = Settings::default();
        settings.apply_cli(true, true, true, Some(5), Some(20));

        assert!(settings.quiet);
        assert!(settings.secure);
        assert!(!settings.verify_ssl);
        assert_eq!(settings.timeout_secs, 5);
        assert_eq!(settings.deadline_secs, Some(20));
    }

    #[test]
    fn test_cli_zero_values_ignored() {
        let mut settings = Settings::default();
        settings.apply_cli(false, false, false, Some(0), Some(0));
        assert_eq!(settings.timeout_secs, 30);
        assert!(settings.deadline_secs.is_none());
    }
}
