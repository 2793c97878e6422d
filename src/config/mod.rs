//! Configuration management for ytrack.
//!
//! Settings are resolved in a fixed precedence order: built-in defaults,
//! then the TOML config file, then environment variables, then CLI flags.
//! The resolved [`Settings`] value is passed explicitly into constructors;
//! nothing reads configuration ambiently.

mod settings;

pub use settings::{Settings, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};

use std::path::PathBuf;

use crate::error::{CliError, Result};

/// Platform config directory for ytrack.
pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("ytrack"))
        .ok_or_else(|| {
            CliError::ConfigRead("could not determine the configuration directory".to_string())
        })
}

/// Path of the TOML config file.
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Platform local data directory for ytrack (credential files, audit log).
pub fn data_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|dir| dir.join("ytrack"))
        .ok_or_else(|| {
            CliError::ConfigRead("could not determine the local data directory".to_string())
        })
}
