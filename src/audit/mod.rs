//! Command and request audit trail.
//!
//! Entries are kept in a bounded in-memory ring and appended to a JSONL file
//! in the data directory. Recording never fails: if the file becomes
//! unusable the log degrades to memory only and surfaces a single SYS_003
//! warning for the current invocation.

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{CliError, Result};
use crate::redact::redact;

/// Audit file name inside the data directory.
const AUDIT_FILE: &str = "audit.jsonl";

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    Retry,
    Warning,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Retry => "retry",
            Self::Warning => "warning",
        };
        write!(f, "{}", name)
    }
}

/// One audited action: a CLI command or a single HTTP attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub outcome: AuditOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl AuditEntry {
    pub fn new(command: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            command: command.into(),
            outcome,
            error_code: None,
            detail: None,
            duration_ms: None,
        }
    }

    pub fn success(command: impl Into<String>) -> Self {
        Self::new(command, AuditOutcome::Success)
    }

    pub fn failure(command: impl Into<String>, error: &CliError) -> Self {
        let mut entry = Self::new(command, AuditOutcome::Failure);
        entry.error_code = Some(error.code().to_string());
        entry.detail = Some(error.to_string());
        entry
    }

    pub fn retry(command: impl Into<String>, error: &CliError) -> Self {
        let mut entry = Self::new(command, AuditOutcome::Retry);
        entry.error_code = Some(error.code().to_string());
        entry.detail = Some(error.to_string());
        entry
    }

    /// A non-fatal notice, e.g. TLS verification being disabled.
    pub fn warning(command: impl Into<String>, error: &CliError) -> Self {
        let mut entry = Self::new(command, AuditOutcome::Warning);
        entry.error_code = Some(error.code().to_string());
        entry.detail = Some(error.to_string());
        entry
    }

    /// Replace the detail line.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = Some(elapsed.as_millis() as u64);
        self
    }

    /// Run every free-text field through the redactor.
    fn redacted(mut self) -> Self {
        self.command = redact(&self.command);
        if let Some(detail) = &self.detail {
            self.detail = Some(redact(detail));
        }
        self
    }
}

/// Bounded, thread-safe audit log.
pub struct AuditLog {
    path: Option<PathBuf>,
    entries: Mutex<VecDeque<AuditEntry>>,
    max_entries: usize,
    enabled: bool,
    degraded: AtomicBool,
    warning: Mutex<Option<CliError>>,
}

impl AuditLog {
    /// Open the audit log described by the settings.
    ///
    /// Never fails: an unusable data directory or audit file degrades the
    /// log to memory only instead.
    pub fn open(settings: &Settings) -> Self {
        if !settings.audit_logging {
            return Self::disabled();
        }
        // --secure keeps entries for this invocation but writes nothing.
        if settings.secure {
            return Self::in_memory(settings.audit_max_entries);
        }
        match crate::config::data_dir() {
            Ok(dir) => Self::at_path(dir.join(AUDIT_FILE), settings.audit_max_entries),
            Err(e) => {
                let log = Self::in_memory(settings.audit_max_entries);
                log.degrade(CliError::AuditUnavailable(e.to_string()));
                log
            }
        }
    }

    /// A log backed by an explicit file, loading any existing entries.
    pub fn at_path(path: PathBuf, max_entries: usize) -> Self {
        let log = Self {
            path: Some(path.clone()),
            entries: Mutex::new(VecDeque::new()),
            max_entries,
            enabled: true,
            degraded: AtomicBool::new(false),
            warning: Mutex::new(None),
        };
        log.load_existing(&path);
        log
    }

    /// A log with no backing file.
    pub fn in_memory(max_entries: usize) -> Self {
        Self {
            path: None,
            entries: Mutex::new(VecDeque::new()),
            max_entries,
            enabled: true,
            degraded: AtomicBool::new(false),
            warning: Mutex::new(None),
        }
    }

    /// A log that drops everything. Used when audit logging is turned off.
    pub fn disabled() -> Self {
        Self {
            path: None,
            entries: Mutex::new(VecDeque::new()),
            max_entries: 0,
            enabled: false,
            degraded: AtomicBool::new(false),
            warning: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record an entry. Infallible: storage trouble degrades the log instead
    /// of surfacing an error to the caller.
    ///
    /// The file append happens under the same lock as the in-memory push, so
    /// concurrent recorders within one process are fully serialized.
    pub fn record(&self, entry: AuditEntry) {
        if !self.enabled {
            return;
        }
        let entry = entry.redacted();

        let mut entries = self.guard();

        if let Some(path) = &self.path {
            if !self.degraded.load(Ordering::SeqCst) {
                if let Err(e) = append_line(path, &entry) {
                    self.degrade(CliError::AuditUnavailable(e.to_string()));
                }
            }
        }

        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Most recent entries first, at most `limit` of them.
    pub fn list(&self, limit: usize) -> Vec<AuditEntry> {
        self.guard().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// All retained entries as pretty-printed JSON, oldest first.
    pub fn export_json(&self) -> Result<String> {
        let entries: Vec<AuditEntry> = self.guard().iter().cloned().collect();
        serde_json::to_string_pretty(&entries)
            .map_err(|e| CliError::Internal(format!("failed to serialize audit log: {}", e)))
    }

    /// Drop all retained entries and, when backed by a file, delete it.
    pub fn clear(&self) -> Result<()> {
        self.guard().clear();
        if let Some(path) = &self.path {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// The degradation warning, if one fired. Yields it once.
    pub fn take_warning(&self) -> Option<CliError> {
        match self.warning.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn load_existing(&self, path: &Path) {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                self.degrade(CliError::AuditUnavailable(e.to_string()));
                return;
            }
        };

        let mut loaded = VecDeque::new();
        let mut total = 0usize;
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            total += 1;
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => {
                    loaded.push_back(entry);
                    if loaded.len() > self.max_entries {
                        loaded.pop_front();
                    }
                }
                Err(e) => debug!(error = %e, "skipping unreadable audit line"),
            }
        }

        // Rewrite the file when it held more than the retention cap.
        if total > loaded.len() {
            if let Err(e) = rewrite(path, &loaded) {
                self.degrade(CliError::AuditUnavailable(e.to_string()));
            }
        }

        *self.guard() = loaded;
    }

    fn degrade(&self, warning: CliError) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            warn!(code = warning.code(), "{}", warning);
            if let Ok(mut slot) = self.warning.lock() {
                *slot = Some(warning);
            }
        }
    }

    fn guard(&self) -> MutexGuard<'_, VecDeque<AuditEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn append_line(path: &Path, entry: &AuditEntry) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let line = serde_json::to_string(entry)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}

/// Rewrite the backing file via a sibling temp file and rename, so a crash
/// mid-compaction leaves the previous file intact.
fn rewrite(path: &Path, entries: &VecDeque<AuditEntry>) -> std::io::Result<()> {
    let mut lines = String::new();
    for entry in entries {
        let line = serde_json::to_string(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        lines.push_str(&line);
        lines.push('\n');
    }

    let tmp = match (path.parent(), path.file_name().and_then(|name| name.to_str())) {
        (Some(parent), Some(name)) => parent.join(format!("{}.tmp", name)),
        _ => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid audit path {}", path.display()),
            ))
        }
    };
    fs::write(&tmp, lines)?;
    fs::rename(&tmp, path)
}
