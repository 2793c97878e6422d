//! Standardized error taxonomy for the CLI.
//!
//! Every failure surfaced to the user carries a stable machine-readable code
//! from a closed set, a human-readable message, and a severity. Raw transport
//! or filesystem errors never reach the user unwrapped; they are classified
//! into this taxonomy at the layer that observes them.

use thiserror::Error;

use crate::redact::redact;

/// Severity of a standardized error.
///
/// Warnings are rendered but never terminate the process on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Error category, one per code prefix.
///
/// Each category maps to a distinct process exit code so scripts can branch
/// on the class of failure without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Auth,
    Net,
    Val,
    Perm,
    Cfg,
    Res,
    Sys,
    Gen,
}

impl Category {
    /// Process exit code for errors in this category.
    pub fn exit_code(&self) -> i32 {
        match self {
            Category::Gen => 1,
            Category::Auth => 2,
            Category::Net => 3,
            Category::Val => 4,
            Category::Perm => 5,
            Category::Cfg => 6,
            Category::Res => 7,
            Category::Sys => 8,
        }
    }
}

/// The standardized CLI error.
///
/// Variants correspond one-to-one with stable error codes. The set is closed:
/// new failure modes must be added here, not signalled ad hoc.
#[derive(Debug, Error)]
pub enum CliError {
    /// The server rejected the presented credentials (HTTP 401).
    #[error("Authentication failed: the server rejected the credentials")]
    CredentialsRejected,

    /// Every writable credential backend refused the record.
    #[error("Failed to store credentials in any backend")]
    CredentialStoreFailed { details: String },

    /// Token expiry notice. Message is built by the expiry helpers.
    #[error("{0}")]
    TokenExpiry(String),

    /// No credential backend produced a usable record.
    #[error("No authentication credentials found")]
    NoCredentials { details: Option<String> },

    /// The server denied access to the resource (HTTP 403).
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The requested resource does not exist (HTTP 404).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The resource was modified concurrently (HTTP 409).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// User-supplied input failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The connection could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The server did not respond within the request timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// TLS negotiation or certificate validation failed.
    #[error("TLS error: {0}")]
    TlsFailure(String),

    /// The server hostname could not be resolved.
    #[error("DNS resolution failed: {0}")]
    DnsFailure(String),

    /// The server asked us to slow down (HTTP 429).
    #[error("Rate limited by the server")]
    RateLimited,

    /// The server reported an internal failure (HTTP 5xx).
    #[error("Server error: {0}")]
    ServerError(String),

    /// TLS certificate verification has been disabled for this run.
    #[error("TLS certificate verification is disabled")]
    InsecureTransport,

    /// The configuration could not be read or parsed.
    #[error("Failed to read configuration: {0}")]
    ConfigRead(String),

    /// The configuration could not be written.
    #[error("Failed to write configuration: {0}")]
    ConfigWrite(String),

    /// An internal invariant broke. Not actionable by the user.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A filesystem operation failed.
    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    /// The audit log storage is unusable; entries stay in memory only.
    #[error("Audit log storage is unavailable: {0}")]
    AuditUnavailable(String),

    /// A failure outside the known classification.
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// The operation was cancelled before completion.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

impl CliError {
    /// The stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            CliError::CredentialsRejected => "AUTH_001",
            CliError::CredentialStoreFailed { .. } => "AUTH_002",
            CliError::TokenExpiry(_) => "AUTH_003",
            CliError::NoCredentials { .. } => "AUTH_004",
            CliError::ConnectionFailed(_) => "NET_001",
            CliError::Timeout(_) => "NET_002",
            CliError::TlsFailure(_) => "NET_003",
            CliError::DnsFailure(_) => "NET_004",
            CliError::RateLimited => "NET_005",
            CliError::ServerError(_) => "NET_006",
            CliError::InsecureTransport => "NET_007",
            CliError::InvalidInput(_) => "VAL_001",
            CliError::AccessDenied(_) => "PERM_001",
            CliError::ConfigRead(_) => "CFG_001",
            CliError::ConfigWrite(_) => "CFG_002",
            CliError::NotFound(_) => "RES_001",
            CliError::Conflict(_) => "RES_002",
            CliError::Internal(_) => "SYS_001",
            CliError::Io(_) => "SYS_002",
            CliError::AuditUnavailable(_) => "SYS_003",
            CliError::Unexpected(_) => "GEN_001",
            CliError::Cancelled(_) => "GEN_002",
        }
    }

    /// The category this error belongs to (the code prefix).
    pub fn category(&self) -> Category {
        match self {
            CliError::CredentialsRejected
            | CliError::CredentialStoreFailed { .. }
            | CliError::TokenExpiry(_)
            | CliError::NoCredentials { .. } => Category::Auth,
            CliError::ConnectionFailed(_)
            | CliError::Timeout(_)
            | CliError::TlsFailure(_)
            | CliError::DnsFailure(_)
            | CliError::RateLimited
            | CliError::ServerError(_)
            | CliError::InsecureTransport => Category::Net,
            CliError::InvalidInput(_) => Category::Val,
            CliError::AccessDenied(_) => Category::Perm,
            CliError::ConfigRead(_) | CliError::ConfigWrite(_) => Category::Cfg,
            CliError::NotFound(_) | CliError::Conflict(_) => Category::Res,
            CliError::Internal(_) | CliError::Io(_) | CliError::AuditUnavailable(_) => {
                Category::Sys
            }
            CliError::Unexpected(_) | CliError::Cancelled(_) => Category::Gen,
        }
    }

    /// The severity of this error.
    pub fn severity(&self) -> Severity {
        match self {
            CliError::TokenExpiry(_)
            | CliError::InsecureTransport
            | CliError::AuditUnavailable(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }

    /// Whether the request executor may retry after this error.
    ///
    /// Only transient network conditions are retryable. `Unexpected` is
    /// handled separately by the executor (retried at most once).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CliError::ConnectionFailed(_)
                | CliError::Timeout(_)
                | CliError::TlsFailure(_)
                | CliError::DnsFailure(_)
                | CliError::RateLimited
                | CliError::ServerError(_)
        )
    }

    /// Additional pre-redacted detail lines, shown in verbose rendering only.
    pub fn details(&self) -> Option<&str> {
        match self {
            CliError::CredentialStoreFailed { details } => Some(details),
            CliError::NoCredentials { details } => details.as_deref(),
            _ => None,
        }
    }

    /// Short follow-up the user can act on, shown in verbose rendering.
    pub fn suggested_action(&self) -> Option<&'static str> {
        match self {
            CliError::NoCredentials { .. } => {
                Some("Run 'yt auth login' to store credentials.")
            }
            CliError::CredentialsRejected => {
                Some("Verify the token with 'yt auth status --check' or store a new one with 'yt auth login'.")
            }
            CliError::RateLimited => Some("Wait a few seconds and try again."),
            CliError::ConnectionFailed(_) | CliError::DnsFailure(_) => {
                Some("Check the base URL and your network connection.")
            }
            _ => None,
        }
    }

    /// Render the error for the terminal.
    ///
    /// Quiet mode produces exactly `CODE: message` so scripts can split on
    /// the first colon. Verbose mode adds a severity symbol, detail lines,
    /// and a suggested action when one exists.
    pub fn render(&self, quiet: bool) -> String {
        if quiet {
            return format!("{}: {}", self.code(), self);
        }

        let symbol = match self.severity() {
            Severity::Warning => "⚠",
            Severity::Error => "✗",
        };

        let mut out = format!("{} {}: {}", symbol, self.code(), self);
        if let Some(details) = self.details() {
            out.push_str("\n  ");
            out.push_str(details);
        }
        if let Some(action) = self.suggested_action() {
            out.push_str("\n  ");
            out.push_str(action);
        }
        out
    }

    /// Classify an HTTP status into the taxonomy.
    ///
    /// `context` is included in the message for statuses that carry one; it
    /// must already be safe to display.
    pub fn from_status(status: reqwest::StatusCode, context: &str) -> Self {
        match status.as_u16() {
            401 => CliError::CredentialsRejected,
            403 => CliError::AccessDenied(context.to_string()),
            404 => CliError::NotFound(context.to_string()),
            409 => CliError::Conflict(context.to_string()),
            429 => CliError::RateLimited,
            500..=599 => CliError::ServerError(format!("HTTP {}: {}", status.as_u16(), context)),
            _ => CliError::Unexpected(format!("HTTP {}: {}", status.as_u16(), context)),
        }
    }

    /// Classify a transport-level failure into the taxonomy.
    ///
    /// The carried message is redacted before it is stored, so it is safe to
    /// render or persist as-is.
    pub fn from_transport(error: &reqwest::Error) -> Self {
        let text = redact(&error_chain_text(error));

        if error.is_timeout() {
            return CliError::Timeout(text);
        }

        let lowered = text.to_lowercase();
        if lowered.contains("certificate") || lowered.contains("tls") || lowered.contains("ssl") {
            return CliError::TlsFailure(text);
        }
        if lowered.contains("dns") || lowered.contains("resolve") || lowered.contains("lookup") {
            return CliError::DnsFailure(text);
        }

        if error.is_connect() {
            return CliError::ConnectionFailed(text);
        }
        if error.is_decode() {
            return CliError::Unexpected(format!("invalid response body: {}", text));
        }
        if error.is_builder() {
            return CliError::Internal(format!("request construction failed: {}", text));
        }

        CliError::ConnectionFailed(text)
    }

    /// AUTH_003 notice for a token past its expiry timestamp.
    pub fn token_expired() -> Self {
        CliError::TokenExpiry("API token has expired".to_string())
    }

    /// AUTH_003 notice for a token inside the warning window.
    pub fn token_expiring(days_left: i64) -> Self {
        CliError::TokenExpiry(format!("API token expires in {} day(s)", days_left))
    }
}

/// Join the display text of a transport error and its source chain.
///
/// reqwest hides the interesting cause (TLS, DNS) several levels down, so a
/// single `to_string` is rarely enough to classify.
fn error_chain_text(error: &reqwest::Error) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}
