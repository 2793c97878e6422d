//! CLI surface and command dispatch.
//!
//! The command handlers are thin: they wire the credential store, the
//! request executor, and the audit log together and print results. Every
//! dispatched command leaves one audit entry with its redacted arguments,
//! outcome, and duration.

mod audit;
mod auth;

use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::audit::{AuditEntry, AuditLog};
use crate::config::Settings;
use crate::credentials::CredentialStore;
use crate::error::Result;

pub use audit::AuditCommand;
pub use auth::AuthCommand;

/// A resilient command-line client for YouTrack.
#[derive(Debug, Parser)]
#[command(name = "yt", version, about)]
pub struct Cli {
    /// Render errors as bare `CODE: message` lines for scripting.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Do not persist audit entries for this invocation.
    #[arg(long, global = true)]
    pub secure: bool,

    /// Disable TLS certificate verification.
    #[arg(long = "no-verify-ssl", global = true)]
    pub no_verify_ssl: bool,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Overall budget in seconds for the command, retries included.
    #[arg(long, global = true, value_name = "SECONDS")]
    pub deadline: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage stored credentials.
    #[command(subcommand)]
    Auth(AuthCommand),

    /// Inspect and manage the audit trail.
    #[command(subcommand)]
    Audit(AuditCommand),
}

impl Command {
    /// The name recorded in the audit trail, e.g. `auth login`.
    fn name(&self) -> String {
        match self {
            Command::Auth(cmd) => format!("auth {}", cmd.name()),
            Command::Audit(cmd) => format!("audit {}", cmd.name()),
        }
    }

    /// The arguments recorded in the audit trail, as `key=value` pairs so
    /// the redactor recognizes secret-bearing values.
    fn arguments(&self) -> String {
        match self {
            Command::Auth(cmd) => cmd.arguments(),
            Command::Audit(cmd) => cmd.arguments(),
        }
    }
}

/// Shared state handed to every command handler.
pub struct CommandContext {
    pub settings: Settings,
    pub store: CredentialStore,
    pub audit: Arc<AuditLog>,
}

/// Run a command and record its outcome in the audit trail.
pub async fn dispatch(command: Command, ctx: &CommandContext) -> Result<()> {
    let name = command.name();
    let arguments = command.arguments();
    let started = Instant::now();

    let result = execute(command, ctx).await;

    let entry = match &result {
        Ok(()) => AuditEntry::success(&name).with_detail(arguments),
        Err(error) => {
            let detail = if arguments.is_empty() {
                error.to_string()
            } else {
                format!("{}; {}", arguments, error)
            };
            AuditEntry::failure(&name, error).with_detail(detail)
        }
    };
    ctx.audit.record(entry.with_duration(started.elapsed()));

    result
}

async fn execute(command: Command, ctx: &CommandContext) -> Result<()> {
    match command {
        Command::Auth(cmd) => auth::run(cmd, ctx).await,
        Command::Audit(cmd) => audit::run(cmd, ctx).await,
    }
}
