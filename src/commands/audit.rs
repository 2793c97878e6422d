//! Audit trail commands.

use std::fs;
use std::path::PathBuf;

use clap::Subcommand;

use super::CommandContext;
use crate::audit::AuditEntry;
use crate::error::{CliError, Result};

/// Default number of entries shown by `yt audit list`.
const DEFAULT_LIST_LIMIT: usize = 20;

#[derive(Debug, Subcommand)]
pub enum AuditCommand {
    /// Show recent audit entries, newest first.
    List {
        /// Maximum number of entries to show.
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// Export the full audit buffer as JSON.
    Export {
        /// Write to a file instead of stdout.
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Erase the audit trail. Irreversible.
    Clear {
        /// Confirm the erase.
        #[arg(long)]
        yes: bool,
    },
}

impl AuditCommand {
    pub(super) fn name(&self) -> &'static str {
        match self {
            Self::List { .. } => "list",
            Self::Export { .. } => "export",
            Self::Clear { .. } => "clear",
        }
    }

    pub(super) fn arguments(&self) -> String {
        match self {
            Self::List { limit } => format!("limit={}", limit),
            Self::Export { output } => match output {
                Some(path) => format!("output={}", path.display()),
                None => String::new(),
            },
            Self::Clear { .. } => String::new(),
        }
    }
}

pub async fn run(command: AuditCommand, ctx: &CommandContext) -> Result<()> {
    match command {
        AuditCommand::List { limit } => list(ctx, limit),
        AuditCommand::Export { output } => export(ctx, output),
        AuditCommand::Clear { yes } => clear(ctx, yes),
    }
}

fn list(ctx: &CommandContext, limit: usize) -> Result<()> {
    let entries = ctx.audit.list(limit);
    if entries.is_empty() {
        println!("Audit log is empty");
        return Ok(());
    }
    for entry in entries {
        println!("{}", format_entry(&entry));
    }
    Ok(())
}

fn export(ctx: &CommandContext, output: Option<PathBuf>) -> Result<()> {
    let json = ctx.audit.export_json()?;
    match output {
        Some(path) => {
            fs::write(&path, &json)?;
            println!(
                "Exported {} audit entries to {}",
                ctx.audit.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn clear(ctx: &CommandContext, yes: bool) -> Result<()> {
    if !yes {
        return Err(CliError::InvalidInput(
            "clearing the audit log is irreversible; pass --yes to confirm".to_string(),
        ));
    }
    ctx.audit.clear()?;
    println!("Audit log cleared");
    Ok(())
}

fn format_entry(entry: &AuditEntry) -> String {
    let mut line = format!(
        "{}  {:<14} {:<8}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.command,
        entry.outcome.to_string()
    );
    if let Some(code) = &entry.error_code {
        line.push_str(&format!(" {}", code));
    }
    if let Some(ms) = entry.duration_ms {
        line.push_str(&format!(" ({} ms)", ms));
    }
    if let Some(detail) = &entry.detail {
        line.push_str(&format!("  {}", detail));
    }
    line
}
