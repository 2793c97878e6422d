//! ytrack - a resilient command-line client for YouTrack.
//!
//! Commands resolve credentials from a tiered store, execute requests
//! through a retrying HTTP client, and leave a redacted audit trail. Every
//! failure is rendered as a standardized `CODE: message` error before the
//! process exits with that error's category code.

mod api;
mod audit;
mod commands;
mod config;
mod credentials;
mod error;
mod logging;
mod redact;

use std::sync::Arc;

use clap::Parser;

use audit::AuditLog;
use commands::{Cli, CommandContext};
use config::Settings;
use credentials::CredentialStore;
use error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging is best-effort; a read-only home directory must not prevent
    // the command from running.
    if let Err(e) = logging::init() {
        if !cli.quiet {
            eprintln!("Warning: failed to initialize logging: {}", e);
        }
    }

    let exit_code = run(cli).await;
    logging::shutdown();
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> i32 {
    let quiet = cli.quiet;

    let mut settings = match Settings::load() {
        Ok(settings) => settings,
        Err(error) => return fail(&error, quiet),
    };
    settings.apply_cli(
        cli.quiet,
        cli.secure,
        cli.no_verify_ssl,
        cli.timeout,
        cli.deadline,
    );

    let store = match CredentialStore::new() {
        Ok(store) => store,
        Err(error) => return fail(&error, quiet),
    };
    let audit = Arc::new(AuditLog::open(&settings));

    let ctx = CommandContext {
        settings,
        store,
        audit: Arc::clone(&audit),
    };
    let result = commands::dispatch(cli.command, &ctx).await;

    // Surface the SYS_003 degradation once, after the command has finished.
    if let Some(warning) = audit.take_warning() {
        eprintln!("{}", warning.render(quiet));
    }

    match result {
        Ok(()) => 0,
        Err(error) => fail(&error, quiet),
    }
}

/// Render a standardized error to stderr and return its exit code.
fn fail(error: &CliError, quiet: bool) -> i32 {
    eprintln!("{}", error.render(quiet));
    error.exit_code()
}
