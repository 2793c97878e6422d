//! Credential management commands.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Subcommand;

use super::CommandContext;
use crate::api::YouTrackClient;
use crate::credentials::{
    CredentialRecord, CredentialSource, ResolvedCredentials, StorageTier, TokenStatus,
};
use crate::error::{CliError, Result};

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Store credentials and verify them against the server.
    Login {
        /// Base URL of the YouTrack instance.
        #[arg(long)]
        base_url: String,

        /// Permanent or bearer token.
        #[arg(long, conflicts_with_all = ["username", "password"])]
        token: Option<String>,

        /// Username, paired with --password.
        #[arg(long, requires = "password")]
        username: Option<String>,

        /// Password, paired with --username.
        #[arg(long, requires = "username")]
        password: Option<String>,

        /// Token expiry timestamp (RFC 3339), used for expiry warnings.
        #[arg(long, value_name = "TIMESTAMP")]
        expires: Option<String>,

        /// Store without probing the server.
        #[arg(long)]
        no_verify: bool,
    },

    /// Show where credentials come from and whether the token is expiring.
    Status {
        /// Also probe the server with the stored credentials.
        #[arg(long)]
        check: bool,
    },

    /// Remove credentials from every storage tier.
    Logout,
}

impl AuthCommand {
    pub(super) fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Status { .. } => "status",
            Self::Logout => "logout",
        }
    }

    pub(super) fn arguments(&self) -> String {
        match self {
            Self::Login {
                base_url,
                token,
                username,
                no_verify,
                ..
            } => {
                let mut parts = vec![format!("base_url={}", base_url)];
                if let Some(token) = token {
                    parts.push(format!("token={}", token));
                }
                if let Some(username) = username {
                    parts.push(format!("username={}", username));
                    parts.push("password=<provided>".to_string());
                }
                if *no_verify {
                    parts.push("no_verify=true".to_string());
                }
                parts.join(" ")
            }
            Self::Status { check } => {
                if *check {
                    "check=true".to_string()
                } else {
                    String::new()
                }
            }
            Self::Logout => String::new(),
        }
    }
}

pub async fn run(command: AuthCommand, ctx: &CommandContext) -> Result<()> {
    match command {
        AuthCommand::Login {
            base_url,
            token,
            username,
            password,
            expires,
            no_verify,
        } => login(ctx, base_url, token, username, password, expires, no_verify).await,
        AuthCommand::Status { check } => status(ctx, check).await,
        AuthCommand::Logout => logout(ctx),
    }
}

async fn login(
    ctx: &CommandContext,
    base_url: String,
    token: Option<String>,
    username: Option<String>,
    password: Option<String>,
    expires: Option<String>,
    no_verify: bool,
) -> Result<()> {
    let record = CredentialRecord {
        base_url,
        token,
        username,
        password,
        expires_at: expires.as_deref().map(parse_expiry).transpose()?,
        storage_tier: None,
    };
    record.validate()?;

    let tier = ctx.store.store(&record)?;
    println!("Credentials stored ({})", tier);
    if tier == StorageTier::PlaintextFile {
        eprintln!(
            "Warning: no secure storage tier was available; the token was written to a plaintext file."
        );
    }

    if !no_verify {
        let resolved = ResolvedCredentials {
            record,
            source: CredentialSource::Store(tier),
        };
        let client = YouTrackClient::new(&resolved, &ctx.settings, Arc::clone(&ctx.audit))?;
        let user = client.validate_connection().await?;
        println!("Logged in as {}", user.display_name());
    }

    Ok(())
}

async fn status(ctx: &CommandContext, check: bool) -> Result<()> {
    let resolved = ctx.store.resolve(&ctx.settings)?;

    println!("Base URL: {}", resolved.record.base_url);
    println!("Credential source: {}", resolved.source);
    if resolved.source == CredentialSource::Store(StorageTier::PlaintextFile) {
        eprintln!("Warning: credentials are stored in a plaintext file; run 'yt auth login' to re-store them securely.");
    }

    match resolved.record.token_status(ctx.settings.token_warning_days) {
        TokenStatus::Valid => println!("Token: valid"),
        TokenStatus::Unknown => println!("Token: no expiry recorded"),
        TokenStatus::Expiring(days_left) => {
            println!("Token: expiring");
            eprintln!(
                "{}",
                CliError::token_expiring(days_left).render(ctx.settings.quiet)
            );
        }
        TokenStatus::Expired => {
            println!("Token: expired");
            eprintln!("{}", CliError::token_expired().render(ctx.settings.quiet));
        }
    }

    if check {
        let client = YouTrackClient::new(&resolved, &ctx.settings, Arc::clone(&ctx.audit))?;
        let user = client.validate_connection().await?;
        println!("Connected as {}", user.display_name());
    }

    Ok(())
}

fn logout(ctx: &CommandContext) -> Result<()> {
    ctx.store.clear()?;
    println!("Credentials removed from all storage tiers");
    Ok(())
}

fn parse_expiry(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| CliError::InvalidInput(format!("invalid --expires timestamp: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::config::Settings;
    use crate::credentials::{CredentialBackend, CredentialStore, PlaintextFileBackend};
    use serial_test::serial;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context_with(store: CredentialStore) -> CommandContext {
        CommandContext {
            settings: Settings::default(),
            store,
            audit: Arc::new(AuditLog::in_memory(100)),
        }
    }

    fn clear_credential_env() {
        for name in ["YT_TOKEN", "YOUTRACK_TOKEN", "YT_USERNAME", "YT_PASSWORD"] {
            std::env::remove_var(name);
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_status_without_credentials_quiet_rendering() {
        clear_credential_env();

        let dir = tempdir().unwrap();
        let ctx = context_with(CredentialStore::with_backends(vec![Box::new(
            PlaintextFileBackend::new(dir.path()),
        )]));

        let err = run(AuthCommand::Status { check: false }, &ctx)
            .await
            .unwrap_err();
        assert_eq!(
            err.render(true),
            "AUTH_004: No authentication credentials found"
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_login_stores_and_verifies() {
        clear_credential_env();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "1-1",
                "login": "alice",
                "fullName": "Alice Doe"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let ctx = context_with(CredentialStore::with_backends(vec![Box::new(
            PlaintextFileBackend::new(dir.path()),
        )]));

        run(
            AuthCommand::Login {
                base_url: server.uri(),
                token: Some("perm:test.token".to_string()),
                username: None,
                password: None,
                expires: None,
                no_verify: false,
            },
            &ctx,
        )
        .await
        .unwrap();

        let stored = ctx.store.load().unwrap().unwrap();
        assert_eq!(stored.token.as_deref(), Some("perm:test.token"));

        // The verification probe went through the executor's audit path.
        let entries = ctx.audit.list(10);
        assert!(entries.iter().any(|entry| entry.command == "http"));
    }

    #[tokio::test]
    async fn test_login_rejects_invalid_expiry() {
        let ctx = context_with(CredentialStore::with_backends(vec![]));
        let err = run(
            AuthCommand::Login {
                base_url: "https://yt.example.com".to_string(),
                token: Some("perm:x.y.z".to_string()),
                username: None,
                password: None,
                expires: Some("next tuesday".to_string()),
                no_verify: true,
            },
            &ctx,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "VAL_001");
    }

    #[tokio::test]
    async fn test_login_rejects_non_http_url() {
        let ctx = context_with(CredentialStore::with_backends(vec![]));
        let err = run(
            AuthCommand::Login {
                base_url: "ftp://yt.example.com".to_string(),
                token: Some("perm:x.y.z".to_string()),
                username: None,
                password: None,
                expires: None,
                no_verify: true,
            },
            &ctx,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "VAL_001");
    }

    #[tokio::test]
    #[serial]
    async fn test_logout_clears_store() {
        clear_credential_env();

        let dir = tempdir().unwrap();
        let backend = PlaintextFileBackend::new(dir.path());
        backend
            .store(&CredentialRecord::with_token(
                "https://yt.example.com",
                "perm:x.y.z",
            ))
            .unwrap();

        let ctx = context_with(CredentialStore::with_backends(vec![Box::new(backend)]));
        run(AuthCommand::Logout, &ctx).await.unwrap();
        assert!(ctx.store.load().unwrap().is_none());
    }
}
