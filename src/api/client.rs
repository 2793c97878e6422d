//! YouTrack API client with resilient request execution.
//!
//! Every request runs through one retry loop. Transient failures are retried
//! with exponential backoff and jitter, or with the server-requested
//! `Retry-After` delay. Terminal failures return immediately. Each attempt
//! is recorded in the audit log.

use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use reqwest::{header, Client, Method, Response, StatusCode};
use tracing::{debug, error, info, instrument, warn};

use super::types::CurrentUser;
use crate::audit::{AuditEntry, AuditLog};
use crate::config::{Settings, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};
use crate::credentials::ResolvedCredentials;
use crate::error::{CliError, Result};
use crate::redact::redact;

/// First backoff step in milliseconds.
const BASE_DELAY_MS: u64 = 1000;

/// Backoff ceiling in milliseconds, also applied to `Retry-After` delays.
const MAX_DELAY_MS: u64 = 30_000;

static INSECURE_WARNING: Once = Once::new();

/// Retry behavior for the request executor.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Three retries means four tries total.
    pub max_retries: u32,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    /// First step of the exponential backoff.
    pub base_delay: Duration,
    /// Upper bound for any backoff or server-requested delay.
    pub max_delay: Duration,
    /// Wall-clock budget for the whole operation, retries included.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            base_delay: Duration::from_millis(BASE_DELAY_MS),
            max_delay: Duration::from_millis(MAX_DELAY_MS),
            deadline: None,
        }
    }
}

impl RetryPolicy {
    /// Policy derived from the effective settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_retries,
            timeout: Duration::from_secs(settings.timeout_secs),
            deadline: settings.deadline_secs.map(Duration::from_secs),
            ..Self::default()
        }
    }

    /// Backoff before the retry that follows failed attempt `attempt`
    /// (1-based). Doubles from twice the base delay, capped at `max_delay`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let millis =
            (self.base_delay.as_millis() as u64).saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(millis.min(self.max_delay.as_millis() as u64))
    }
}

/// What to do after a failed attempt.
enum Disposition {
    /// Terminal failure, return immediately.
    Fatal(CliError),
    /// Transient failure, retry with backoff or the server-provided delay.
    Retry {
        error: CliError,
        retry_after: Option<Duration>,
    },
    /// Unclassified failure, retried a single time.
    RetryOnce(CliError),
}

/// The YouTrack API client.
///
/// Wraps every request in the shared retry loop and records each attempt in
/// the audit log.
pub struct YouTrackClient {
    client: Client,
    base_url: String,
    auth_header: String,
    policy: RetryPolicy,
    audit: Arc<AuditLog>,
}

impl YouTrackClient {
    /// Build a client from resolved credentials and settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials cannot produce an `Authorization`
    /// header or the HTTP client cannot be built.
    pub fn new(
        credentials: &ResolvedCredentials,
        settings: &Settings,
        audit: Arc<AuditLog>,
    ) -> Result<Self> {
        Self::with_policy(
            credentials,
            settings,
            audit,
            RetryPolicy::from_settings(settings),
        )
    }

    /// Build a client with an explicit retry policy.
    pub fn with_policy(
        credentials: &ResolvedCredentials,
        settings: &Settings,
        audit: Arc<AuditLog>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let auth_header = credentials.record.auth_header().ok_or_else(|| {
            CliError::InvalidInput("credentials are missing a token or password".to_string())
        })?;
        let client = build_http_client(settings, policy.timeout)?;
        if !settings.verify_ssl {
            warn_insecure_transport(settings.quiet, &audit);
        }
        let base_url = normalize_base_url(&credentials.record.base_url);

        Ok(Self {
            client,
            base_url,
            auth_header,
            policy,
            audit,
        })
    }

    /// Check that the base URL and credentials work, returning the user.
    #[instrument(skip(self))]
    pub async fn validate_connection(&self) -> Result<CurrentUser> {
        debug!("validating connection");
        let user = self.current_user().await?;
        info!(login = %user.login, "connection validated");
        Ok(user)
    }

    /// The authenticated user, from `GET /api/users/me`.
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<CurrentUser> {
        let url = format!("{}/api/users/me?fields=id,login,fullName", self.base_url);
        self.get(&url).await
    }

    /// Perform a GET request through the retry loop.
    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.request(Method::GET, url, None).await
    }

    /// Perform one authenticated request through the retry loop.
    #[instrument(skip(self, body), fields(method = %method, url = %url))]
    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let started = Instant::now();
        let tries = self.policy.max_retries + 1;
        let mut attempt: u32 = 0;
        let mut retried_unknown = false;

        loop {
            attempt += 1;

            if let Some(cancelled) = self.deadline_exceeded(started, Duration::ZERO) {
                self.audit.record(AuditEntry::failure("http", &cancelled));
                return Err(cancelled);
            }

            debug!("request attempt {}/{}", attempt, tries);
            let attempt_started = Instant::now();

            let disposition = match self.execute_once::<T>(&method, url, body.as_ref()).await {
                Ok(value) => {
                    let detail = if attempt == 1 {
                        format!("{} {}", method, url)
                    } else {
                        format!("{} {} (attempt {})", method, url, attempt)
                    };
                    self.audit.record(
                        AuditEntry::success("http")
                            .with_detail(detail)
                            .with_duration(attempt_started.elapsed()),
                    );
                    return Ok(value);
                }
                Err(disposition) => disposition,
            };
            let elapsed = attempt_started.elapsed();

            // An unclassified failure earns a single retry.
            let disposition = match disposition {
                Disposition::RetryOnce(error) if !retried_unknown => {
                    retried_unknown = true;
                    Disposition::Retry {
                        error,
                        retry_after: None,
                    }
                }
                other => other,
            };

            match disposition {
                Disposition::Fatal(error) | Disposition::RetryOnce(error) => {
                    error!(code = error.code(), attempt, "request failed");
                    self.audit.record(
                        AuditEntry::failure("http", &error)
                            .with_detail(format!("{} {}: {}", method, url, error))
                            .with_duration(elapsed),
                    );
                    return Err(error);
                }
                Disposition::Retry { error, retry_after } => {
                    if attempt > self.policy.max_retries {
                        error!(code = error.code(), attempt, "request failed, retries exhausted");
                        self.audit.record(
                            AuditEntry::failure("http", &error)
                                .with_detail(format!(
                                    "{} {}: {} (retries exhausted)",
                                    method, url, error
                                ))
                                .with_duration(elapsed),
                        );
                        return Err(error);
                    }

                    let delay = match retry_after {
                        Some(server_delay) => server_delay.min(self.policy.max_delay),
                        None => with_jitter(self.policy.backoff_delay(attempt)),
                    };

                    warn!(
                        code = error.code(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "request failed, retrying"
                    );
                    self.audit.record(
                        AuditEntry::retry("http", &error)
                            .with_detail(format!(
                                "{} {} attempt {}/{} failed: {}; next try in {} ms",
                                method,
                                url,
                                attempt,
                                tries,
                                error,
                                delay.as_millis()
                            ))
                            .with_duration(elapsed),
                    );

                    if let Some(cancelled) = self.deadline_exceeded(started, delay) {
                        self.audit.record(AuditEntry::failure("http", &cancelled));
                        return Err(cancelled);
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Execute a single request attempt.
    async fn execute_once<T: serde::de::DeserializeOwned>(
        &self,
        method: &Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> std::result::Result<T, Disposition> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(header::AUTHORIZATION, self.auth_header.as_str())
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Err(classify(CliError::from_transport(&e), None)),
        };

        self.handle_response(response).await
    }

    /// Turn a response into a value or a retry disposition.
    ///
    /// The `Retry-After` header is read before the body is consumed.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: Response,
    ) -> std::result::Result<T, Disposition> {
        let status = response.status();

        if status.is_success() {
            return match response.json::<T>().await {
                Ok(value) => Ok(value),
                Err(e) => Err(classify(
                    CliError::Unexpected(format!(
                        "invalid response body: {}",
                        redact(&e.to_string())
                    )),
                    None,
                )),
            };
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %redact(&body), "error response");

        let context = error_context(status, &body);
        Err(classify(CliError::from_status(status, &context), retry_after))
    }

    /// The deadline violation that spending `upcoming` more time would cause.
    fn deadline_exceeded(&self, started: Instant, upcoming: Duration) -> Option<CliError> {
        let deadline = self.policy.deadline?;
        if started.elapsed() + upcoming >= deadline {
            Some(CliError::Cancelled(
                "operation deadline exceeded".to_string(),
            ))
        } else {
            None
        }
    }
}

fn build_http_client(settings: &Settings, timeout: Duration) -> Result<Client> {
    let mut builder = Client::builder().timeout(timeout);
    if !settings.verify_ssl {
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder
        .build()
        .map_err(|e| CliError::Internal(format!("failed to build HTTP client: {}", e)))
}

/// Emit the NET_007 warning and its audit record the first time certificate
/// checks are disabled. Once per process, not per request.
fn warn_insecure_transport(quiet: bool, audit: &AuditLog) {
    INSECURE_WARNING.call_once(|| {
        let warning = CliError::InsecureTransport;
        warn!(code = warning.code(), "certificate verification disabled");
        eprintln!("{}", warning.render(quiet));
        audit.record(AuditEntry::warning("http", &warning));
    });
}

/// Sort a classified error into a retry disposition.
fn classify(error: CliError, retry_after: Option<Duration>) -> Disposition {
    if matches!(error, CliError::Unexpected(_)) {
        return Disposition::RetryOnce(error);
    }
    if error.is_retryable() {
        return Disposition::Retry { error, retry_after };
    }
    Disposition::Fatal(error)
}

/// Parse a `Retry-After` header. Only the delta-seconds form is honored;
/// HTTP-date values fall back to exponential backoff.
fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    let value = headers.get(header::RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Add up to ten percent of uniform jitter to a backoff delay.
fn with_jitter(delay: Duration) -> Duration {
    let millis = delay.as_millis() as u64;
    Duration::from_millis(millis + fastrand::u64(0..=millis / 10))
}

/// Pull a displayable message out of a YouTrack error body.
///
/// YouTrack reports errors as `{"error": ..., "error_description": ...}`.
fn error_context(status: StatusCode, body: &str) -> String {
    if !body.is_empty() {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
            let error = json.get("error").and_then(|v| v.as_str());
            let description = json.get("error_description").and_then(|v| v.as_str());
            match (error, description) {
                (Some(error), Some(description)) => {
                    return redact(&format!("{}: {}", error, description));
                }
                (Some(error), None) => return redact(error),
                (None, Some(description)) => return redact(description),
                (None, None) => {}
            }
        }
    }
    status
        .canonical_reason()
        .unwrap_or("unknown status")
        .to_string()
}

/// Normalize the base URL by removing trailing slashes.
fn normalize_base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');

    if !url.starts_with("https://") && !url.contains("localhost") && !url.contains("127.0.0.1") {
        warn!("base URL does not use HTTPS: {}", url);
    }

    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialRecord, CredentialSource};
    use wiremock::matchers::{header as header_matcher, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            timeout: Duration::from_secs(5),
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            deadline: None,
        }
    }

    fn test_client(server: &MockServer, policy: RetryPolicy) -> (YouTrackClient, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::in_memory(100));
        let credentials = ResolvedCredentials {
            record: CredentialRecord::with_token(server.uri(), "perm:test.token"),
            source: CredentialSource::Environment,
        };
        let client = YouTrackClient::with_policy(
            &credentials,
            &Settings::default(),
            Arc::clone(&audit),
            policy,
        )
        .unwrap();
        (client, audit)
    }

    fn user_body() -> serde_json::Value {
        serde_json::json!({"id": "1-1", "login": "alice", "fullName": "Alice Doe"})
    }

    #[test]
    fn test_normalize_base_url_removes_trailing_slash() {
        assert_eq!(
            normalize_base_url("https://yt.example.com/"),
            "https://yt.example.com"
        );
    }

    #[test]
    fn test_normalize_base_url_handles_multiple_slashes() {
        assert_eq!(
            normalize_base_url("https://yt.example.com///"),
            "https://yt.example.com"
        );
    }

    #[test]
    fn test_normalize_base_url_preserves_path() {
        assert_eq!(
            normalize_base_url("https://example.com/youtrack/"),
            "https://example.com/youtrack"
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(4000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(8000));
        assert_eq!(policy.backoff_delay(10), Duration::from_millis(30_000));
    }

    #[test]
    fn test_policy_from_settings_includes_deadline() {
        let settings = Settings {
            deadline_secs: Some(5),
            ..Settings::default()
        };
        let policy = RetryPolicy::from_settings(&settings);
        assert_eq!(policy.deadline, Some(Duration::from_secs(5)));

        let policy = RetryPolicy::from_settings(&Settings::default());
        assert_eq!(policy.deadline, None);
    }

    // The NET_007 warning fires once per process, so a single test owns both
    // the first-construction and the second-construction assertions.
    #[test]
    fn test_ssl_disable_recorded_in_audit_once() {
        let settings = Settings {
            verify_ssl: false,
            quiet: true,
            ..Settings::default()
        };
        let credentials = ResolvedCredentials {
            record: CredentialRecord::with_token("https://yt.example.com", "perm:test.token"),
            source: CredentialSource::Environment,
        };

        let audit = Arc::new(AuditLog::in_memory(10));
        YouTrackClient::with_policy(&credentials, &settings, Arc::clone(&audit), fast_policy())
            .unwrap();
        let entries = audit.list(10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].error_code.as_deref(), Some("NET_007"));
        assert_eq!(entries[0].outcome, crate::audit::AuditOutcome::Warning);

        let audit_again = Arc::new(AuditLog::in_memory(10));
        YouTrackClient::with_policy(
            &credentials,
            &settings,
            Arc::clone(&audit_again),
            fast_policy(),
        )
        .unwrap();
        assert!(audit_again.list(10).is_empty());
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        for _ in 0..50 {
            let jittered = with_jitter(Duration::from_millis(1000));
            assert!(jittered >= Duration::from_millis(1000));
            assert!(jittered <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::RETRY_AFTER, "5".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_retry_after_ignores_http_date() {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::RETRY_AFTER,
            "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(parse_retry_after(&headers), None);
        assert_eq!(parse_retry_after(&header::HeaderMap::new()), None);
    }

    #[test]
    fn test_classify_dispositions() {
        assert!(matches!(
            classify(CliError::RateLimited, Some(Duration::from_secs(2))),
            Disposition::Retry {
                retry_after: Some(_),
                ..
            }
        ));
        assert!(matches!(
            classify(CliError::CredentialsRejected, None),
            Disposition::Fatal(_)
        ));
        assert!(matches!(
            classify(CliError::Unexpected("odd".to_string()), None),
            Disposition::RetryOnce(_)
        ));
    }

    #[test]
    fn test_error_context_prefers_body_fields() {
        let body = r#"{"error":"Not Found","error_description":"Entity not found"}"#;
        assert_eq!(
            error_context(StatusCode::NOT_FOUND, body),
            "Not Found: Entity not found"
        );
        assert_eq!(
            error_context(StatusCode::NOT_FOUND, "plain text"),
            "Not Found"
        );
    }

    #[tokio::test]
    async fn test_current_user_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .and(query_param("fields", "id,login,fullName"))
            .and(header_matcher("authorization", "Bearer perm:test.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = test_client(&server, fast_policy());
        let user = client.current_user().await.unwrap();
        assert_eq!(user.login, "alice");
    }

    #[tokio::test]
    async fn test_retries_server_errors_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = test_client(&server, fast_policy());
        let user = client.current_user().await.unwrap();
        assert_eq!(user.login, "alice");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unauthorized_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = test_client(&server, fast_policy());
        let err = client.current_user().await.unwrap_err();
        assert_eq!(err.code(), "AUTH_001");
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": "Not Found",
                "error_description": "Entity not found"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = test_client(&server, fast_policy());
        let err = client.current_user().await.unwrap_err();
        assert_eq!(err.code(), "RES_001");
        assert!(err.to_string().contains("Entity not found"));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let mut policy = fast_policy();
        policy.max_retries = 2;

        let (client, _) = test_client(&server, policy);
        let err = client.current_user().await.unwrap_err();
        assert_eq!(err.code(), "NET_006");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_status_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(418))
            .expect(2)
            .mount(&server)
            .await;

        let (client, _) = test_client(&server, fast_policy());
        let err = client.current_user().await.unwrap_err();
        assert_eq!(err.code(), "GEN_001");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_body_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(2)
            .mount(&server)
            .await;

        let (client, _) = test_client(&server, fast_policy());
        let err = client.current_user().await.unwrap_err();
        assert_eq!(err.code(), "GEN_001");
    }

    #[tokio::test]
    async fn test_honors_retry_after_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = test_client(&server, fast_policy());
        let user = client.current_user().await.unwrap();
        assert_eq!(user.login, "alice");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_request_timeout_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(user_body())
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let mut policy = fast_policy();
        policy.timeout = Duration::from_millis(50);
        policy.max_retries = 0;

        let (client, _) = test_client(&server, policy);
        let err = client.current_user().await.unwrap_err();
        assert_eq!(err.code(), "NET_002");
    }

    #[tokio::test]
    async fn test_zero_deadline_cancels_before_any_request() {
        let server = MockServer::start().await;

        let mut policy = fast_policy();
        policy.deadline = Some(Duration::ZERO);

        let (client, _) = test_client(&server, policy);
        let err = client.current_user().await.unwrap_err();
        assert_eq!(err.code(), "GEN_002");
        assert_eq!(server.received_requests().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_deadline_prevents_retry_sleep() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        // The first backoff step is far beyond the deadline, so the executor
        // cancels instead of sleeping.
        let policy = RetryPolicy {
            max_retries: 3,
            timeout: Duration::from_secs(5),
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(120),
            deadline: Some(Duration::from_secs(5)),
        };

        let (client, _) = test_client(&server, policy);
        let err = client.current_user().await.unwrap_err();
        assert_eq!(err.code(), "GEN_002");
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_records_every_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
            .mount(&server)
            .await;

        let (client, audit) = test_client(&server, fast_policy());
        client.current_user().await.unwrap();

        let entries = audit.list(10);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].outcome, crate::audit::AuditOutcome::Success);
        assert_eq!(entries[1].outcome, crate::audit::AuditOutcome::Retry);
        assert_eq!(entries[1].error_code.as_deref(), Some("NET_006"));
        assert_eq!(entries[2].outcome, crate::audit::AuditOutcome::Retry);
        assert!(entries.iter().all(|entry| entry.command == "http"));
    }
}
