// Common test utilities and helpers for all test modules
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use secrecy::SecretString;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use storefront_identity::api::metrics::Metrics;
use storefront_identity::api::middleware::AdmissionState;
use storefront_identity::api::{create_router, AppState};
use storefront_identity::auth::audit_logger::AuditLogger;
use storefront_identity::auth::auth_middleware::AuthState;
use storefront_identity::auth::lifecycle::{IdentityComponents, IdentityService};
use storefront_identity::config::Config;
use storefront_identity::core::credentials::{CredentialCodec, KdfParams};
use storefront_identity::core::models::Role;
use storefront_identity::core::tokens::TokenIssuer;
use storefront_identity::directory::memory::MemoryAccountDirectory;
use storefront_identity::infra::domain_check::{DomainCheckError, DomainChecker, DomainStatus};
use storefront_identity::infra::mailer::{MailError, Mailer, OutgoingMail};
use storefront_identity::state::memory_store::{MemoryPendingStore, MemoryRevocationStore};
use storefront_identity::state::rate_limiter::ClientRateLimiter;

pub const TEST_SECRET: &str = "test-secret-that-is-at-least-32-bytes-long";
pub const PASSWORD: &str = "correct-horse";

/// Cheap Argon2 parameters so tests do not spend seconds hashing
pub fn fast_kdf() -> KdfParams {
    KdfParams {
        iterations: 1,
        memory_kib: 64,
        parallelism: 1,
        output_len: 32,
    }
}

pub fn fast_codec() -> CredentialCodec {
    CredentialCodec::new(fast_kdf()).expect("fast KDF params are valid")
}

pub fn token_issuer() -> TokenIssuer {
    TokenIssuer::new(
        &SecretString::new(TEST_SECRET.to_string()),
        Duration::from_secs(21 * 24 * 60 * 60),
    )
}

/// Captures outgoing mail instead of sending it
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    delay: Option<Duration>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    /// Confirmation token from the most recent message
    pub fn last_token(&self) -> Option<String> {
        self.sent().last().and_then(|mail| extract_token(&mail.text))
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(MailError::Transport("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

/// Pull the `token=` query value out of a confirmation message
pub fn extract_token(text: &str) -> Option<String> {
    let start = text.find("token=")? + "token=".len();
    let token: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Domain checker with a fixed list of missing domains
#[derive(Default)]
pub struct ScriptedDomainChecker {
    pub missing: Vec<String>,
    pub fail: bool,
    pub delay: Option<Duration>,
}

#[async_trait]
impl DomainChecker for ScriptedDomainChecker {
    async fn check(&self, domain: &str) -> Result<DomainStatus, DomainCheckError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(DomainCheckError::Lookup("resolver unreachable".to_string()));
        }
        if self.missing.iter().any(|m| m == domain) {
            Ok(DomainStatus::Missing)
        } else {
            Ok(DomainStatus::Exists)
        }
    }
}

/// A fully wired service over in-memory stores, with handles for assertions
pub struct TestApp {
    pub router: Router,
    pub identity: Arc<IdentityService>,
    pub accounts: Arc<MemoryAccountDirectory>,
    pub pending: Arc<MemoryPendingStore>,
    pub revocations: Arc<MemoryRevocationStore>,
    pub mailer: Arc<RecordingMailer>,
    pub metrics: Arc<Metrics>,
}

pub struct TestAppBuilder {
    pub config: Config,
    pub mailer: RecordingMailer,
    pub domains: ScriptedDomainChecker,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::test_config(),
            mailer: RecordingMailer::default(),
            domains: ScriptedDomainChecker::default(),
        }
    }

    pub fn config(mut self, configure: impl FnOnce(&mut Config)) -> Self {
        configure(&mut self.config);
        self
    }

    pub fn mailer(mut self, mailer: RecordingMailer) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn domains(mut self, domains: ScriptedDomainChecker) -> Self {
        self.domains = domains;
        self
    }

    pub fn build(self) -> TestApp {
        let config = self.config;
        let accounts = Arc::new(MemoryAccountDirectory::new());
        let pending = Arc::new(MemoryPendingStore::new());
        let revocations = Arc::new(MemoryRevocationStore::new());
        let mailer = Arc::new(self.mailer);
        let metrics = Arc::new(Metrics::new().expect("metrics register"));
        let audit_logger = Arc::new(AuditLogger::new(None));

        let identity = Arc::new(IdentityService::new(
            IdentityComponents {
                codec: CredentialCodec::new(config.kdf_params()).expect("valid KDF params"),
                tokens: TokenIssuer::new(&config.token_secret, config.token_lifetime()),
                revocations: revocations.clone(),
                pending: pending.clone(),
                accounts: accounts.clone(),
                mailer: mailer.clone(),
                domains: Arc::new(self.domains),
                audit: audit_logger.clone(),
                metrics: metrics.clone(),
            },
            config.identity_settings(),
        ));

        let rate_limiter = Arc::new(
            ClientRateLimiter::new(config.rate_limit_per_minute, config.rate_limit_burst)
                .expect("valid rate limit"),
        );
        let admission = Arc::new(AdmissionState {
            settings: config.admission_settings(),
            rate_limiter,
            metrics: metrics.clone(),
        });
        let auth_state = Arc::new(AuthState {
            identity: identity.clone(),
            audit_logger,
            trusted_proxies: config.trusted_proxies(),
        });

        let router = create_router(
            AppState {
                identity: identity.clone(),
                admission,
                metrics: metrics.clone(),
            },
            auth_state,
        );

        TestApp {
            router,
            identity,
            accounts,
            pending,
            revocations,
            mailer,
            metrics,
        }
    }
}

pub fn test_app() -> TestApp {
    TestAppBuilder::new().build()
}

/// Decoded response
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let text = String::from_utf8_lossy(&bytes).to_string();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> TestResponse {
        self.send(json_request(Method::POST, uri, &body)).await
    }

    pub async fn signup(&self, nickname: &str, email: &str, password: &str) -> TestResponse {
        self.post_json(
            "/auth/signup",
            serde_json::json!({ "nickname": nickname, "email": email, "password": password }),
        )
        .await
    }

    pub async fn confirm(&self, token: &str) -> TestResponse {
        self.post_json("/auth/signup-with-token", serde_json::json!({ "token": token }))
            .await
    }

    /// Signup plus confirmation; returns the session token
    pub async fn register(&self, nickname: &str, email: &str) -> String {
        let response = self.signup(nickname, email, PASSWORD).await;
        assert_eq!(response.status, StatusCode::NO_CONTENT, "signup failed: {}", response.text);
        let token = self.mailer.last_token().expect("confirmation mail sent");
        let response = self.confirm(&token).await;
        assert_eq!(response.status, StatusCode::CREATED, "confirm failed: {}", response.text);
        response.body["token"].as_str().expect("token in body").to_string()
    }

    pub async fn create_admin(&self, nickname: &str, email: &str) {
        self.identity
            .provision_account(nickname, email, SecretString::new(PASSWORD.to_string()), Role::Admin)
            .await
            .expect("provision admin");
    }

    pub async fn authed(&self, method: Method, uri: &str, token: &str) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }
}

pub fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
