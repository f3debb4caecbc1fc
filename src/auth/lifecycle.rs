// Identity lifecycle: signup, confirmation, login, logout and request authentication

use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::api::metrics::Metrics;
use crate::auth::audit_logger::{AuditContext, AuditLogger, IdentityEvent};
use crate::auth::token_fingerprint::TokenFingerprint;
use crate::core::credentials::{CredentialCodec, PasswordDigest};
use crate::core::errors::{ConflictKey, ServiceError, StoreError};
use crate::core::models::{
    AccountRecord, ConfirmRequest, ConfirmedAccount, Identity, LoginIdentifier, LoginRequest,
    LoginSession, NewAccount, PendingRegistration, RegistrationMethod, Role, SignupRequest,
};
use crate::core::tokens::TokenIssuer;
use crate::core::validation::{
    email_domain, normalize_email, normalize_nickname, validate_confirmation_token,
    validate_email, validate_nickname, validate_password,
};
use crate::directory::AccountDirectory;
use crate::infra::domain_check::{DomainChecker, DomainStatus};
use crate::infra::mailer::{Mailer, OutgoingMail};
use crate::state::{PendingRegistrationStore, RevocationStore};

/// Bytes of entropy in a confirmation token (hex encoded to 64 chars)
const CONFIRMATION_TOKEN_BYTES: usize = 32;

/// Collaborators the service orchestrates
pub struct IdentityComponents {
    pub codec: CredentialCodec,
    pub tokens: TokenIssuer,
    pub revocations: Arc<dyn RevocationStore>,
    pub pending: Arc<dyn PendingRegistrationStore>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub mailer: Arc<dyn Mailer>,
    pub domains: Arc<dyn DomainChecker>,
    pub audit: Arc<AuditLogger>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub pending_ttl: Duration,
    pub confirmation_url_base: Url,
}

/// Orchestrates the account lifecycle over the codec, token issuer and stores
pub struct IdentityService {
    codec: CredentialCodec,
    tokens: TokenIssuer,
    revocations: Arc<dyn RevocationStore>,
    pending: Arc<dyn PendingRegistrationStore>,
    accounts: Arc<dyn AccountDirectory>,
    mailer: Arc<dyn Mailer>,
    domains: Arc<dyn DomainChecker>,
    audit: Arc<AuditLogger>,
    metrics: Arc<Metrics>,
    settings: IdentitySettings,
}

impl IdentityService {
    pub fn new(components: IdentityComponents, settings: IdentitySettings) -> Self {
        Self {
            codec: components.codec,
            tokens: components.tokens,
            revocations: components.revocations,
            pending: components.pending,
            accounts: components.accounts,
            mailer: components.mailer,
            domains: components.domains,
            audit: components.audit,
            metrics: components.metrics,
            settings,
        }
    }

    pub fn revocations(&self) -> &Arc<dyn RevocationStore> {
        &self.revocations
    }

    pub fn pending(&self) -> &Arc<dyn PendingRegistrationStore> {
        &self.pending
    }

    pub fn accounts(&self) -> &Arc<dyn AccountDirectory> {
        &self.accounts
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Start a registration: validate, check availability, persist the pending
    /// record and mail the confirmation link.
    pub async fn signup(&self, request: SignupRequest, cancel: &CancellationToken) -> Result<(), ServiceError> {
        let result = self.signup_inner(request, cancel).await;
        self.record("signup", &result);
        result
    }

    async fn signup_inner(&self, request: SignupRequest, cancel: &CancellationToken) -> Result<(), ServiceError> {
        let nickname = normalize_nickname(&request.nickname);
        let email = normalize_email(&request.email);

        validate_nickname(&nickname)?;
        validate_email(&email)?;
        validate_password(request.password.expose_secret())?;

        let domain = email_domain(&email);
        match self.domains.check(domain).await {
            Ok(DomainStatus::Exists) => {}
            Ok(DomainStatus::Missing) => {
                info!(domain = %domain, "Signup rejected: email domain does not exist");
                return Err(ServiceError::Conflict("email domain does not exist".to_string()));
            }
            Err(e) => {
                warn!(domain = %domain, error = %e, "Domain check failed, continuing signup");
            }
        }

        ensure_live(cancel)?;
        let (nickname_taken, email_taken) = self
            .accounts
            .check_exists(&nickname, &email)
            .await
            .map_err(|e| internal("check account existence", e))?;
        if nickname_taken {
            return Err(conflict(ConflictKey::Nickname));
        }
        if email_taken {
            return Err(conflict(ConflictKey::Email));
        }

        let confirmation_token = generate_confirmation_token();
        let registration = PendingRegistration {
            confirmation_token: confirmation_token.clone(),
            nickname: nickname.clone(),
            email: email.clone(),
            password: request.password,
            created_at: Utc::now(),
            ttl: self.settings.pending_ttl,
        };

        ensure_live(cancel)?;
        self.pending
            .create(registration)
            .await
            .map_err(|e| internal("persist pending registration", e))?;

        let link = self.confirmation_link(&confirmation_token);

        ensure_live(cancel)?;
        self.mailer
            .send(OutgoingMail::confirmation(&email, &nickname, &link))
            .await
            .map_err(|e| internal("send confirmation email", e))?;

        self.audit.log_event(IdentityEvent::SignupRequested, AuditContext::default());
        info!(nickname = %nickname, "Signup pending confirmation");
        Ok(())
    }

    /// Consume a confirmation token and create the account
    pub async fn confirm(
        &self,
        request: ConfirmRequest,
        cancel: &CancellationToken,
    ) -> Result<ConfirmedAccount, ServiceError> {
        let result = self.confirm_inner(request, cancel).await;
        self.record("confirm", &result);
        result
    }

    async fn confirm_inner(
        &self,
        request: ConfirmRequest,
        cancel: &CancellationToken,
    ) -> Result<ConfirmedAccount, ServiceError> {
        validate_confirmation_token(&request.token)?;

        ensure_live(cancel)?;
        let pending = self
            .pending
            .take(&request.token)
            .await
            .map_err(|e| internal("take pending registration", e))?
            .ok_or_else(|| ServiceError::NotFound("confirmation token not found or expired".to_string()))?;

        let digest = self.derive_digest(pending.password.clone()).await?;

        let account_id = self
            .accounts
            .create_account(NewAccount {
                nickname: pending.nickname.clone(),
                email: pending.email.clone(),
                password_hash: digest.hash,
                password_salt: digest.salt,
                role: Role::User,
                registration_method: RegistrationMethod::Email,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(key) => {
                    info!(conflict = ?key, "Account creation lost a uniqueness race");
                    conflict(key)
                }
                other => internal("create account", other),
            })?;

        let issued = self.tokens.issue(account_id).map_err(|e| internal("issue session token", e))?;

        self.audit.log_event(
            IdentityEvent::AccountConfirmed,
            AuditContext {
                account_id: Some(account_id),
                token: Some(TokenFingerprint::from_token(&issued.token)),
                ip_address: None,
            },
        );

        Ok(ConfirmedAccount {
            token: issued.token,
            uuid: account_id,
            nickname: pending.nickname,
            email: pending.email,
        })
    }

    /// Authenticate by nickname or email and issue a session token.
    ///
    /// `required_role` selects the entry point: the account's role must match.
    pub async fn login(
        &self,
        request: LoginRequest,
        required_role: Role,
        cancel: &CancellationToken,
    ) -> Result<LoginSession, ServiceError> {
        let operation = match required_role {
            Role::User => "login",
            Role::Admin => "admin_login",
        };
        let result = self.login_inner(request, required_role, cancel).await;
        self.record(operation, &result);
        result
    }

    async fn login_inner(
        &self,
        request: LoginRequest,
        required_role: Role,
        cancel: &CancellationToken,
    ) -> Result<LoginSession, ServiceError> {
        let identifier = login_identifier(request.nickname.as_deref(), request.email.as_deref())?;
        match &identifier {
            LoginIdentifier::Nickname(nickname) => validate_nickname(nickname)?,
            LoginIdentifier::Email(email) => validate_email(email)?,
        }
        validate_password(request.password.expose_secret())?;

        ensure_live(cancel)?;
        let account = self
            .accounts
            .find_account(&identifier)
            .await
            .map_err(|e| internal("find account", e))?
            .ok_or_else(|| ServiceError::NotFound(format!("user with this {} not found", identifier.kind())))?;

        if let Err(err) = check_login_allowed(&account, required_role) {
            self.audit.log_event(
                IdentityEvent::LoginFailed { reason: err.user_message() },
                AuditContext {
                    account_id: Some(account.account_id),
                    ..AuditContext::default()
                },
            );
            return Err(err);
        }

        let matches = self.verify_password(request.password, &account).await?;
        if !matches {
            self.audit.log_event(
                IdentityEvent::LoginFailed { reason: "invalid credentials".to_string() },
                AuditContext {
                    account_id: Some(account.account_id),
                    ..AuditContext::default()
                },
            );
            return Err(ServiceError::Unauthorized("invalid credentials".to_string()));
        }

        let issued = self
            .tokens
            .issue(account.account_id)
            .map_err(|e| internal("issue session token", e))?;

        self.audit.log_event(
            IdentityEvent::LoginSucceeded,
            AuditContext {
                account_id: Some(account.account_id),
                token: Some(TokenFingerprint::from_token(&issued.token)),
                ip_address: None,
            },
        );

        Ok(LoginSession {
            token: issued.token,
            role: account.role,
            uuid: account.account_id,
            nickname: account.nickname,
            email: account.email,
        })
    }

    /// Revoke the caller's token for the rest of its lifetime
    pub async fn logout(&self, identity: &Identity, cancel: &CancellationToken) -> Result<(), ServiceError> {
        let result = self.logout_inner(identity, cancel).await;
        self.record("logout", &result);
        result
    }

    async fn logout_inner(&self, identity: &Identity, cancel: &CancellationToken) -> Result<(), ServiceError> {
        let remaining = (identity.claims.exp - Utc::now().timestamp()).max(1) as u64;

        ensure_live(cancel)?;
        match self
            .revocations
            .revoke(identity.token.expose_secret(), Duration::from_secs(remaining))
            .await
        {
            Ok(()) => {}
            Err(StoreError::AlreadyRevoked) => {
                return Err(ServiceError::Unauthorized("token already revoked".to_string()));
            }
            Err(e) => return Err(internal("revoke token", e)),
        }

        self.audit.log_event(
            IdentityEvent::LoggedOut,
            AuditContext {
                account_id: Some(identity.account_id),
                token: Some(TokenFingerprint::from_token(identity.token.expose_secret())),
                ip_address: None,
            },
        );
        Ok(())
    }

    /// Resolve a bearer token to an identity: signature and expiry, revocation,
    /// then the account's current state.
    pub async fn authenticate(&self, token: &str) -> Result<Identity, ServiceError> {
        let claims = self.tokens.verify(token)?;
        let account_id = claims
            .account_id()
            .ok_or_else(|| ServiceError::Unauthorized("invalid token".to_string()))?;

        let revoked = self
            .revocations
            .is_revoked(token)
            .await
            .map_err(|e| internal("check token revocation", e))?;
        if revoked {
            return Err(ServiceError::Unauthorized("token has been revoked".to_string()));
        }

        let (state, role) = self
            .accounts
            .get_account_state(account_id)
            .await
            .map_err(|e| internal("load account state", e))?
            .ok_or_else(|| ServiceError::Unauthorized("account no longer exists".to_string()))?;
        if !state.is_active() {
            return Err(ServiceError::Forbidden(format!("account is {}", state.as_str())));
        }

        Ok(Identity {
            account_id,
            role,
            claims,
            token: SecretString::new(token.to_string()),
        })
    }

    /// Create an account directly, bypassing email confirmation
    pub async fn provision_account(
        &self,
        nickname: &str,
        email: &str,
        password: SecretString,
        role: Role,
    ) -> Result<Uuid, ServiceError> {
        let nickname = normalize_nickname(nickname);
        let email = normalize_email(email);
        validate_nickname(&nickname)?;
        validate_email(&email)?;
        validate_password(password.expose_secret())?;

        let digest = self.derive_digest(password).await?;
        self.accounts
            .create_account(NewAccount {
                nickname,
                email,
                password_hash: digest.hash,
                password_salt: digest.salt,
                role,
                registration_method: RegistrationMethod::Manual,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(key) => conflict(key),
                other => internal("provision account", other),
            })
    }

    fn confirmation_link(&self, token: &str) -> Url {
        let mut link = self.settings.confirmation_url_base.clone();
        link.query_pairs_mut().append_pair("token", token);
        link
    }

    async fn derive_digest(&self, password: SecretString) -> Result<PasswordDigest, ServiceError> {
        let codec = self.codec.clone();
        let started = Instant::now();
        let digest = tokio::task::spawn_blocking(move || codec.hash_password(password.expose_secret(), None))
            .await
            .map_err(|e| internal("join password hashing task", e))?
            .map_err(|e| internal("hash password", e))?;
        self.metrics.observe_password_hash(started.elapsed().as_secs_f64());
        Ok(digest)
    }

    async fn verify_password(&self, password: SecretString, account: &AccountRecord) -> Result<bool, ServiceError> {
        let codec = self.codec.clone();
        let hash = account.password_hash.clone();
        let salt = account.password_salt.clone();
        let started = Instant::now();
        let matches = tokio::task::spawn_blocking(move || {
            codec.compare_hash_passwords(password.expose_secret(), &hash, &salt)
        })
        .await
        .map_err(|e| internal("join password verification task", e))?
        .map_err(|e| internal("verify password", e))?;
        self.metrics.observe_password_hash(started.elapsed().as_secs_f64());
        Ok(matches)
    }

    fn record<T>(&self, operation: &str, result: &Result<T, ServiceError>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => outcome_label(e),
        };
        self.metrics.record_operation(operation, outcome);
    }
}

/// Reject blocked/deleted accounts and role mismatches before checking the password
fn check_login_allowed(account: &AccountRecord, required_role: Role) -> Result<(), ServiceError> {
    if !account.state.is_active() {
        return Err(ServiceError::Forbidden(format!("account is {}", account.state.as_str())));
    }
    if account.role != required_role {
        return Err(ServiceError::Forbidden(format!("{} role required", required_role)));
    }
    Ok(())
}

/// Exactly one of nickname or email, after trimming; empty strings count as absent
pub fn login_identifier(nickname: Option<&str>, email: Option<&str>) -> Result<LoginIdentifier, ServiceError> {
    let nickname = nickname.map(normalize_nickname).filter(|n| !n.is_empty());
    let email = email.map(normalize_email).filter(|e| !e.is_empty());

    match (nickname, email) {
        (Some(nickname), None) => Ok(LoginIdentifier::Nickname(nickname)),
        (None, Some(email)) => Ok(LoginIdentifier::Email(email)),
        (None, None) => Err(ServiceError::Validation(
            "Login: either nickname or email is required".to_string(),
        )),
        (Some(_), Some(_)) => Err(ServiceError::Validation(
            "Login: provide either nickname or email, not both".to_string(),
        )),
    }
}

fn generate_confirmation_token() -> String {
    let mut bytes = [0u8; CONFIRMATION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn conflict(key: ConflictKey) -> ServiceError {
    let message = match key {
        ConflictKey::Nickname => "nickname is already taken",
        ConflictKey::Email => "email is already registered",
        ConflictKey::ConfirmationToken => "confirmation token collision",
    };
    ServiceError::Conflict(message.to_string())
}

/// Log a collaborator failure with context and hide it behind a 500
fn internal(context: &str, err: impl Display) -> ServiceError {
    error!(error = %err, "Failed to {}", context);
    ServiceError::Internal(format!("{}: {}", context, err))
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), ServiceError> {
    if cancel.is_cancelled() {
        return Err(ServiceError::Cancelled);
    }
    Ok(())
}

fn outcome_label(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::Validation(_) => "validation",
        ServiceError::Conflict(_) => "conflict",
        ServiceError::NotFound(_) => "not_found",
        ServiceError::Unauthorized(_) => "unauthorized",
        ServiceError::Forbidden(_) => "forbidden",
        ServiceError::Admission(_) => "rejected",
        ServiceError::Cancelled => "cancelled",
        ServiceError::Internal(_) | ServiceError::Configuration(_) => "internal",
    }
}
