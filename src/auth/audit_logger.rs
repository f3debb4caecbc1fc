// Security event logging

use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::token_fingerprint::TokenFingerprint;

/// Identity security event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    SignupRequested,
    AccountConfirmed,
    LoginSucceeded,
    LoginFailed { reason: String },
    LoggedOut,
    AuthRejected { reason: String },
}

impl IdentityEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            IdentityEvent::SignupRequested => "SIGNUP_REQUESTED",
            IdentityEvent::AccountConfirmed => "ACCOUNT_CONFIRMED",
            IdentityEvent::LoginSucceeded => "LOGIN_SUCCESS",
            IdentityEvent::LoginFailed { .. } => "LOGIN_FAILURE",
            IdentityEvent::LoggedOut => "LOGOUT",
            IdentityEvent::AuthRejected { .. } => "AUTH_REJECTED",
        }
    }

    fn reason(&self) -> Option<&str> {
        match self {
            IdentityEvent::LoginFailed { reason } | IdentityEvent::AuthRejected { reason } => Some(reason),
            _ => None,
        }
    }

    fn is_failure(&self) -> bool {
        self.reason().is_some()
    }
}

/// Context attached to an audit record
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub account_id: Option<Uuid>,
    pub token: Option<TokenFingerprint>,
    pub ip_address: Option<String>,
}

/// Audit logger for security events
pub struct AuditLogger {
    db_pool: Option<Arc<PgPool>>,
}

impl AuditLogger {
    /// If `db_pool` is `None`, only structured logging is used.
    pub fn new(db_pool: Option<Arc<PgPool>>) -> Self {
        Self { db_pool }
    }

    /// Fire-and-forget: logging happens on a spawned task and never affects the request.
    pub fn log_event(&self, event: IdentityEvent, context: AuditContext) {
        let db_pool = self.db_pool.clone();

        tokio::spawn(async move {
            let token = context.token.as_ref().map(|t| t.short().to_string());
            if event.is_failure() {
                warn!(
                    event = event.event_type(),
                    account_id = ?context.account_id,
                    token = ?token,
                    ip_address = ?context.ip_address,
                    reason = event.reason().unwrap_or_default(),
                    "Identity event"
                );
            } else {
                info!(
                    event = event.event_type(),
                    account_id = ?context.account_id,
                    token = ?token,
                    ip_address = ?context.ip_address,
                    "Identity event"
                );
            }

            if let Some(pool) = db_pool {
                if let Err(e) = sqlx::query(
                    "INSERT INTO identity_audit_log (account_id, event_type, detail, ip_address, created_at)
                     VALUES ($1, $2, $3, $4::inet, NOW())",
                )
                .bind(context.account_id)
                .bind(event.event_type())
                .bind(event.reason())
                .bind(context.ip_address.as_deref())
                .execute(pool.as_ref())
                .await
                {
                    warn!(error = %e, "Failed to write audit log to database");
                }
            }
        });
    }
}
