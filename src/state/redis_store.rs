// Redis-backed revocation and pending-registration stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::auth::token_fingerprint::TokenFingerprint;
use crate::core::errors::{ConflictKey, StoreError};
use crate::core::models::PendingRegistration;
use crate::state::{clamp_ttl, PendingRegistrationStore, RevocationStore};

const REVOKED_PREFIX: &str = "identity:revoked:";
const PENDING_PREFIX: &str = "identity:pending:";

/// Serialized form of a pending registration
#[derive(Serialize, Deserialize)]
struct StoredRegistration {
    confirmation_token: String,
    nickname: String,
    email: String,
    password: String,
    created_at: DateTime<Utc>,
    ttl_secs: u64,
}

impl From<&PendingRegistration> for StoredRegistration {
    fn from(p: &PendingRegistration) -> Self {
        Self {
            confirmation_token: p.confirmation_token.clone(),
            nickname: p.nickname.clone(),
            email: p.email.clone(),
            password: p.password.expose_secret().clone(),
            created_at: p.created_at,
            ttl_secs: p.ttl.as_secs(),
        }
    }
}

impl From<StoredRegistration> for PendingRegistration {
    fn from(s: StoredRegistration) -> Self {
        Self {
            confirmation_token: s.confirmation_token,
            nickname: s.nickname,
            email: s.email,
            password: SecretString::new(s.password),
            created_at: s.created_at,
            ttl: Duration::from_secs(s.ttl_secs),
        }
    }
}

/// Redis store shared by revocation markers and pending registrations
///
/// Expiry is delegated to Redis (`SET .. EX`); single-use confirmation relies on `GETDEL`.
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
}

impl RedisStore {
    /// Connect with retries and verify the connection with PING
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        use tokio::time::sleep;

        const MAX_RETRIES: u32 = 3;
        const INITIAL_DELAY_MS: u64 = 500;

        let mut connection_errors = Vec::new();

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                sleep(Duration::from_millis(INITIAL_DELAY_MS * attempt as u64)).await;
            }

            match Self::try_create_connection(redis_url).await {
                Ok(store) => match store.ping_inner().await {
                    Ok(()) => {
                        if attempt > 0 {
                            tracing::info!(attempt = attempt + 1, "Redis connection succeeded after retry");
                        }
                        return Ok(store);
                    }
                    Err(e) => {
                        connection_errors.push(format!("Connection created but ping failed: {}", e));
                    }
                },
                Err(e) => {
                    if attempt < MAX_RETRIES - 1 {
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_attempts = MAX_RETRIES,
                            error = %e,
                            "Redis connection attempt failed, retrying..."
                        );
                    }
                    connection_errors.push(format!("Attempt {} failed: {}", attempt + 1, e));
                }
            }
        }

        Err(StoreError::Backend(format!(
            "Failed to create Redis connection after {} attempts: {}",
            MAX_RETRIES,
            connection_errors.join("; ")
        )))
    }

    async fn try_create_connection(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Backend(format!("Invalid Redis URL: {}", e)))?;

        let connection_manager = tokio::time::timeout(Duration::from_secs(10), ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Backend("Redis ConnectionManager creation timed out".to_string()))?
            .map_err(|e| StoreError::Backend(format!("Failed to create Redis ConnectionManager: {}", e)))?;

        Ok(Self { connection_manager })
    }

    async fn ping_inner(&self) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("Redis ping failed: {}", e)))?;
        Ok(())
    }

    /// `SET key value NX EX ttl`; returns false when the key already exists
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.connection_manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(clamp_ttl(ttl).as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to set {}: {}", key_kind(key), e)))?;
        Ok(reply.is_some())
    }
}

fn revoked_key(token: &str) -> String {
    format!("{}{}", REVOKED_PREFIX, TokenFingerprint::from_token(token))
}

fn pending_key(token: &str) -> String {
    format!("{}{}", PENDING_PREFIX, token)
}

/// Key family for error messages; confirmation tokens never reach logs
fn key_kind(key: &str) -> &'static str {
    if key.starts_with(REVOKED_PREFIX) {
        "revocation marker"
    } else {
        "pending registration"
    }
}

fn decode_registration(raw: Option<String>) -> Result<Option<PendingRegistration>, StoreError> {
    raw.map(|json| {
        serde_json::from_str::<StoredRegistration>(&json)
            .map(PendingRegistration::from)
            .map_err(|e| StoreError::Backend(format!("Failed to deserialize pending registration: {}", e)))
    })
    .transpose()
}

#[async_trait]
impl RevocationStore for RedisStore {
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), StoreError> {
        if self.set_if_absent(&revoked_key(token), "1", ttl).await? {
            Ok(())
        } else {
            Err(StoreError::AlreadyRevoked)
        }
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection_manager.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(revoked_key(token))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to check revocation: {}", e)))?;
        Ok(exists)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ping_inner().await
    }
}

#[async_trait]
impl PendingRegistrationStore for RedisStore {
    async fn create(&self, registration: PendingRegistration) -> Result<(), StoreError> {
        let json = serde_json::to_string(&StoredRegistration::from(&registration))
            .map_err(|e| StoreError::Backend(format!("Failed to serialize pending registration: {}", e)))?;

        let key = pending_key(&registration.confirmation_token);
        if self.set_if_absent(&key, &json, registration.ttl).await? {
            Ok(())
        } else {
            Err(StoreError::Conflict(ConflictKey::ConfirmationToken))
        }
    }

    async fn get(&self, token: &str) -> Result<Option<PendingRegistration>, StoreError> {
        let mut conn = self.connection_manager.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(pending_key(token))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to get pending registration: {}", e)))?;
        decode_registration(raw)
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        let _removed: i64 = redis::cmd("DEL")
            .arg(pending_key(token))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to delete pending registration: {}", e)))?;
        Ok(())
    }

    async fn take(&self, token: &str) -> Result<Option<PendingRegistration>, StoreError> {
        let mut conn = self.connection_manager.clone();
        let raw: Option<String> = redis::cmd("GETDEL")
            .arg(pending_key(token))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to take pending registration: {}", e)))?;
        decode_registration(raw)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ping_inner().await
    }
}
