// Short-lived state: token revocations, pending registrations, rate limiting

use async_trait::async_trait;
use std::time::Duration;

use crate::core::errors::StoreError;
use crate::core::models::PendingRegistration;

pub mod memory_store;
pub mod rate_limiter;
pub mod redis_store;

/// Self-expiring markers for logged-out session tokens
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Mark a token revoked for `ttl`. Fails with `AlreadyRevoked` if a marker exists.
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn is_revoked(&self, token: &str) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Signups awaiting confirmation, keyed by confirmation token
#[async_trait]
pub trait PendingRegistrationStore: Send + Sync {
    /// Insert if absent. Fails with `Conflict(ConfirmationToken)` on collision.
    async fn create(&self, registration: PendingRegistration) -> Result<(), StoreError>;

    /// Absent or expired entries read as `None`
    async fn get(&self, token: &str) -> Result<Option<PendingRegistration>, StoreError>;

    async fn delete(&self, token: &str) -> Result<(), StoreError>;

    /// Atomically read and remove an entry; at most one caller observes `Some`
    async fn take(&self, token: &str) -> Result<Option<PendingRegistration>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Lower bound for store TTLs; both moka and Redis need a positive expiry
pub(crate) fn clamp_ttl(ttl: Duration) -> Duration {
    ttl.max(Duration::from_secs(1))
}
