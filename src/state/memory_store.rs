// In-process revocation and pending-registration stores backed by moka

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

use crate::auth::token_fingerprint::TokenFingerprint;
use crate::core::errors::{ConflictKey, StoreError};
use crate::core::models::PendingRegistration;
use crate::state::{clamp_ttl, PendingRegistrationStore, RevocationStore};

/// Cache value carrying its own lifetime
#[derive(Clone)]
struct Timed<V> {
    value: V,
    ttl: Duration,
    deadline: Instant,
}

impl<V> Timed<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let ttl = clamp_ttl(ttl);
        Self {
            value,
            ttl,
            deadline: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.deadline
    }
}

/// Expires each entry after the TTL it was created with
struct PerEntryTtl;

impl<K, V> Expiry<K, Timed<V>> for PerEntryTtl {
    fn expire_after_create(&self, _key: &K, value: &Timed<V>, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// No size bound: an entry leaves only when its TTL runs out
fn timed_cache<V>() -> Cache<String, Timed<V>>
where
    V: Clone + Send + Sync + 'static,
{
    Cache::builder().expire_after(PerEntryTtl).build()
}

/// Revocation markers keyed by token fingerprint
pub struct MemoryRevocationStore {
    cache: Cache<String, Timed<()>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self { cache: timed_cache() }
    }
}

impl Default for MemoryRevocationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), StoreError> {
        let key = TokenFingerprint::from_token(token).to_string();

        // A lingering entry past its deadline may not have been evicted yet
        if let Some(existing) = self.cache.get(&key).await {
            if !existing.is_live() {
                self.cache.invalidate(&key).await;
            }
        }

        let entry = self.cache.entry(key).or_insert(Timed::new((), ttl)).await;
        if entry.is_fresh() {
            Ok(())
        } else {
            Err(StoreError::AlreadyRevoked)
        }
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, StoreError> {
        let key = TokenFingerprint::from_token(token).to_string();
        Ok(self
            .cache
            .get(&key)
            .await
            .map(|marker| marker.is_live())
            .unwrap_or(false))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Pending registrations keyed by confirmation token
pub struct MemoryPendingStore {
    cache: Cache<String, Timed<PendingRegistration>>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self { cache: timed_cache() }
    }
}

impl Default for MemoryPendingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PendingRegistrationStore for MemoryPendingStore {
    async fn create(&self, registration: PendingRegistration) -> Result<(), StoreError> {
        let key = registration.confirmation_token.clone();
        let ttl = registration.ttl;

        if let Some(existing) = self.cache.get(&key).await {
            if !existing.is_live() {
                self.cache.invalidate(&key).await;
            }
        }

        let entry = self
            .cache
            .entry(key)
            .or_insert(Timed::new(registration, ttl))
            .await;
        if entry.is_fresh() {
            Ok(())
        } else {
            Err(StoreError::Conflict(ConflictKey::ConfirmationToken))
        }
    }

    async fn get(&self, token: &str) -> Result<Option<PendingRegistration>, StoreError> {
        Ok(self
            .cache
            .get(token)
            .await
            .filter(Timed::is_live)
            .map(|timed| timed.value))
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        self.cache.invalidate(token).await;
        Ok(())
    }

    async fn take(&self, token: &str) -> Result<Option<PendingRegistration>, StoreError> {
        Ok(self
            .cache
            .remove(token)
            .await
            .filter(Timed::is_live)
            .map(|timed| timed.value))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
