// Per-client rate limiting (GCRA leaky bucket via governor)

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;

use crate::core::errors::ServiceError;

/// Keyed limiter: one bucket per client identity
pub struct ClientRateLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl ClientRateLimiter {
    /// `per_minute` sustained requests with bursts of up to `burst`
    pub fn new(per_minute: u32, burst: u32) -> Result<Self, ServiceError> {
        let per_minute = NonZeroU32::new(per_minute).ok_or_else(|| {
            ServiceError::Configuration("rate limit per minute must be greater than 0".to_string())
        })?;
        let burst = NonZeroU32::new(burst).ok_or_else(|| {
            ServiceError::Configuration("rate limit burst must be greater than 0".to_string())
        })?;

        let quota = Quota::per_minute(per_minute).allow_burst(burst);
        Ok(Self {
            limiter: RateLimiter::keyed(quota),
        })
    }

    /// Consume one cell for `client`; false once the bucket is empty
    pub fn check(&self, client: &str) -> bool {
        self.limiter.check_key(&client.to_string()).is_ok()
    }

    /// Drop buckets that have fully replenished
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}
