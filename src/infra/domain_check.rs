// Email domain existence check

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Outcome of a conclusive domain lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainStatus {
    Exists,
    Missing,
}

/// Inconclusive lookup; callers treat this as a soft failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainCheckError {
    #[error("domain lookup failed: {0}")]
    Lookup(String),

    #[error("domain lookup timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait DomainChecker: Send + Sync {
    async fn check(&self, domain: &str) -> Result<DomainStatus, DomainCheckError>;
}

/// Used when domain checking is disabled
#[derive(Debug, Default)]
pub struct AllowAllDomains;

#[async_trait]
impl DomainChecker for AllowAllDomains {
    async fn check(&self, _domain: &str) -> Result<DomainStatus, DomainCheckError> {
        Ok(DomainStatus::Exists)
    }
}

/// Resolves the domain through the system resolver
#[derive(Debug)]
pub struct DnsDomainChecker {
    timeout: Duration,
}

impl DnsDomainChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for DnsDomainChecker {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

/// Only a resolver's explicit "no such name" answer counts as missing.
///
/// A name with no A/AAAA records (EAI_NODATA) exists; mail-only domains
/// answer that way.
fn classify_lookup_error(err: &io::Error) -> Result<DomainStatus, DomainCheckError> {
    let message = err.to_string();
    if message.contains("No address associated") {
        return Ok(DomainStatus::Exists);
    }
    let nxdomain = err.kind() == io::ErrorKind::NotFound
        || message.contains("not known")
        || message.contains("No such host")
        || message.contains("NXDOMAIN");
    if nxdomain {
        Ok(DomainStatus::Missing)
    } else {
        Err(DomainCheckError::Lookup(message))
    }
}

#[async_trait]
impl DomainChecker for DnsDomainChecker {
    async fn check(&self, domain: &str) -> Result<DomainStatus, DomainCheckError> {
        // Port is required by lookup_host but never contacted
        let lookup = tokio::net::lookup_host(format!("{}:25", domain));
        match tokio::time::timeout(self.timeout, lookup).await {
            // An empty answer is not a "no such name" answer
            Ok(Ok(_)) => Ok(DomainStatus::Exists),
            Ok(Err(e)) => classify_lookup_error(&e),
            Err(_) => Err(DomainCheckError::Timeout(self.timeout)),
        }
    }
}
