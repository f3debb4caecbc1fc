// Session token hashing for revocation keys and log correlation

use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 of a session token (64-character hex string)
///
/// Revocation markers are keyed by this value so raw tokens never reach a
/// store or a log line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenFingerprint(String);

impl TokenFingerprint {
    pub fn from_token(token: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters, enough to correlate log lines
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for TokenFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bearer token as received from a client
pub struct BearerToken(Secret<String>);

impl BearerToken {
    pub fn new(token: &str) -> Self {
        Self(Secret::new(token.to_string()))
    }

    pub fn fingerprint(&self) -> TokenFingerprint {
        TokenFingerprint::from_token(self.expose_secret())
    }

    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl fmt::Display for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<REDACTED>")
    }
}
