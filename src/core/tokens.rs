// Session token issuing and verification (HS256 JWT)

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::core::errors::TokenError;
use crate::core::models::SessionClaims;

/// Default session lifetime: 21 days
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(21 * 24 * 60 * 60);

/// A freshly minted token and the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: SessionClaims,
}

/// Signs and verifies session tokens with a shared secret
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &SecretString, lifetime: Duration) -> Self {
        let secret = secret.expose_secret().as_bytes();

        // Only HS256 is accepted and expiry is exact
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub", "iat"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            lifetime,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Issue a token for an account, valid for the configured lifetime
    pub fn issue(&self, account_id: Uuid) -> Result<IssuedToken, TokenError> {
        self.issue_at(account_id, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        account_id: Uuid,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let lifetime = chrono::Duration::from_std(self.lifetime)
            .map_err(|e| TokenError::Issue(e.to_string()))?;
        let claims = SessionClaims {
            sub: account_id.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + lifetime).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Issue(e.to_string()))?;

        Ok(IssuedToken { token, claims })
    }

    /// Verify signature, algorithm and expiry, returning the claims
    pub fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::InvalidToken,
            },
        )?;

        if data.claims.account_id().is_none() {
            return Err(TokenError::InvalidToken);
        }
        Ok(data.claims)
    }
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("secret", &"<REDACTED>")
            .field("lifetime", &self.lifetime)
            .finish()
    }
}
