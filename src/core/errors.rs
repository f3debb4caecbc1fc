// Domain error types - Secure error handling with no information disclosure

use thiserror::Error;

/// Main error type crossing the HTTP boundary
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed or structurally invalid input (HTTP 422)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Nickname, email or domain conflict (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unknown account or expired confirmation token (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad credentials, bad or revoked token (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Blocked/deleted account or role mismatch (HTTP 403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Rejected by an admission gatekeeper (status depends on the gate)
    #[error("Request rejected: {0}")]
    Admission(#[from] AdmissionError),

    /// The request's deadline fired before the operation finished (HTTP 504)
    #[error("Operation cancelled")]
    Cancelled,

    /// Collaborator failure (HTTP 500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error (HTTP 500)
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Rejections produced by the admission pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("service is temporarily unavailable")]
    ServiceUnavailable,

    #[error("rate limit exceeded")]
    TooManyRequests,

    #[error("request URI exceeds {limit} characters")]
    UriTooLong { limit: usize },

    #[error("request exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("request {0} is not valid UTF-8")]
    InvalidEncoding(&'static str),

    #[error("content type '{0}' is not supported")]
    UnsupportedMediaType(String),

    #[error("method {0} is not implemented")]
    NotImplemented(String),

    #[error("method {0} is not allowed for this resource")]
    MethodNotAllowed(String),

    #[error("no resource at {0}")]
    NotFound(String),

    #[error("request did not complete within {secs}s")]
    GatewayTimeout { secs: u64 },
}

impl AdmissionError {
    pub fn status_code(&self) -> u16 {
        match self {
            AdmissionError::ServiceUnavailable => 503,
            AdmissionError::TooManyRequests => 429,
            AdmissionError::UriTooLong { .. } => 414,
            AdmissionError::PayloadTooLarge { .. } => 413,
            AdmissionError::InvalidEncoding(_) => 422,
            AdmissionError::UnsupportedMediaType(_) => 415,
            AdmissionError::NotImplemented(_) => 501,
            AdmissionError::MethodNotAllowed(_) => 405,
            AdmissionError::NotFound(_) => 404,
            AdmissionError::GatewayTimeout { .. } => 504,
        }
    }

    /// Metric label naming the gate that produced the rejection
    pub fn gate(&self) -> &'static str {
        match self {
            AdmissionError::ServiceUnavailable => "service_switch",
            AdmissionError::TooManyRequests => "rate_limit",
            AdmissionError::UriTooLong { .. } => "uri_length",
            AdmissionError::PayloadTooLarge { .. } => "request_size",
            AdmissionError::InvalidEncoding(_) => "utf8",
            AdmissionError::UnsupportedMediaType(_) => "content_type",
            AdmissionError::NotImplemented(_) => "method_allowlist",
            AdmissionError::MethodNotAllowed(_) => "route_method",
            AdmissionError::NotFound(_) => "route_missing",
            AdmissionError::GatewayTimeout { .. } => "timeout",
        }
    }
}

/// Which uniqueness constraint a store write tripped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKey {
    Nickname,
    Email,
    ConfirmationToken,
}

/// Errors reported by the revocation, pending-registration and account stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint violated on {0:?}")]
    Conflict(ConflictKey),

    #[error("token already revoked")]
    AlreadyRevoked,

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Session token errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    Expired,

    #[error("failed to issue token: {0}")]
    Issue(String),
}

/// Password hashing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("malformed salt: {0}")]
    MalformedSalt(String),

    #[error("key derivation failed: {0}")]
    Kdf(String),
}

impl ServiceError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 422,
            ServiceError::Conflict(_) => 409,
            ServiceError::NotFound(_) => 404,
            ServiceError::Unauthorized(_) => 401,
            ServiceError::Forbidden(_) => 403,
            ServiceError::Admission(e) => e.status_code(),
            ServiceError::Cancelled => 504,
            ServiceError::Internal(_) => 500,
            ServiceError::Configuration(_) => 500,
        }
    }

    /// Get user-friendly error message (no sensitive information)
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Validation(detail)
            | ServiceError::Conflict(detail)
            | ServiceError::NotFound(detail)
            | ServiceError::Unauthorized(detail)
            | ServiceError::Forbidden(detail) => detail.clone(),
            ServiceError::Admission(e) => e.to_string(),
            ServiceError::Cancelled => "request timed out".to_string(),
            ServiceError::Internal(_) => "Internal error".to_string(),
            ServiceError::Configuration(_) => "Internal error".to_string(),
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidToken => ServiceError::Unauthorized("invalid token".to_string()),
            TokenError::Expired => ServiceError::Unauthorized("token expired".to_string()),
            TokenError::Issue(detail) => ServiceError::Internal(detail),
        }
    }
}

impl From<CredentialError> for ServiceError {
    fn from(err: CredentialError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}
