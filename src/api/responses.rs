// Response types for API endpoints

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::core::errors::{AdmissionError, ServiceError};

/// Error body shared by every 4xx/5xx response
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status_code: u16,
    /// Canonical reason phrase for the status
    pub message: String,
    /// User-facing detail
    pub description: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub revocation_store: String,
    pub pending_store: String,
    pub account_directory: String,
}

/// GET /auth/session response
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub uuid: uuid::Uuid,
    pub role: crate::core::models::Role,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// API error type that converts domain errors to HTTP responses
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub description: String,
}

impl ApiError {
    pub fn new(status: StatusCode, description: impl Into<String>) -> Self {
        Self {
            status,
            description: description.into(),
        }
    }

    /// Create from ServiceError, using the sanitized user message
    pub fn from_service_error(err: ServiceError) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            description: err.user_message(),
        }
    }

    pub fn body(&self) -> ErrorResponse {
        ErrorResponse {
            status_code: self.status.as_u16(),
            message: self
                .status
                .canonical_reason()
                .unwrap_or("Unknown Status")
                .to_string(),
            description: self.description.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(self.body());
        (self.status, body).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::from_service_error(err)
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        ApiError::from_service_error(ServiceError::Admission(err))
    }
}
