// Admission pipeline: ordered gatekeepers wrapping every route

use axum::{
    async_trait,
    body::{Body, HttpBody},
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, warn};

use crate::api::metrics::Metrics;
use crate::api::responses::ApiError;
use crate::auth::auth_middleware::{extract_ip_address, TrustedProxies};
use crate::core::errors::AdmissionError;
use crate::state::rate_limiter::ClientRateLimiter;

/// Per-header framing overhead counted by the size gate (": " and CRLF)
const HEADER_OVERHEAD_BYTES: usize = 4;

/// Limits and switches enforced by the gatekeepers
#[derive(Debug, Clone)]
pub struct AdmissionSettings {
    pub service_available: bool,
    pub max_uri_length: usize,
    pub max_request_bytes: usize,
    pub allowed_methods: Vec<Method>,
    pub allowed_content_types: Vec<String>,
    pub cors_allowed_origins: Vec<String>,
    pub request_timeout: Duration,
    pub trusted_proxies: TrustedProxies,
}

/// Shared state for the admission gatekeepers
pub struct AdmissionState {
    pub settings: AdmissionSettings,
    pub rate_limiter: Arc<ClientRateLimiter>,
    pub metrics: Arc<Metrics>,
}

impl AdmissionState {
    /// Count the rejection and convert it to the HTTP error
    fn reject(&self, err: AdmissionError) -> ApiError {
        debug!(gate = err.gate(), status = err.status_code(), "Request rejected by admission gate");
        self.metrics.record_rejection(err.gate());
        ApiError::from(err)
    }
}

/// Cancellation signal for the current request, fired when the gateway timeout expires
#[derive(Debug, Clone)]
pub struct RequestCancellation(pub CancellationToken);

impl RequestCancellation {
    pub fn token(&self) -> &CancellationToken {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestCancellation
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestCancellation>()
            .cloned()
            .unwrap_or_else(|| RequestCancellation(CancellationToken::new())))
    }
}

/// Gate 1: CORS headers (response side, never rejects)
pub fn cors_layer(allowed_origins: &[String], allowed_methods: &[Method]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let allow_origin = if origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(allowed_methods.to_vec())
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Gate 2: static service switch
pub async fn service_switch(
    State(state): State<Arc<AdmissionState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.settings.service_available {
        return Err(state.reject(AdmissionError::ServiceUnavailable));
    }
    Ok(next.run(request).await)
}

/// Gate 3: per-client rate limiting
pub async fn rate_limit(
    State(state): State<Arc<AdmissionState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = extract_ip_address(&request, &state.settings.trusted_proxies)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    if !state.rate_limiter.check(&client) {
        warn!(client = %client, "Rate limit exceeded");
        return Err(state.reject(AdmissionError::TooManyRequests));
    }
    Ok(next.run(request).await)
}

/// Gate 4: URI length, counted in characters
pub async fn uri_length(
    State(state): State<Arc<AdmissionState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limit = state.settings.max_uri_length;
    if request.uri().to_string().chars().count() > limit {
        return Err(state.reject(AdmissionError::UriTooLong { limit }));
    }
    Ok(next.run(request).await)
}

/// Bytes the headers occupy on the wire
pub fn header_bytes(headers: &HeaderMap) -> usize {
    headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.as_bytes().len() + HEADER_OVERHEAD_BYTES)
        .sum()
}

fn declared_content_length(headers: &HeaderMap) -> usize {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

/// Gate 5: header bytes plus declared body length, before any body is read
pub async fn request_size(
    State(state): State<Arc<AdmissionState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limit = state.settings.max_request_bytes;
    let total = header_bytes(request.headers()).saturating_add(declared_content_length(request.headers()));
    if total > limit {
        return Err(state.reject(AdmissionError::PayloadTooLarge { limit }));
    }
    Ok(next.run(request).await)
}

/// Gate 6: UTF-8 validity of header values and body
///
/// The body is buffered (bounded by what remains of the size budget) and
/// handed on unchanged.
pub async fn utf8_validity(
    State(state): State<Arc<AdmissionState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if request
        .headers()
        .values()
        .any(|value| std::str::from_utf8(value.as_bytes()).is_err())
    {
        return Err(state.reject(AdmissionError::InvalidEncoding("header")));
    }

    let limit = state.settings.max_request_bytes;
    let (parts, body) = request.into_parts();
    let body_budget = limit.saturating_sub(header_bytes(&parts.headers));
    let bytes = match axum::body::to_bytes(body, body_budget).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Failed to buffer request body");
            return Err(state.reject(AdmissionError::PayloadTooLarge { limit }));
        }
    };
    if std::str::from_utf8(&bytes).is_err() {
        return Err(state.reject(AdmissionError::InvalidEncoding("body")));
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}

/// Media type without parameters, lowercased
fn media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Gate 7: Content-Type allowlist for requests carrying a body
pub async fn content_type_allowlist(
    State(state): State<Arc<AdmissionState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let has_body = request.body().size_hint().exact() != Some(0);
    if has_body {
        let content_type = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type)
            .unwrap_or_default();
        let allowed = state
            .settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&content_type));
        if !allowed {
            let shown = if content_type.is_empty() {
                "(none)".to_string()
            } else {
                content_type
            };
            return Err(state.reject(AdmissionError::UnsupportedMediaType(shown)));
        }
    }
    Ok(next.run(request).await)
}

/// Gate 8: global method allowlist
pub async fn method_allowlist(
    State(state): State<Arc<AdmissionState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.settings.allowed_methods.contains(request.method()) {
        return Err(state.reject(AdmissionError::NotImplemented(request.method().to_string())));
    }
    Ok(next.run(request).await)
}

/// Gate 10: wall-clock budget for matched routes
///
/// Whichever finishes first wins. On expiry the request's cancellation token
/// fires and the handler future is dropped, so no further awaits run.
pub async fn gateway_timeout(
    State(state): State<Arc<AdmissionState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let cancel = CancellationToken::new();
    request
        .extensions_mut()
        .insert(RequestCancellation(cancel.clone()));

    let budget = state.settings.request_timeout;
    let path = request.uri().path().to_string();

    tokio::select! {
        response = next.run(request) => response,
        _ = tokio::time::sleep(budget) => {
            cancel.cancel();
            warn!(path = %path, timeout_ms = budget.as_millis() as u64, "Request exceeded gateway timeout");
            state
                .reject(AdmissionError::GatewayTimeout { secs: budget.as_secs() })
                .into_response()
        }
    }
}

/// Gate 9: method not allowed for an existing route
pub fn method_not_allowed(state: &AdmissionState, method: &Method) -> ApiError {
    state.reject(AdmissionError::MethodNotAllowed(method.to_string()))
}

/// Unknown path
pub fn not_found(state: &AdmissionState, path: &str) -> ApiError {
    state.reject(AdmissionError::NotFound(path.to_string()))
}
