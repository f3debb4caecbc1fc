// Axum web server layer

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod responses;

use crate::auth::auth_middleware::{auth_middleware, AuthState};
use crate::auth::lifecycle::IdentityService;
use metrics::Metrics;
use middleware::AdmissionState;

/// Application state shared by all handlers
///
/// Every component is behind an `Arc`, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<IdentityService>,
    pub admission: Arc<AdmissionState>,
    pub metrics: Arc<Metrics>,
}

/// Create the Axum router with all routes and the admission pipeline
///
/// Middleware stack (outermost to innermost):
/// - request id (set + propagate) and tracing
/// - CORS
/// - service switch, rate limit, URI length, request size
/// - UTF-8 validity, content-type allowlist, method allowlist
/// - per-route method check (405) and unknown path (404) fallbacks
/// - gateway timeout (matched routes only)
/// - authentication (protected routes only)
pub fn create_router(app_state: AppState, auth_state: Arc<AuthState>) -> Router {
    let admission = app_state.admission.clone();
    let settings = &admission.settings;
    let cors = middleware::cors_layer(&settings.cors_allowed_origins, &settings.allowed_methods);

    let protected = Router::new()
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/session", get(handlers::session))
        .route_layer(from_fn_with_state(auth_state, auth_middleware));

    Router::new()
        .route("/auth/signup", post(handlers::signup))
        .route("/auth/signup-with-token", post(handlers::confirm))
        .route("/auth/login", post(handlers::login))
        .route("/auth/admin/login", post(handlers::admin_login))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .merge(protected)
        .route_layer(from_fn_with_state(admission.clone(), middleware::gateway_timeout))
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .fallback(handlers::not_found)
        // Layers wrap outward: the last one added runs first
        .layer(from_fn_with_state(admission.clone(), middleware::method_allowlist))
        .layer(from_fn_with_state(admission.clone(), middleware::content_type_allowlist))
        .layer(from_fn_with_state(admission.clone(), middleware::utf8_validity))
        .layer(from_fn_with_state(admission.clone(), middleware::request_size))
        .layer(from_fn_with_state(admission.clone(), middleware::uri_length))
        .layer(from_fn_with_state(admission.clone(), middleware::rate_limit))
        .layer(from_fn_with_state(admission.clone(), middleware::service_switch))
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(app_state)
}
