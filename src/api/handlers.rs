// Request handlers for API endpoints

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::middleware::{self, RequestCancellation};
use crate::api::responses::{ApiError, HealthResponse, SessionResponse};
use crate::api::AppState;
use crate::core::errors::{ServiceError, StoreError};
use crate::core::models::{
    ConfirmRequest, ConfirmedAccount, Identity, LoginRequest, LoginSession, Role, SignupRequest,
};

/// Per-store budget for health pings
const HEALTH_PING_TIMEOUT: Duration = Duration::from_secs(2);

/// JSON body extractor whose rejections use the shared error body (422)
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidJson(value)),
            Err(rejection) => {
                debug!(error = %rejection.body_text(), "Rejected request body");
                Err(ServiceError::Validation(body_error(&rejection)).into())
            }
        }
    }
}

fn body_error(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::JsonDataError(_) => "Body: missing or invalid fields".to_string(),
        JsonRejection::JsonSyntaxError(_) => "Body: malformed JSON".to_string(),
        JsonRejection::MissingJsonContentType(_) => "Body: expected a JSON request body".to_string(),
        _ => "Body: could not be read".to_string(),
    }
}

/// POST /auth/signup
pub async fn signup(
    State(app_state): State<AppState>,
    cancel: RequestCancellation,
    ValidJson(request): ValidJson<SignupRequest>,
) -> Result<StatusCode, ApiError> {
    app_state.identity.signup(request, cancel.token()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/signup-with-token
pub async fn confirm(
    State(app_state): State<AppState>,
    cancel: RequestCancellation,
    ValidJson(request): ValidJson<ConfirmRequest>,
) -> Result<(StatusCode, Json<ConfirmedAccount>), ApiError> {
    let account = app_state.identity.confirm(request, cancel.token()).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// POST /auth/login
pub async fn login(
    State(app_state): State<AppState>,
    cancel: RequestCancellation,
    ValidJson(request): ValidJson<LoginRequest>,
) -> Result<(StatusCode, Json<LoginSession>), ApiError> {
    let session = app_state
        .identity
        .login(request, Role::User, cancel.token())
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// POST /auth/admin/login
pub async fn admin_login(
    State(app_state): State<AppState>,
    cancel: RequestCancellation,
    ValidJson(request): ValidJson<LoginRequest>,
) -> Result<(StatusCode, Json<LoginSession>), ApiError> {
    let session = app_state
        .identity
        .login(request, Role::Admin, cancel.token())
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// POST /auth/logout (authenticated)
pub async fn logout(
    State(app_state): State<AppState>,
    cancel: RequestCancellation,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    app_state.identity.logout(&identity, cancel.token()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /auth/session (authenticated)
pub async fn session(Extension(identity): Extension<Identity>) -> Json<SessionResponse> {
    Json(SessionResponse {
        uuid: identity.account_id,
        role: identity.role,
        issued_at: identity.claims.iat,
        expires_at: identity.claims.exp,
    })
}

/// GET /health
///
/// Pings every store with a short timeout. Any failure reports `degraded`
/// with 503 so load balancers stop routing here.
pub async fn health(State(app_state): State<AppState>) -> Response {
    let identity = &app_state.identity;
    let (revocation_store, pending_store, account_directory) = tokio::join!(
        ping_status("revocation_store", identity.revocations().ping()),
        ping_status("pending_store", identity.pending().ping()),
        ping_status("account_directory", identity.accounts().ping()),
    );

    let healthy = [&revocation_store, &pending_store, &account_directory]
        .iter()
        .all(|status| status.as_str() == "connected");
    let (status, label) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: label.to_string(),
        revocation_store,
        pending_store,
        account_directory,
    };
    (status, Json(body)).into_response()
}

async fn ping_status<F>(component: &str, ping: F) -> String
where
    F: Future<Output = Result<(), StoreError>>,
{
    match tokio::time::timeout(HEALTH_PING_TIMEOUT, ping).await {
        Ok(Ok(())) => "connected".to_string(),
        Ok(Err(e)) => {
            warn!(component, error = %e, "Health ping failed");
            "unavailable".to_string()
        }
        Err(_) => {
            warn!(component, "Health ping timed out");
            "timeout".to_string()
        }
    }
}

/// GET /metrics
pub async fn metrics(State(app_state): State<AppState>) -> Result<String, ApiError> {
    Ok(app_state.metrics.render()?)
}

/// Fallback for a known path hit with a method it does not serve
pub async fn method_not_allowed(State(app_state): State<AppState>, method: Method) -> ApiError {
    middleware::method_not_allowed(&app_state.admission, &method)
}

/// Fallback for unknown paths
pub async fn not_found(State(app_state): State<AppState>, uri: Uri) -> ApiError {
    middleware::not_found(&app_state.admission, uri.path())
}
