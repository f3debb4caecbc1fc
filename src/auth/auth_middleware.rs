// Axum authentication middleware

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::error;

use crate::api::responses::ApiError;
use crate::auth::audit_logger::{AuditContext, AuditLogger, IdentityEvent};
use crate::auth::lifecycle::IdentityService;
use crate::auth::token_fingerprint::BearerToken;
use crate::core::errors::ServiceError;
use crate::core::models::Identity;

/// Authentication state containing all dependencies
#[derive(Clone)]
pub struct AuthState {
    pub identity: Arc<IdentityService>,
    pub audit_logger: Arc<AuditLogger>,
    pub trusted_proxies: TrustedProxies,
}

/// Route-scoped authentication gate
///
/// Extracts the bearer token, resolves it through `IdentityService::authenticate`
/// and attaches the resulting `Identity` to request extensions.
pub async fn auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())
        .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?;

    let identity = match auth_state.identity.authenticate(token.expose_secret()).await {
        Ok(identity) => identity,
        Err(e) => {
            auth_state.audit_logger.log_event(
                IdentityEvent::AuthRejected { reason: e.user_message() },
                AuditContext {
                    account_id: None,
                    token: Some(token.fingerprint()),
                    ip_address: extract_ip_address(&request, &auth_state.trusted_proxies).map(|ip| ip.to_string()),
                },
            );
            return Err(e.into());
        }
    };

    attach_identity(&mut request, identity)?;
    Ok(next.run(request).await)
}

/// Insert the identity into request extensions; a second attach is a wiring bug
pub fn attach_identity(request: &mut Request, identity: Identity) -> Result<(), ServiceError> {
    if let Some(existing) = request.extensions().get::<Identity>() {
        error!(
            existing = %existing.account_id,
            incoming = %identity.account_id,
            "Identity already attached to request"
        );
        return Err(ServiceError::Internal("identity attached twice".to_string()));
    }
    request.extensions_mut().insert(identity);
    Ok(())
}

/// Extract the token from `Authorization: Bearer <token>`
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<BearerToken> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(BearerToken::new(token))
}

/// Peers whose forwarding headers are believed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies(Vec<IpAddr>);

impl TrustedProxies {
    pub fn new(proxies: Vec<IpAddr>) -> Self {
        Self(proxies)
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.contains(ip)
    }
}

/// Client address for rate limiting and audit records
///
/// The peer address is authoritative. Forwarding headers are read only when
/// the peer is a trusted proxy: the rightmost `X-Forwarded-For` hop not
/// added by a trusted proxy wins, then `X-Real-IP`, then the peer itself.
/// Returns `None` when the server was started without connect info.
pub fn extract_ip_address(request: &Request, trusted: &TrustedProxies) -> Option<IpAddr> {
    let ConnectInfo(peer) = request.extensions().get::<ConnectInfo<SocketAddr>>()?;
    let peer = peer.ip();
    if !trusted.contains(&peer) {
        return Some(peer);
    }

    let headers = request.headers();
    let forwarded: Vec<IpAddr> = headers
        .get_all("X-Forwarded-For")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|hop| hop.trim().parse().ok())
        .collect();
    if let Some(client) = forwarded.into_iter().rev().find(|hop| !trusted.contains(hop)) {
        return Some(client);
    }

    let real_ip = headers
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok());
    Some(real_ip.unwrap_or(peer))
}
