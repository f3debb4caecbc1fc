// Authentication: identity lifecycle, bearer-token gate and audit trail

pub mod audit_logger;
pub mod auth_middleware;
pub mod lifecycle;
pub mod token_fingerprint;
