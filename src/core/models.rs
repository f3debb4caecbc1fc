// Domain types shared by stores, the identity service and the HTTP layer

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Account role; each login route requires a specific one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Account state; only active accounts may authenticate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountState {
    Active,
    Blocked,
    Deleted,
}

impl AccountState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountState::Active => "active",
            AccountState::Blocked => "blocked",
            AccountState::Deleted => "deleted",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, AccountState::Active)
    }
}

impl FromStr for AccountState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountState::Active),
            "blocked" => Ok(AccountState::Blocked),
            "deleted" => Ok(AccountState::Deleted),
            other => Err(format!("unknown account state '{}'", other)),
        }
    }
}

/// How an account came into existence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationMethod {
    Email,
    Manual,
}

impl RegistrationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationMethod::Email => "email",
            RegistrationMethod::Manual => "manual",
        }
    }
}

impl FromStr for RegistrationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(RegistrationMethod::Email),
            "manual" => Ok(RegistrationMethod::Manual),
            other => Err(format!("unknown registration method '{}'", other)),
        }
    }
}

/// A signup awaiting email confirmation
///
/// Holds the raw password until confirmation; it is hashed only when the
/// account is actually created.
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    pub confirmation_token: String,
    pub nickname: String,
    pub email: String,
    pub password: SecretString,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

/// Fields required to insert an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub nickname: String,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
    pub role: Role,
    pub registration_method: RegistrationMethod,
}

/// A stored account as returned by the directory
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub account_id: Uuid,
    pub nickname: String,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
    pub role: Role,
    pub state: AccountState,
    pub registration_method: RegistrationMethod,
    pub created_at: DateTime<Utc>,
}

/// Login lookup key: exactly one of nickname or email
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginIdentifier {
    Nickname(String),
    Email(String),
}

impl LoginIdentifier {
    /// Field name used in user-facing messages
    pub fn kind(&self) -> &'static str {
        match self {
            LoginIdentifier::Nickname(_) => "nickname",
            LoginIdentifier::Email(_) => "email",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            LoginIdentifier::Nickname(v) | LoginIdentifier::Email(v) => v,
        }
    }
}

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl SessionClaims {
    pub fn account_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// Authenticated caller attached to request extensions by the auth gate
#[derive(Debug, Clone)]
pub struct Identity {
    pub account_id: Uuid,
    pub role: Role,
    pub claims: SessionClaims,
    pub token: SecretString,
}

/// POST /auth/signup body
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub email: String,
    pub password: SecretString,
}

/// POST /auth/signup-with-token body
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub token: String,
}

/// POST /auth/login and /auth/admin/login body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub password: SecretString,
}

/// Result of a successful confirmation
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmedAccount {
    pub token: String,
    pub uuid: Uuid,
    pub nickname: String,
    pub email: String,
}

/// Result of a successful login
#[derive(Debug, Clone, Serialize)]
pub struct LoginSession {
    pub token: String,
    pub role: Role,
    pub uuid: Uuid,
    pub nickname: String,
    pub email: String,
}
