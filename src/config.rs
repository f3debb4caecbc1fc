// Configuration management

use axum::http::Method;
use secrecy::{ExposeSecret, SecretString};
use std::env;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::api::middleware::AdmissionSettings;
use crate::auth::auth_middleware::TrustedProxies;
use crate::auth::lifecycle::IdentitySettings;
use crate::core::credentials::KdfParams;
use crate::core::errors::ServiceError;

/// Minimum HS256 secret length in bytes
const MIN_TOKEN_SECRET_BYTES: usize = 32;

/// Application configuration loaded from environment variables
///
/// Optional backends fall back to in-process implementations when unset.
/// All configuration is validated on load with clear error messages.
#[derive(Debug, Clone)]
pub struct Config {
    // Server configuration
    pub bind_address: String,
    pub port: u16,

    // Backends (optional)
    pub redis_url: Option<String>,
    pub database_url: Option<String>,

    // Tokens
    pub token_secret: SecretString,
    pub token_lifetime_secs: u64,
    pub pending_registration_ttl_secs: u64,

    // Password KDF
    pub kdf_iterations: u32,
    pub kdf_memory_kib: u32,
    pub kdf_parallelism: u32,
    pub kdf_output_len: usize,

    // Admission pipeline
    pub rate_limit_per_minute: u32,
    pub rate_limit_burst: u32,
    pub max_uri_length: usize,
    pub max_request_bytes: usize,
    pub request_timeout_secs: u64,
    pub service_available: bool,
    pub allowed_methods: Vec<Method>,
    pub allowed_content_types: Vec<String>,
    pub cors_allowed_origins: Vec<String>,
    pub trusted_proxies: Vec<IpAddr>,

    // Signup
    pub confirmation_url_base: Url,
    pub mail_api_url: Option<Url>,
    pub mail_api_key: Option<SecretString>,
    pub mail_sender: Option<String>,
    pub domain_check_enabled: bool,

    // Account directory
    pub account_state_cache_secs: u64,

    // Initial administrator, created at startup when all three are set
    pub bootstrap_admin_nickname: Option<String>,
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_password: Option<SecretString>,

    // Logging configuration
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Supports `.env` file loading in development (via dotenv crate).
    pub fn from_env() -> Result<Self, ServiceError> {
        #[cfg(not(test))]
        {
            dotenv::dotenv().ok(); // file may not exist
        }

        let config = Self {
            bind_address: Self::get_env_or_default("BIND_ADDRESS", "0.0.0.0"),
            port: Self::parse_port()?,
            redis_url: Self::get_optional_env("REDIS_URL"),
            database_url: Self::get_optional_env("DATABASE_URL"),
            token_secret: Self::get_required_secret("TOKEN_SECRET")?,
            token_lifetime_secs: Self::parse_or_default("TOKEN_LIFETIME_SECS", 21 * 24 * 60 * 60)?,
            pending_registration_ttl_secs: Self::parse_or_default("PENDING_REGISTRATION_TTL_SECS", 600)?,
            kdf_iterations: Self::parse_or_default("KDF_ITERATIONS", 3)?,
            kdf_memory_kib: Self::parse_or_default("KDF_MEMORY_KIB", 64 * 1024)?,
            kdf_parallelism: Self::parse_or_default("KDF_PARALLELISM", 2)?,
            kdf_output_len: Self::parse_or_default("KDF_OUTPUT_LEN", 32)?,
            rate_limit_per_minute: Self::parse_or_default("RATE_LIMIT_PER_MINUTE", 100)?,
            rate_limit_burst: Self::parse_or_default("RATE_LIMIT_BURST", 20)?,
            max_uri_length: Self::parse_or_default("MAX_URI_LENGTH", 2048)?,
            max_request_bytes: Self::parse_or_default("MAX_REQUEST_BYTES", 1024 * 1024)?,
            request_timeout_secs: Self::parse_or_default("REQUEST_TIMEOUT_SECS", 30)?,
            service_available: Self::parse_bool_or_default("SERVICE_AVAILABLE", true)?,
            allowed_methods: Self::parse_methods(&Self::get_env_or_default(
                "ALLOWED_METHODS",
                "GET,POST,OPTIONS,HEAD",
            ))?,
            allowed_content_types: Self::parse_list(&Self::get_env_or_default(
                "ALLOWED_CONTENT_TYPES",
                "application/json",
            ))
            .into_iter()
            .map(|t| t.to_ascii_lowercase())
            .collect(),
            cors_allowed_origins: Self::parse_list(&Self::get_env_or_default("CORS_ALLOWED_ORIGINS", "*")),
            trusted_proxies: Self::parse_ip_list("TRUSTED_PROXIES", &Self::get_env_or_default("TRUSTED_PROXIES", ""))?,
            confirmation_url_base: Self::parse_url(
                "CONFIRMATION_URL_BASE",
                &Self::get_env_or_default("CONFIRMATION_URL_BASE", "http://localhost:8000/auth/confirm"),
            )?,
            mail_api_url: Self::get_optional_env("MAIL_API_URL")
                .map(|url| Self::parse_url("MAIL_API_URL", &url))
                .transpose()?,
            mail_api_key: Self::get_optional_env("MAIL_API_KEY").map(SecretString::new),
            mail_sender: Self::get_optional_env("MAIL_SENDER"),
            domain_check_enabled: Self::parse_bool_or_default("DOMAIN_CHECK_ENABLED", true)?,
            account_state_cache_secs: Self::parse_or_default("ACCOUNT_STATE_CACHE_SECS", 30)?,
            bootstrap_admin_nickname: Self::get_optional_env("BOOTSTRAP_ADMIN_NICKNAME"),
            bootstrap_admin_email: Self::get_optional_env("BOOTSTRAP_ADMIN_EMAIL"),
            bootstrap_admin_password: Self::get_optional_env("BOOTSTRAP_ADMIN_PASSWORD").map(SecretString::new),
            log_level: Self::get_env_or_default("LOG_LEVEL", "info"),
            log_format: Self::get_env_or_default("LOG_FORMAT", "json"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            iterations: self.kdf_iterations,
            memory_kib: self.kdf_memory_kib,
            parallelism: self.kdf_parallelism,
            output_len: self.kdf_output_len,
        }
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::from_secs(self.token_lifetime_secs)
    }

    pub fn admission_settings(&self) -> AdmissionSettings {
        AdmissionSettings {
            service_available: self.service_available,
            max_uri_length: self.max_uri_length,
            max_request_bytes: self.max_request_bytes,
            allowed_methods: self.allowed_methods.clone(),
            allowed_content_types: self.allowed_content_types.clone(),
            cors_allowed_origins: self.cors_allowed_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            trusted_proxies: self.trusted_proxies(),
        }
    }

    pub fn trusted_proxies(&self) -> TrustedProxies {
        TrustedProxies::new(self.trusted_proxies.clone())
    }

    pub fn identity_settings(&self) -> IdentitySettings {
        IdentitySettings {
            pending_ttl: Duration::from_secs(self.pending_registration_ttl_secs),
            confirmation_url_base: self.confirmation_url_base.clone(),
        }
    }

    /// Nickname, email and password of the administrator to provision, if configured
    pub fn bootstrap_admin(&self) -> Option<(&str, &str, &SecretString)> {
        match (
            &self.bootstrap_admin_nickname,
            &self.bootstrap_admin_email,
            &self.bootstrap_admin_password,
        ) {
            (Some(nickname), Some(email), Some(password)) => Some((nickname.as_str(), email.as_str(), password)),
            _ => None,
        }
    }

    /// Get environment variable or return default value
    fn get_env_or_default(key: &str, default: &str) -> String {
        env::var(key).unwrap_or_else(|_| default.to_string())
    }

    /// Get optional environment variable; empty counts as unset
    fn get_optional_env(key: &str) -> Option<String> {
        match env::var(key) {
            Ok(value) if !value.trim().is_empty() => Some(value),
            _ => None,
        }
    }

    fn get_required_secret(key: &str) -> Result<SecretString, ServiceError> {
        let value = env::var(key).map_err(|_| ServiceError::Configuration(format!("{} not set", key)))?;
        if value.is_empty() {
            return Err(ServiceError::Configuration(format!("{} is empty", key)));
        }
        Ok(SecretString::new(value))
    }

    /// Parse port from PORT environment variable
    fn parse_port() -> Result<u16, ServiceError> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "8000".to_string());
        let port = port_str.parse::<u16>().map_err(|e| {
            ServiceError::Configuration(format!("Invalid PORT value '{}': {}", port_str, e))
        })?;

        if port == 0 {
            return Err(ServiceError::Configuration(
                "PORT must be between 1 and 65535".to_string(),
            ));
        }

        Ok(port)
    }

    /// Parse a positive number from the environment or return default
    fn parse_or_default<T>(key: &str, default: T) -> Result<T, ServiceError>
    where
        T: FromStr + PartialEq + Default,
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(value) => {
                let parsed = value.trim().parse::<T>().map_err(|e| {
                    ServiceError::Configuration(format!("Invalid {} value '{}': {}", key, value, e))
                })?;

                if parsed == T::default() {
                    return Err(ServiceError::Configuration(format!(
                        "{} must be greater than 0",
                        key
                    )));
                }

                Ok(parsed)
            }
            _ => Ok(default),
        }
    }

    fn parse_bool_or_default(key: &str, default: bool) -> Result<bool, ServiceError> {
        match env::var(key) {
            Ok(value) => Self::parse_bool(key, &value),
            _ => Ok(default),
        }
    }

    fn parse_bool(key: &str, value: &str) -> Result<bool, ServiceError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => Err(ServiceError::Configuration(format!(
                "Invalid {} value '{}': expected true or false",
                key, other
            ))),
        }
    }

    /// Comma-separated list, trimmed, empty entries dropped
    fn parse_list(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn parse_methods(value: &str) -> Result<Vec<Method>, ServiceError> {
        Self::parse_list(value)
            .into_iter()
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|e| {
                    ServiceError::Configuration(format!("Invalid ALLOWED_METHODS entry '{}': {}", m, e))
                })
            })
            .collect()
    }

    fn parse_ip_list(key: &str, value: &str) -> Result<Vec<IpAddr>, ServiceError> {
        Self::parse_list(value)
            .into_iter()
            .map(|ip| {
                ip.parse::<IpAddr>().map_err(|e| {
                    ServiceError::Configuration(format!("Invalid {} entry '{}': {}", key, ip, e))
                })
            })
            .collect()
    }

    fn parse_url(key: &str, value: &str) -> Result<Url, ServiceError> {
        Url::parse(value)
            .map_err(|e| ServiceError::Configuration(format!("Invalid {} URL '{}': {}", key, value, e)))
    }

    /// Validate all configuration values
    fn validate(&self) -> Result<(), ServiceError> {
        if self.token_secret.expose_secret().len() < MIN_TOKEN_SECRET_BYTES {
            return Err(ServiceError::Configuration(format!(
                "TOKEN_SECRET must be at least {} bytes",
                MIN_TOKEN_SECRET_BYTES
            )));
        }

        if let Some(ref url) = self.redis_url {
            Self::parse_url("REDIS_URL", url)?;
        }
        if let Some(ref url) = self.database_url {
            Self::parse_url("DATABASE_URL", url)?;
        }

        if self.allowed_methods.is_empty() {
            return Err(ServiceError::Configuration("ALLOWED_METHODS must not be empty".to_string()));
        }

        let mail_parts = [
            self.mail_api_url.is_some(),
            self.mail_api_key.is_some(),
            self.mail_sender.is_some(),
        ];
        if mail_parts.iter().any(|set| *set) && !mail_parts.iter().all(|set| *set) {
            return Err(ServiceError::Configuration(
                "MAIL_API_URL, MAIL_API_KEY and MAIL_SENDER must be set together".to_string(),
            ));
        }

        let admin_parts = [
            self.bootstrap_admin_nickname.is_some(),
            self.bootstrap_admin_email.is_some(),
            self.bootstrap_admin_password.is_some(),
        ];
        if admin_parts.iter().any(|set| *set) && !admin_parts.iter().all(|set| *set) {
            return Err(ServiceError::Configuration(
                "BOOTSTRAP_ADMIN_NICKNAME, BOOTSTRAP_ADMIN_EMAIL and BOOTSTRAP_ADMIN_PASSWORD must be set together"
                    .to_string(),
            ));
        }

        Self::validate_log_level(&self.log_level)?;
        Self::validate_log_format(&self.log_format)?;

        Ok(())
    }

    fn validate_log_level(level: &str) -> Result<(), ServiceError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(ServiceError::Configuration(format!(
                "Invalid LOG_LEVEL '{}': must be one of {}",
                level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }

    fn validate_log_format(format: &str) -> Result<(), ServiceError> {
        if format != "json" && format != "text" {
            return Err(ServiceError::Configuration(format!(
                "Invalid LOG_FORMAT '{}': must be 'json' or 'text'",
                format
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Configuration for tests: in-memory backends, no mail provider, no DNS checks.
    ///
    /// KDF costs are kept low so tests stay fast.
    pub fn test_config() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8000,
            redis_url: None,
            database_url: None,
            token_secret: SecretString::new("test-secret-that-is-at-least-32-bytes-long".to_string()),
            token_lifetime_secs: 21 * 24 * 60 * 60,
            pending_registration_ttl_secs: 600,
            kdf_iterations: 1,
            kdf_memory_kib: 64,
            kdf_parallelism: 1,
            kdf_output_len: 32,
            rate_limit_per_minute: 10_000,
            rate_limit_burst: 1_000,
            max_uri_length: 2048,
            max_request_bytes: 1024 * 1024,
            request_timeout_secs: 30,
            service_available: true,
            allowed_methods: vec![Method::GET, Method::POST, Method::OPTIONS, Method::HEAD],
            allowed_content_types: vec!["application/json".to_string()],
            cors_allowed_origins: vec!["*".to_string()],
            trusted_proxies: Vec::new(),
            confirmation_url_base: Url::parse("http://localhost:8000/auth/confirm")
                .expect("static test URL is valid"),
            mail_api_url: None,
            mail_api_key: None,
            mail_sender: None,
            domain_check_enabled: false,
            account_state_cache_secs: 30,
            bootstrap_admin_nickname: None,
            bootstrap_admin_email: None,
            bootstrap_admin_password: None,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}
