// Input normalization and structural validation for identity requests

use crate::core::errors::ServiceError;

pub const NICKNAME_MIN_LEN: usize = 3;
pub const NICKNAME_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 6;
pub const PASSWORD_MAX_LEN: usize = 64;
pub const EMAIL_MAX_LEN: usize = 254;
pub const CONFIRMATION_TOKEN_LEN: usize = 64;

pub fn normalize_nickname(nickname: &str) -> String {
    nickname.trim().to_string()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Nicknames: 3-32 chars of `[A-Za-z0-9_.-]`, starting with a letter or digit
pub fn validate_nickname(nickname: &str) -> Result<(), ServiceError> {
    let len = nickname.chars().count();
    if !(NICKNAME_MIN_LEN..=NICKNAME_MAX_LEN).contains(&len) {
        return Err(invalid(format!(
            "Nickname: must be between {} and {} characters",
            NICKNAME_MIN_LEN, NICKNAME_MAX_LEN
        )));
    }
    if !nickname.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(invalid("Nickname: must start with a letter or digit"));
    }
    if !nickname
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(invalid(
            "Nickname: may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ServiceError> {
    if email.is_empty() {
        return Err(invalid("Email: must not be empty"));
    }
    if email.chars().count() > EMAIL_MAX_LEN {
        return Err(invalid(format!(
            "Email: must be at most {} characters",
            EMAIL_MAX_LEN
        )));
    }

    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => return Err(invalid("Email: must contain '@'")),
    };
    if local.is_empty() || local.len() > 64 || local.chars().any(|c| c.is_whitespace() || c == '@') {
        return Err(invalid("Email: invalid local part"));
    }
    if !is_valid_domain(domain) {
        return Err(invalid("Email: invalid domain"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ServiceError> {
    if password.chars().any(char::is_whitespace) {
        return Err(invalid("Password: must not contain spaces"));
    }
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(invalid(format!(
            "Password: must be between {} and {} characters",
            PASSWORD_MIN_LEN, PASSWORD_MAX_LEN
        )));
    }
    Ok(())
}

/// Confirmation tokens are 32 random bytes, hex encoded
pub fn validate_confirmation_token(token: &str) -> Result<(), ServiceError> {
    if token.len() != CONFIRMATION_TOKEN_LEN || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid(format!(
            "Token: must be a {}-character hex string",
            CONFIRMATION_TOKEN_LEN
        )));
    }
    Ok(())
}

/// Domain part of an already-validated email address
pub fn email_domain(email: &str) -> &str {
    email.rsplit_once('@').map(|(_, domain)| domain).unwrap_or("")
}

fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 || !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

fn invalid(message: impl Into<String>) -> ServiceError {
    ServiceError::Validation(message.into())
}
