// Core domain: errors, models, credentials, tokens and input validation

pub mod credentials;
pub mod errors;
pub mod models;
pub mod tokens;
pub mod validation;
