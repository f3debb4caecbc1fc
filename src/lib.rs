// Library root for the storefront identity service

pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod directory;
pub mod infra;
pub mod state;
