/// Session Service Library
///
/// Session security for an HTTP identity service: access and refresh tokens,
/// one-time codes, rate limiting and access token revocation.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `db`: Repositories (users, refresh tokens, OTP codes, 2FA) and an in-memory store
/// - `error`: Error types
/// - `http`: axum router, handlers and middleware
/// - `models`: Data models
/// - `security`: Password hashing, rate limiting, token revocation
/// - `services`: OTP manager, refresh token store, auth orchestrator, email, maintenance
/// - `validators`: Input validation
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod security;
pub mod services;
pub mod validators;

// Re-export commonly used types
pub use error::{Result, SessionError};
pub use http::{build_router, AppState};
