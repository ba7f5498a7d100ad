use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use crypto_core::jwt::JwtError;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid or expired code")]
    InvalidCode,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
        limit: u64,
        reset_at: i64,
    },

    #[error("Not found")]
    NotFound,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Notification delivery failed: {0}")]
    Notification(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SessionError::InvalidCredentials
            | SessionError::InvalidToken
            | SessionError::InvalidCode
            | SessionError::NotFound => StatusCode::UNAUTHORIZED,
            SessionError::Validation(_) => StatusCode::BAD_REQUEST,
            SessionError::EmailAlreadyExists => StatusCode::CONFLICT,
            SessionError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            SessionError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::Notification(_) => StatusCode::BAD_GATEWAY,
            SessionError::Database(_) | SessionError::Redis(_) | SessionError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show a client
    fn public_message(&self) -> String {
        match self {
            SessionError::InvalidCredentials => "Invalid credentials".to_string(),
            // Unknown refresh tokens look exactly like bad ones
            SessionError::InvalidToken | SessionError::NotFound => "Invalid token".to_string(),
            SessionError::InvalidCode => "Invalid or expired code".to_string(),
            SessionError::Validation(msg) => format!("Validation error: {}", msg),
            SessionError::EmailAlreadyExists => "Email already exists".to_string(),
            SessionError::RateLimited { .. } => "Too many requests".to_string(),
            SessionError::StoreUnavailable(_) => "Service temporarily unavailable".to_string(),
            SessionError::Notification(_) => "Unable to deliver verification code".to_string(),
            SessionError::Database(_) | SessionError::Redis(_) | SessionError::Internal(_) => {
                // Don't leak internal details in production
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.public_message() }));
        let mut response = (status, body).into_response();

        if let SessionError::RateLimited {
            retry_after_secs,
            limit,
            reset_at,
        } = self
        {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u64));
            headers.insert("x-ratelimit-reset", HeaderValue::from(reset_at));
        }

        response
    }
}

// Conversions from external error types
impl From<sqlx::Error> for SessionError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                tracing::warn!("Database unavailable: {}", err);
                SessionError::StoreUnavailable(err.to_string())
            }
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                SessionError::EmailAlreadyExists
            }
            _ => {
                tracing::error!("Database error: {}", err);
                SessionError::Database(err.to_string())
            }
        }
    }
}

impl From<redis::RedisError> for SessionError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_timeout() || err.is_connection_dropped() {
            tracing::warn!("Redis unavailable: {}", err);
            SessionError::StoreUnavailable(err.to_string())
        } else {
            tracing::error!("Redis error: {}", err);
            SessionError::Redis(err.to_string())
        }
    }
}

impl From<JwtError> for SessionError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::InvalidToken => SessionError::InvalidToken,
            other => {
                tracing::error!("JWT error: {}", other);
                SessionError::Internal(other.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for SessionError {
    fn from(err: anyhow::Error) -> Self {
        SessionError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for SessionError {
    fn from(err: validator::ValidationErrors) -> Self {
        SessionError::Validation(err.to_string())
    }
}
