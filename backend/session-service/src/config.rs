//! Configuration management for the session service
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! Every component receives its slice of `Settings` through its constructor;
//! nothing reads the environment after startup.
//!
//! # Example
//!
//! ```no_run
//! use session_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("JWT issuer: {}", settings.jwt.issuer);
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
    pub otp: OtpSettings,
    pub rate_limit: RateLimitSettings,
    pub email: EmailSettings,
    pub server: ServerSettings,
    pub maintenance_interval_secs: u64,
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Load .env file in development
        if cfg!(debug_assertions) && dotenvy::dotenv().is_ok() {
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            database: DatabaseSettings::from_env()?,
            redis: RedisSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            otp: OtpSettings::from_env()?,
            rate_limit: RateLimitSettings::from_env()?,
            email: EmailSettings::from_env()?,
            server: ServerSettings::from_env()?,
            maintenance_interval_secs: env_or("MAINTENANCE_INTERVAL_SECS", 300)?,
        })
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs.max(1))
    }
}

/// Read `name`, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

/// Database connection settings
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Seconds to wait for a pooled connection
    pub acquire_timeout: u64,
    /// Per-statement deadline in milliseconds
    pub statement_timeout_ms: u64,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 20)?,
            min_connections: env_or("DATABASE_MIN_CONNECTIONS", 2)?,
            acquire_timeout: env_or("DATABASE_ACQUIRE_TIMEOUT", 5)?,
            statement_timeout_ms: env_or("DATABASE_STATEMENT_TIMEOUT_MS", 2_000)?,
        })
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }
}

/// Redis settings
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub command_timeout_ms: u64,
}

impl RedisSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL").context("REDIS_URL must be set")?,
            command_timeout_ms: env_or("REDIS_COMMAND_TIMEOUT_MS", 100)?,
        })
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Token signing and lifetimes
#[derive(Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .finish()
    }
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        let secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if secret.len() < crypto_core::jwt::MIN_SECRET_BYTES {
            anyhow::bail!(
                "JWT_SECRET must be at least {} bytes",
                crypto_core::jwt::MIN_SECRET_BYTES
            );
        }

        Ok(Self {
            secret,
            issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "session-service".to_string()),
            access_token_ttl_secs: env_or("ACCESS_TOKEN_TTL_SECS", 3_600)?,
            refresh_token_ttl_secs: env_or("REFRESH_TOKEN_TTL_SECS", 30 * 24 * 3_600)?,
        })
    }

    pub fn token_manager_config(&self) -> crypto_core::TokenManagerConfig {
        crypto_core::TokenManagerConfig {
            secret: self.secret.clone(),
            issuer: self.issuer.clone(),
            access_ttl: Duration::from_secs(self.access_token_ttl_secs),
        }
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl_secs)
    }
}

/// One-time code settings
#[derive(Debug, Clone)]
pub struct OtpSettings {
    pub length: usize,
    pub ttl_secs: u64,
    pub single_active: bool,
    /// Codes sent per identity and purpose per window; 0 disables the limit
    pub send_limit: u64,
    pub send_window_secs: u64,
}

impl OtpSettings {
    fn from_env() -> Result<Self> {
        let length: usize = env_or("OTP_LENGTH", 6)?;
        if !(4..=10).contains(&length) {
            anyhow::bail!("OTP_LENGTH must be between 4 and 10, got {}", length);
        }

        Ok(Self {
            length,
            ttl_secs: env_or("OTP_TTL_SECS", 600)?,
            single_active: env_or("OTP_SINGLE_ACTIVE", true)?,
            send_limit: env_or("OTP_SEND_LIMIT", 5)?,
            send_window_secs: env_or("OTP_SEND_WINDOW_SECS", 3_600)?,
        })
    }
}

/// Per-client request limiting
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub max_requests: u64,
    pub window_secs: u64,
    /// Peers whose `X-Forwarded-For` is believed; empty means the header is ignored
    pub trusted_proxies: Vec<IpAddr>,
}

impl RateLimitSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            max_requests: env_or("RATE_LIMIT_MAX_REQUESTS", 100)?,
            window_secs: env_or("RATE_LIMIT_WINDOW_SECS", 60)?,
            trusted_proxies: parse_ip_list(
                &env::var("RATE_LIMIT_TRUSTED_PROXIES").unwrap_or_default(),
            )
            .context("Invalid RATE_LIMIT_TRUSTED_PROXIES")?,
        })
    }
}

/// Comma-separated IP addresses; blanks are skipped
fn parse_ip_list(raw: &str) -> Result<Vec<IpAddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpAddr>()
                .with_context(|| format!("not an IP address: {}", s))
        })
        .collect()
}

/// Email service configuration
#[derive(Clone)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    pub use_starttls: bool,
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &self.smtp_password.as_ref().map(|_| "[REDACTED]"))
            .field("smtp_from", &self.smtp_from)
            .field("use_starttls", &self.use_starttls)
            .finish()
    }
}

impl EmailSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            // Empty host puts the email service in no-op mode
            smtp_host: env::var("SMTP_HOST").unwrap_or_default(),
            smtp_port: env_or("SMTP_PORT", 587)?,
            smtp_username: env::var("SMTP_USERNAME").ok().filter(|v| !v.is_empty()),
            smtp_password: env::var("SMTP_PASSWORD").ok().filter(|v| !v.is_empty()),
            smtp_from: env::var("SMTP_FROM")
                .unwrap_or_else(|_| "no-reply@localhost".to_string()),
            use_starttls: env_or("SMTP_USE_STARTTLS", true)?,
        })
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("SERVER_PORT", 8080)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
