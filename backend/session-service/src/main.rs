/// Session Service Main Entry Point
///
/// Starts the HTTP server with:
/// - PostgreSQL connection pool (migrations applied at startup)
/// - Redis connection manager (rate limiting, access token revocation)
/// - Email service (SMTP or no-op)
/// - Maintenance sweep (background task)
use anyhow::{Context, Result};
use redis_utils::RedisPool;
use session_service::{
    config::Settings,
    db::{
        self, PgOtpRepository, PgRefreshTokenRepository, PgTwoFactorRepository,
        PgUserRepository,
    },
    http::{self, AppState},
    security::{
        Blacklist, RateLimitConfig, RateLimiter, RedisCounterStore, RedisRevocationStore,
    },
    services::{
        spawn_maintenance, AuthComponents, AuthOrchestrator, EmailService, OtpConfig,
        OtpManager, RefreshTokenStore,
    },
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "session_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Session Service");

    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    // Initialize database connection pool
    let db_pool = db::create_pool(&settings.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    info!(
        "Database pool initialized with {} max connections",
        settings.database.max_connections
    );

    db::run_migrations(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    // Initialize Redis connection manager
    let redis_pool = RedisPool::connect(&settings.redis.url, settings.redis.command_timeout())
        .await
        .context("Failed to connect to Redis")?;
    let redis = redis_pool.manager();
    let redis_timeout = redis_pool.command_timeout();
    info!("Redis connection manager initialized");

    // Initialize email service
    let email_service =
        EmailService::new(&settings.email).context("Failed to initialize email service")?;
    if email_service.is_enabled() {
        info!("Email service initialized with SMTP");
    } else {
        info!("Email service running in no-op mode (SMTP not configured)");
    }

    let deadline = settings.database.statement_timeout();
    let users = Arc::new(PgUserRepository::new(db_pool.clone(), deadline));
    let two_factor = Arc::new(PgTwoFactorRepository::new(db_pool.clone(), deadline));
    let refresh_repo = Arc::new(PgRefreshTokenRepository::new(db_pool.clone(), deadline));
    let otp_repo = Arc::new(PgOtpRepository::new(db_pool.clone(), deadline));

    let tokens = Arc::new(
        crypto_core::TokenManager::new(settings.jwt.token_manager_config())
            .context("Failed to initialize token manager")?,
    );
    let refresh_tokens = Arc::new(RefreshTokenStore::new(
        refresh_repo,
        settings.jwt.refresh_token_ttl(),
    ));
    let otp = Arc::new(OtpManager::new(otp_repo, OtpConfig::from(&settings.otp)));
    let blacklist = Arc::new(Blacklist::new(Arc::new(RedisRevocationStore::new(
        redis.clone(),
        redis_timeout,
    ))));

    let counters = Arc::new(RedisCounterStore::new(redis.clone(), redis_timeout));
    let rate_limiter = Arc::new(RateLimiter::new(
        counters.clone(),
        RateLimitConfig {
            max_requests: settings.rate_limit.max_requests,
            window: Duration::from_secs(settings.rate_limit.window_secs.max(1)),
            ..RateLimitConfig::default()
        },
    ));
    let otp_send_limiter = if settings.otp.send_limit > 0 {
        Some(Arc::new(RateLimiter::new(
            counters,
            RateLimitConfig {
                max_requests: settings.otp.send_limit,
                window: Duration::from_secs(settings.otp.send_window_secs.max(1)),
                ..RateLimitConfig::default()
            },
        )))
    } else {
        info!("Per-identity code send limit disabled");
        None
    };

    let auth = Arc::new(AuthOrchestrator::new(AuthComponents {
        users,
        two_factor,
        tokens,
        refresh_tokens: refresh_tokens.clone(),
        otp: otp.clone(),
        blacklist,
        notifier: Arc::new(email_service),
        otp_send_limiter,
    }));

    // Spawn maintenance sweep (background task)
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance = spawn_maintenance(
        otp,
        refresh_tokens,
        settings.maintenance_interval(),
        shutdown_rx,
    );

    if !settings.rate_limit.trusted_proxies.is_empty() {
        info!(
            count = settings.rate_limit.trusted_proxies.len(),
            "Honoring X-Forwarded-For from trusted proxies"
        );
    }
    let state = AppState {
        auth,
        rate_limiter,
        trusted_proxies: settings.rate_limit.trusted_proxies.clone().into(),
    };
    http::serve(state, &settings.server.bind_address(), shutdown_signal())
        .await
        .context("HTTP server error")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = maintenance.await {
        error!("Maintenance task ended abnormally: {}", e);
    }

    info!("Session service shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
