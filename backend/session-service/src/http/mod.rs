/// HTTP surface of the session service
///
/// All routes live under `/api/v1`. The rate limiter wraps every route;
/// protected routes additionally require a valid, unrevoked bearer token.
pub mod handlers;
pub mod middleware;

use crate::security::RateLimiter;
use crate::services::AuthOrchestrator;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::net::IpAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared HTTP server state
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthOrchestrator>,
    pub rate_limiter: Arc<RateLimiter>,
    /// Proxies allowed to name the client in `X-Forwarded-For`
    pub trusted_proxies: Arc<[IpAddr]>,
}

/// Build the router with every public and protected endpoint
pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/forgot-password", post(handlers::forgot_password))
        .route("/auth/reset-password", post(handlers::reset_password))
        .route("/auth/2fa/verify", post(handlers::verify_two_factor))
        .route("/auth/2fa/send", post(handlers::send_two_factor_code))
        .route("/auth/verify-email", post(handlers::verify_email));

    let protected = Router::new()
        .route("/auth/logout-all", post(handlers::logout_all))
        .route("/auth/revoke", post(handlers::revoke))
        .route("/2fa/enable", post(handlers::enable_two_factor))
        .route("/2fa/disable", post(handlers::disable_two_factor))
        .route(
            "/user/verify-email/send",
            post(handlers::send_email_verification),
        )
        .route("/user/me", get(handlers::me))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let api_v1 = public
        .merge(protected)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ));

    Router::new()
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    state: AppState,
    bind_address: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;

    info!("Session service listening on {}", bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}
