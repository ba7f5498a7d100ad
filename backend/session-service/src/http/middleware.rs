use super::AppState;
use crate::error::SessionError;
use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use tracing::warn;

/// Raw bearer token of an authenticated request
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Fixed-window limit per client and matched route
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_identity(&req, &state.trusted_proxies);
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let decision = state.rate_limiter.check(&client, &route).await;
    if !decision.allowed {
        warn!(client = %client, route = %route, "Request rate limited");
        return decision.to_error().into_response();
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_at()));
    response
}

/// Require `Authorization: Bearer <jwt>`; inserts the claims and raw token
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, SessionError> {
    let token = bearer_token(req.headers()).ok_or(SessionError::InvalidToken)?;
    let claims = state.auth.authenticate(&token).await?;

    req.extensions_mut().insert(claims);
    req.extensions_mut().insert(BearerToken(token));
    Ok(next.run(req).await)
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// The connecting peer's address. Behind a trusted proxy, the right-most
/// `X-Forwarded-For` hop that is not itself a trusted proxy.
fn client_identity(req: &Request, trusted_proxies: &[IpAddr]) -> String {
    let Some(peer) = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
    else {
        return "unknown".to_string();
    };

    if !trusted_proxies.contains(&peer) {
        return peer.to_string();
    }

    let forwarded: Vec<&str> = req
        .headers()
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();

    let mut client = peer;
    for hop in forwarded.iter().rev() {
        match hop.parse::<IpAddr>() {
            Ok(ip) => {
                client = ip;
                if !trusted_proxies.contains(&ip) {
                    break;
                }
            }
            // A garbled chain is attributed to the last address we could trust
            Err(_) => break,
        }
    }
    client.to_string()
}
