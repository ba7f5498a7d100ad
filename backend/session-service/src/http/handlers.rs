/// Request handlers for `/api/v1`
///
/// Handlers validate the request shape and delegate to `AuthOrchestrator`;
/// every failure is a `SessionError` rendered by its `IntoResponse`.
use super::middleware::{bearer_token, BearerToken};
use super::AppState;
use crate::error::Result;
use crate::models::UserProfile;
use crate::services::{LoginOutcome, NewAccount, TokenPair};
use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use crypto_core::AccessTokenClaims;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EmailRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CodeRequest {
    #[validate(length(min = 1, max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 16))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 16))]
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct CodeSentResponse {
    pub message: &'static str,
    /// Code lifetime in seconds
    pub expires_in: u64,
}

pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "session-service" }))
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<NewAccount>,
) -> Result<(StatusCode, Json<UserProfile>)> {
    let profile = state.auth.register(body).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// POST /auth/login
///
/// 200 with a token pair, or 202 when a second factor is required.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response> {
    body.validate()?;

    match state.auth.login(&body.email, &body.password).await? {
        LoginOutcome::Authenticated(pair) => Ok(Json(pair).into_response()),
        LoginOutcome::TwoFactorRequired { expires_in } => Ok((
            StatusCode::ACCEPTED,
            Json(json!({
                "two_factor_required": true,
                "expires_in": expires_in,
            })),
        )
            .into_response()),
    }
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<Json<TokenPair>> {
    body.validate()?;
    Ok(Json(state.auth.refresh(&body.refresh_token).await?))
}

/// POST /auth/logout
///
/// A bearer token, when present, is revoked along with the refresh token.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<StatusCode> {
    body.validate()?;
    let access_token = bearer_token(&headers);
    state
        .auth
        .logout(&body.refresh_token, access_token.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/forgot-password
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    body.validate()?;
    state.auth.request_password_reset(&body.email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "If the account exists, a reset code has been sent"
        })),
    ))
}

/// POST /auth/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<StatusCode> {
    body.validate()?;
    state
        .auth
        .reset_password(&body.email, &body.code, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/2fa/verify
pub async fn verify_two_factor(
    State(state): State<AppState>,
    Json(body): Json<CodeRequest>,
) -> Result<Json<TokenPair>> {
    body.validate()?;
    Ok(Json(
        state.auth.verify_two_factor(&body.email, &body.code).await?,
    ))
}

/// POST /auth/2fa/send
pub async fn send_two_factor_code(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<(StatusCode, Json<CodeSentResponse>)> {
    body.validate()?;
    let expires_in = state.auth.send_two_factor_code(&body.email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CodeSentResponse {
            message: "If two-factor sign-in is enabled, a code has been sent",
            expires_in,
        }),
    ))
}

/// POST /auth/verify-email
pub async fn verify_email(
    State(state): State<AppState>,
    Json(body): Json<CodeRequest>,
) -> Result<Json<UserProfile>> {
    body.validate()?;
    Ok(Json(state.auth.confirm_email(&body.email, &body.code).await?))
}

// ----------------------------------------------------------------------
// Protected
// ----------------------------------------------------------------------

/// POST /auth/logout-all
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessTokenClaims>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<Json<serde_json::Value>> {
    let revoked = state
        .auth
        .logout_all(claims.subject_id()?, Some(&token))
        .await?;
    Ok(Json(json!({ "revoked_sessions": revoked })))
}

/// POST /auth/revoke: revoke the presented access token
pub async fn revoke(
    State(state): State<AppState>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<StatusCode> {
    state.auth.revoke_access_token(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /2fa/enable
pub async fn enable_two_factor(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessTokenClaims>,
) -> Result<Json<serde_json::Value>> {
    state.auth.enable_two_factor(claims.subject_id()?).await?;
    Ok(Json(json!({ "enabled": true })))
}

/// POST /2fa/disable
pub async fn disable_two_factor(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessTokenClaims>,
) -> Result<Json<serde_json::Value>> {
    state.auth.disable_two_factor(claims.subject_id()?).await?;
    Ok(Json(json!({ "enabled": false })))
}

/// POST /user/verify-email/send
pub async fn send_email_verification(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessTokenClaims>,
) -> Result<(StatusCode, Json<CodeSentResponse>)> {
    let expires_in = state
        .auth
        .send_email_verification(claims.subject_id()?)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CodeSentResponse {
            message: "Verification code sent",
            expires_in,
        }),
    ))
}

/// GET /user/me
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessTokenClaims>,
) -> Result<Json<UserProfile>> {
    Ok(Json(state.auth.current_user(claims.subject_id()?).await?))
}
