/// Authentication flows
///
/// `AuthOrchestrator` composes the token manager, refresh token store, OTP
/// manager, blacklist and the user/2FA repositories into the operations the
/// HTTP layer exposes. It holds no per-request state and is shared via `Arc`.
///
/// Security properties:
/// - Unknown email and wrong password produce the same `InvalidCredentials`
/// - Password reset for an unknown email succeeds silently
/// - Code delivery failures abort the flow; welcome and confirmation mails do not
use crate::db::{TwoFactorRepository, UserRepository};
use crate::error::{Result, SessionError};
use crate::models::{NewUser, OtpIdentity, OtpPurpose, User, UserProfile};
use crate::security::password::{
    hash_password, validate_password_strength, verify_against_dummy, verify_password,
};
use crate::security::{Blacklist, RateLimiter};
use crate::services::email::{Notice, NotificationSender};
use crate::services::otp::OtpManager;
use crate::services::refresh_tokens::RefreshTokenStore;
use crate::validators::{
    mask_email, normalize_email, validate_email, validate_refresh_token_format,
};
use crypto_core::{AccessTokenClaims, TokenManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Registration input
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewAccount {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub last_name: String,
}

/// An identity already proven by an external provider (e.g. an OAuth exchange)
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    pub user: UserProfile,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(TokenPair),
    /// A code was sent; finish with `verify_two_factor`
    TwoFactorRequired { expires_in: u64 },
}

/// Everything the orchestrator is built from
pub struct AuthComponents {
    pub users: Arc<dyn UserRepository>,
    pub two_factor: Arc<dyn TwoFactorRepository>,
    pub tokens: Arc<TokenManager>,
    pub refresh_tokens: Arc<RefreshTokenStore>,
    pub otp: Arc<OtpManager>,
    pub blacklist: Arc<Blacklist>,
    pub notifier: Arc<dyn NotificationSender>,
    /// Per-identity code send limit; `None` disables it
    pub otp_send_limiter: Option<Arc<RateLimiter>>,
}

pub struct AuthOrchestrator {
    users: Arc<dyn UserRepository>,
    two_factor: Arc<dyn TwoFactorRepository>,
    tokens: Arc<TokenManager>,
    refresh_tokens: Arc<RefreshTokenStore>,
    otp: Arc<OtpManager>,
    blacklist: Arc<Blacklist>,
    notifier: Arc<dyn NotificationSender>,
    otp_send_limiter: Option<Arc<RateLimiter>>,
}

impl AuthOrchestrator {
    pub fn new(components: AuthComponents) -> Self {
        Self {
            users: components.users,
            two_factor: components.two_factor,
            tokens: components.tokens,
            refresh_tokens: components.refresh_tokens,
            otp: components.otp,
            blacklist: components.blacklist,
            notifier: components.notifier,
            otp_send_limiter: components.otp_send_limiter,
        }
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    pub async fn register(&self, account: NewAccount) -> Result<UserProfile> {
        account.validate()?;
        let password_hash = hash_password(&account.password)?;
        let email = normalize_email(&account.email);

        let user = self
            .users
            .create(NewUser {
                email: email.clone(),
                password_hash: Some(password_hash),
                first_name: account.first_name.trim().to_string(),
                last_name: account.last_name.trim().to_string(),
                email_verified: false,
            })
            .await?;

        info!(user_id = %user.id, email = %mask_email(&email), "User registered");

        if let Err(e) = self.notifier.send_notice(&user.email, Notice::Welcome).await {
            warn!(user_id = %user.id, error = %e, "Welcome notice not delivered");
        }

        Ok(UserProfile::from(&user))
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<UserProfile> {
        let user = self.active_user(user_id).await?;
        Ok(UserProfile::from(&user))
    }

    // ------------------------------------------------------------------
    // Login
    // ------------------------------------------------------------------

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let email = normalize_email(email);
        let user = match self.users.find_by_email(&email).await? {
            Some(user) if user.is_active => user,
            _ => {
                verify_against_dummy(password);
                warn!(email = %mask_email(&email), "Login failed: unknown or inactive account");
                return Err(SessionError::InvalidCredentials);
            }
        };

        let password_ok = match user.password_hash.as_deref() {
            Some(hash) => verify_password(password, hash)?,
            None => verify_against_dummy(password),
        };
        if !password_ok {
            warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(SessionError::InvalidCredentials);
        }

        if self.two_factor_enabled(user.id).await? {
            let expires_in = self.send_code(&user, OtpPurpose::TwoFactor).await?;
            info!(user_id = %user.id, "Login awaiting second factor");
            return Ok(LoginOutcome::TwoFactorRequired { expires_in });
        }

        let pair = self.issue_tokens(&user).await?;
        info!(user_id = %user.id, "User logged in");
        Ok(LoginOutcome::Authenticated(pair))
    }

    /// Sign in (provisioning if needed) a user whose email an external provider vouched for
    pub async fn login_with_verified_identity(
        &self,
        identity: VerifiedIdentity,
    ) -> Result<TokenPair> {
        let email = normalize_email(&identity.email);
        if !validate_email(&email) {
            return Err(SessionError::Validation("Invalid email address".to_string()));
        }

        let user = match self.users.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                let created = self
                    .users
                    .create(NewUser {
                        email: email.clone(),
                        password_hash: None,
                        first_name: identity.first_name,
                        last_name: identity.last_name,
                        email_verified: true,
                    })
                    .await;
                match created {
                    Ok(user) => {
                        info!(user_id = %user.id, "User provisioned from verified identity");
                        user
                    }
                    // Lost a race with a concurrent provisioning of the same email
                    Err(SessionError::EmailAlreadyExists) => self
                        .users
                        .find_by_email(&email)
                        .await?
                        .ok_or(SessionError::InvalidCredentials)?,
                    Err(e) => return Err(e),
                }
            }
        };

        if !user.is_active {
            return Err(SessionError::InvalidCredentials);
        }
        self.issue_tokens(&user).await
    }

    // ------------------------------------------------------------------
    // Two-factor
    // ------------------------------------------------------------------

    pub async fn verify_two_factor(&self, email: &str, code: &str) -> Result<TokenPair> {
        let email = normalize_email(email);
        if !self.otp.verify_otp(&email, code, OtpPurpose::TwoFactor).await? {
            warn!(email = %mask_email(&email), "Second factor rejected");
            return Err(SessionError::InvalidCode);
        }

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .filter(|u| u.is_active)
            .ok_or(SessionError::InvalidCode)?;

        let pair = self.issue_tokens(&user).await?;
        info!(user_id = %user.id, "User logged in with second factor");
        Ok(pair)
    }

    /// Resend a sign-in code. Silent for accounts without 2FA.
    pub async fn send_two_factor_code(&self, email: &str) -> Result<u64> {
        let email = normalize_email(email);
        self.check_send_limit(OtpPurpose::TwoFactor, &email).await?;

        if let Some(user) = self.users.find_by_email(&email).await? {
            if user.is_active && self.two_factor_enabled(user.id).await? {
                self.deliver_code(&user, OtpPurpose::TwoFactor).await?;
            }
        }
        Ok(self.otp.ttl().as_secs())
    }

    pub async fn enable_two_factor(&self, user_id: Uuid) -> Result<()> {
        self.active_user(user_id).await?;
        self.two_factor.set_enabled(user_id, true).await?;
        info!(user_id = %user_id, "Two-factor enabled");
        Ok(())
    }

    pub async fn disable_two_factor(&self, user_id: Uuid) -> Result<()> {
        self.active_user(user_id).await?;
        self.two_factor.set_enabled(user_id, false).await?;
        info!(user_id = %user_id, "Two-factor disabled");
        Ok(())
    }

    pub async fn two_factor_enabled(&self, user_id: Uuid) -> Result<bool> {
        Ok(self
            .two_factor
            .get(user_id)
            .await?
            .map(|c| c.enabled)
            .unwrap_or(false))
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Exchange a refresh token for a new pair. The presented token is consumed.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        if !validate_refresh_token_format(refresh_token) {
            return Err(SessionError::Validation(
                "Malformed refresh token".to_string(),
            ));
        }

        let (user_id, successor) = match self.refresh_tokens.rotate(refresh_token).await {
            Ok(rotated) => rotated,
            Err(SessionError::NotFound) => return Err(SessionError::InvalidToken),
            Err(e) => return Err(e),
        };

        let user = match self.users.find_by_id(user_id).await? {
            Some(user) if user.is_active => user,
            _ => {
                self.refresh_tokens
                    .delete_refresh_token(&successor.value)
                    .await?;
                return Err(SessionError::InvalidToken);
            }
        };

        let access_token =
            self.tokens
                .generate_token(user.id, &user.email, &user.first_name, &user.last_name)?;

        Ok(TokenPair {
            access_token,
            refresh_token: successor.value,
            token_type: "Bearer",
            expires_in: self.tokens.access_ttl().as_secs(),
            user: UserProfile::from(&user),
        })
    }

    /// End one session. Idempotent: an unknown refresh token is not an error.
    pub async fn logout(&self, refresh_token: &str, access_token: Option<&str>) -> Result<()> {
        if !validate_refresh_token_format(refresh_token) {
            return Err(SessionError::Validation(
                "Malformed refresh token".to_string(),
            ));
        }

        if !self.refresh_tokens.delete_refresh_token(refresh_token).await? {
            debug!("Logout with unknown refresh token treated as success");
        }

        if let Some(token) = access_token {
            self.revoke_if_valid(token).await?;
        }
        Ok(())
    }

    /// End every session of `user_id`
    pub async fn logout_all(&self, user_id: Uuid, access_token: Option<&str>) -> Result<u64> {
        let deleted = self.refresh_tokens.delete_all_for_user(user_id).await?;
        if let Some(token) = access_token {
            self.revoke_if_valid(token).await?;
        }
        Ok(deleted)
    }

    /// Blacklist an access token until its natural expiry
    pub async fn revoke_access_token(&self, token: &str) -> Result<()> {
        let claims = self.tokens.verify_token(token)?;
        self.blacklist.add_until(token, claims.exp).await
    }

    async fn revoke_if_valid(&self, token: &str) -> Result<()> {
        match self.revoke_access_token(token).await {
            // Already unusable
            Err(SessionError::InvalidToken) => Ok(()),
            other => other,
        }
    }

    /// Gate for protected requests: revocation check, then signature and expiry
    pub async fn authenticate(&self, bearer: &str) -> Result<AccessTokenClaims> {
        if self.blacklist.check(bearer).await {
            debug!("Rejected revoked access token");
            return Err(SessionError::InvalidToken);
        }
        Ok(self.tokens.verify_token(bearer)?)
    }

    // ------------------------------------------------------------------
    // Password reset
    // ------------------------------------------------------------------

    /// Send a reset code. Unknown emails get the same success response.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        if !validate_email(&email) {
            return Err(SessionError::Validation("Invalid email address".to_string()));
        }
        self.check_send_limit(OtpPurpose::PasswordReset, &email)
            .await?;

        match self.users.find_by_email(&email).await? {
            Some(user) if user.is_active => {
                self.deliver_code(&user, OtpPurpose::PasswordReset).await?;
                info!(user_id = %user.id, "Password reset code sent");
            }
            _ => {
                info!(email = %mask_email(&email), "Password reset requested for unknown account");
            }
        }
        Ok(())
    }

    /// Set a new password with a reset code and sign out every session
    pub async fn reset_password(&self, email: &str, code: &str, new_password: &str) -> Result<()> {
        // Check strength first so a weak password does not burn the code
        validate_password_strength(new_password)?;

        let email = normalize_email(email);
        if !self
            .otp
            .verify_otp(&email, code, OtpPurpose::PasswordReset)
            .await?
        {
            warn!(email = %mask_email(&email), "Password reset code rejected");
            return Err(SessionError::InvalidCode);
        }

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(SessionError::InvalidCode)?;

        let password_hash = hash_password(new_password)?;
        self.users.update_password(user.id, &password_hash).await?;
        let revoked = self.refresh_tokens.delete_all_for_user(user.id).await?;
        info!(user_id = %user.id, revoked_sessions = revoked, "Password reset completed");

        if let Err(e) = self
            .notifier
            .send_notice(&user.email, Notice::PasswordChanged)
            .await
        {
            warn!(user_id = %user.id, error = %e, "Password change notice not delivered");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Email verification
    // ------------------------------------------------------------------

    pub async fn send_email_verification(&self, user_id: Uuid) -> Result<u64> {
        let user = self.active_user(user_id).await?;
        if user.email_verified {
            return Err(SessionError::Validation(
                "Email already verified".to_string(),
            ));
        }
        self.send_code(&user, OtpPurpose::EmailVerify).await
    }

    pub async fn confirm_email(&self, email: &str, code: &str) -> Result<UserProfile> {
        let email = normalize_email(email);
        if !self
            .otp
            .verify_otp(&email, code, OtpPurpose::EmailVerify)
            .await?
        {
            return Err(SessionError::InvalidCode);
        }

        let mut user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(SessionError::InvalidCode)?;
        self.users.mark_email_verified(user.id).await?;
        user.email_verified = true;

        info!(user_id = %user.id, "Email verified");
        Ok(UserProfile::from(&user))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn active_user(&self, user_id: Uuid) -> Result<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(SessionError::InvalidToken)
    }

    async fn issue_tokens(&self, user: &User) -> Result<TokenPair> {
        let access_token =
            self.tokens
                .generate_token(user.id, &user.email, &user.first_name, &user.last_name)?;
        let refresh = self.refresh_tokens.save_refresh_token(user.id).await?;

        Ok(TokenPair {
            access_token,
            refresh_token: refresh.value,
            token_type: "Bearer",
            expires_in: self.tokens.access_ttl().as_secs(),
            user: UserProfile::from(user),
        })
    }

    /// Limit, create and deliver a code; returns its lifetime in seconds
    async fn send_code(&self, user: &User, purpose: OtpPurpose) -> Result<u64> {
        self.check_send_limit(purpose, &user.email).await?;
        self.deliver_code(user, purpose).await?;
        Ok(self.otp.ttl().as_secs())
    }

    async fn deliver_code(&self, user: &User, purpose: OtpPurpose) -> Result<()> {
        let code = self
            .otp
            .create_otp(&OtpIdentity::new(Some(user.id), user.email.clone()), purpose)
            .await?;
        self.notifier.send_code(&user.email, &code, purpose).await
    }

    async fn check_send_limit(&self, purpose: OtpPurpose, email: &str) -> Result<()> {
        let Some(limiter) = &self.otp_send_limiter else {
            return Ok(());
        };
        let decision = limiter
            .check_key(&format!("otp:{}:{}", purpose.as_str(), email))
            .await;
        if decision.allowed {
            Ok(())
        } else {
            warn!(email = %mask_email(email), purpose = %purpose, "Code send limit reached");
            Err(decision.to_error())
        }
    }
}
