//! In-process implementation of every repository.
//!
//! One mutex guards all tables, so each trait call is atomic exactly like its
//! SQL counterpart. Used by the test suites and for single-node development;
//! `set_unavailable(true)` makes every call fail with `StoreUnavailable`.

use super::{OtpRepository, RefreshTokenRepository, TwoFactorRepository, UserRepository};
use crate::db::two_fa::EMAIL_METHOD;
use crate::error::{Result, SessionError};
use crate::models::{NewOtp, NewUser, OtpCode, OtpPurpose, RefreshToken, TwoFactorConfig, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<String, RefreshToken>,
    otp_codes: Vec<OtpCode>,
    two_fa: HashMap<Uuid, TwoFactorConfig>,
}

#[derive(Default)]
pub struct MemoryDatabase {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(SessionError::StoreUnavailable(
                "in-memory store offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// Number of refresh tokens stored for a user, live or not
    pub async fn refresh_token_count(&self, user_id: Uuid) -> usize {
        self.tables
            .lock()
            .await
            .refresh_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .count()
    }

    /// Shift a stored refresh token's expiry, for expiry tests
    pub async fn set_refresh_token_expiry(&self, token_hash: &str, expires_at: DateTime<Utc>) {
        if let Some(token) = self.tables.lock().await.refresh_tokens.get_mut(token_hash) {
            token.expires_at = expires_at;
        }
    }

    /// Shift the expiry of every code issued to `email`, for expiry tests
    pub async fn set_otp_expiry(&self, email: &str, expires_at: DateTime<Utc>) {
        for otp in self
            .tables
            .lock()
            .await
            .otp_codes
            .iter_mut()
            .filter(|o| o.email == email)
        {
            otp.expires_at = expires_at;
        }
    }

    pub async fn otp_count(&self) -> usize {
        self.tables.lock().await.otp_codes.len()
    }
}

#[async_trait]
impl UserRepository for MemoryDatabase {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.ensure_available()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        self.ensure_available()?;
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<User> {
        self.ensure_available()?;
        let mut tables = self.tables.lock().await;
        if tables
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new_user.email))
        {
            return Err(SessionError::EmailAlreadyExists);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            password_hash: new_user.password_hash,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            email_verified: new_user.email_verified,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        self.ensure_available()?;
        if let Some(user) = self.tables.lock().await.users.get_mut(&user_id) {
            user.password_hash = Some(password_hash.to_string());
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<()> {
        self.ensure_available()?;
        if let Some(user) = self.tables.lock().await.users.get_mut(&user_id) {
            user.email_verified = true;
            user.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryDatabase {
    async fn insert(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken> {
        self.ensure_available()?;
        let record = RefreshToken {
            id: Uuid::new_v4(),
            user_id,
            token_hash: token_hash.to_string(),
            created_at: Utc::now(),
            expires_at,
            revoked: false,
        };
        self.tables
            .lock()
            .await
            .refresh_tokens
            .insert(token_hash.to_string(), record.clone());
        Ok(record)
    }

    async fn find_live(&self, token_hash: &str) -> Result<Option<RefreshToken>> {
        self.ensure_available()?;
        let now = Utc::now();
        Ok(self
            .tables
            .lock()
            .await
            .refresh_tokens
            .get(token_hash)
            .filter(|t| t.is_live(now))
            .cloned())
    }

    async fn delete(&self, token_hash: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self
            .tables
            .lock()
            .await
            .refresh_tokens
            .remove(token_hash)
            .is_some())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        self.ensure_available()?;
        let mut tables = self.tables.lock().await;
        let before = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - tables.refresh_tokens.len()) as u64)
    }

    async fn rotate(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>> {
        self.ensure_available()?;
        let now = Utc::now();
        let mut tables = self.tables.lock().await;

        let live = tables
            .refresh_tokens
            .get(old_hash)
            .map(|t| t.is_live(now))
            .unwrap_or(false);
        if !live {
            return Ok(None);
        }
        let Some(old) = tables.refresh_tokens.remove(old_hash) else {
            return Ok(None);
        };

        let successor = RefreshToken {
            id: Uuid::new_v4(),
            user_id: old.user_id,
            token_hash: new_hash.to_string(),
            created_at: now,
            expires_at: new_expires_at,
            revoked: false,
        };
        tables
            .refresh_tokens
            .insert(new_hash.to_string(), successor.clone());
        Ok(Some(successor))
    }

    async fn delete_expired(&self) -> Result<u64> {
        self.ensure_available()?;
        let now = Utc::now();
        let mut tables = self.tables.lock().await;
        let before = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|_, t| t.is_live(now));
        Ok((before - tables.refresh_tokens.len()) as u64)
    }
}

#[async_trait]
impl OtpRepository for MemoryDatabase {
    async fn insert(&self, otp: NewOtp, invalidate_previous: bool) -> Result<OtpCode> {
        self.ensure_available()?;
        let now = Utc::now();
        let mut tables = self.tables.lock().await;

        if invalidate_previous {
            for existing in tables.otp_codes.iter_mut().filter(|o| {
                !o.used && o.email == otp.email && o.purpose == otp.purpose.as_str()
            }) {
                existing.used = true;
                existing.used_at = Some(now);
            }
        }

        let stored = OtpCode {
            id: Uuid::new_v4(),
            user_id: otp.user_id,
            email: otp.email,
            code_hash: otp.code_hash,
            purpose: otp.purpose.as_str().to_string(),
            expires_at: otp.expires_at,
            used: false,
            used_at: None,
            created_at: now,
        };
        tables.otp_codes.push(stored.clone());
        Ok(stored)
    }

    async fn consume(&self, email: &str, code_hash: &str, purpose: OtpPurpose) -> Result<bool> {
        self.ensure_available()?;
        let now = Utc::now();
        let mut tables = self.tables.lock().await;

        let newest = tables
            .otp_codes
            .iter_mut()
            .filter(|o| {
                !o.used
                    && o.expires_at > now
                    && o.email == email
                    && o.purpose == purpose.as_str()
                    && o.code_hash == code_hash
            })
            .max_by_key(|o| o.created_at);

        match newest {
            Some(otp) => {
                otp.used = true;
                otp.used_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_expired(&self) -> Result<u64> {
        self.ensure_available()?;
        let now = Utc::now();
        let mut tables = self.tables.lock().await;
        let before = tables.otp_codes.len();
        tables.otp_codes.retain(|o| o.expires_at > now);
        Ok((before - tables.otp_codes.len()) as u64)
    }
}

#[async_trait]
impl TwoFactorRepository for MemoryDatabase {
    async fn get(&self, user_id: Uuid) -> Result<Option<TwoFactorConfig>> {
        self.ensure_available()?;
        Ok(self.tables.lock().await.two_fa.get(&user_id).cloned())
    }

    async fn set_enabled(&self, user_id: Uuid, enabled: bool) -> Result<TwoFactorConfig> {
        self.ensure_available()?;
        let config = TwoFactorConfig {
            user_id,
            method: EMAIL_METHOD.to_string(),
            enabled,
            updated_at: Utc::now(),
        };
        self.tables
            .lock()
            .await
            .two_fa
            .insert(user_id, config.clone());
        Ok(config)
    }
}
