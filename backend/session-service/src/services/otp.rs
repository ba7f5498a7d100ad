/// One-time code issuance and single-use verification
///
/// Codes are numeric, drawn from the OS CSPRNG, and stored only as a digest
/// bound to the recipient and purpose. Verification is one conditional update
/// in the store, so a code succeeds at most once however many requests race.
use crate::config::OtpSettings;
use crate::db::OtpRepository;
use crate::error::Result;
use crate::models::{NewOtp, OtpIdentity, OtpPurpose};
use crate::validators::{mask_email, normalize_email, validate_otp_format};
use chrono::Utc;
use crypto_core::{generate_numeric_code, sha256_hex};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub length: usize,
    pub ttl: Duration,
    /// Issuing a code invalidates earlier unused codes of the same purpose
    pub single_active: bool,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            length: 6,
            ttl: Duration::from_secs(600),
            single_active: true,
        }
    }
}

impl From<&OtpSettings> for OtpConfig {
    fn from(settings: &OtpSettings) -> Self {
        Self {
            length: settings.length,
            ttl: Duration::from_secs(settings.ttl_secs),
            single_active: settings.single_active,
        }
    }
}

pub struct OtpManager {
    repo: Arc<dyn OtpRepository>,
    config: OtpConfig,
}

impl OtpManager {
    pub fn new(repo: Arc<dyn OtpRepository>, config: OtpConfig) -> Self {
        Self { repo, config }
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Issue a fresh code and return its plaintext (the only place it exists)
    pub async fn create_otp(&self, identity: &OtpIdentity, purpose: OtpPurpose) -> Result<String> {
        let email = normalize_email(&identity.email);
        let code = generate_numeric_code(self.config.length);
        let ttl = chrono::Duration::from_std(self.config.ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(10));

        self.repo
            .insert(
                NewOtp {
                    user_id: identity.user_id,
                    code_hash: code_digest(&email, purpose, &code),
                    email: email.clone(),
                    purpose,
                    expires_at: Utc::now() + ttl,
                },
                self.config.single_active,
            )
            .await?;

        info!(
            email = %mask_email(&email),
            purpose = %purpose,
            "One-time code issued"
        );
        Ok(code)
    }

    /// Consume a code. `Ok(false)` for wrong, used, expired or malformed codes.
    ///
    /// Store failures are returned as errors, never as a verdict.
    pub async fn verify_otp(&self, email: &str, code: &str, purpose: OtpPurpose) -> Result<bool> {
        let code = code.trim();
        if !validate_otp_format(code, self.config.length) {
            debug!(purpose = %purpose, "Rejected malformed one-time code");
            return Ok(false);
        }

        let email = normalize_email(email);
        let consumed = self
            .repo
            .consume(&email, &code_digest(&email, purpose, code), purpose)
            .await?;

        if consumed {
            info!(email = %mask_email(&email), purpose = %purpose, "One-time code verified");
        } else {
            debug!(email = %mask_email(&email), purpose = %purpose, "One-time code rejected");
        }
        Ok(consumed)
    }

    pub async fn cleanup_expired_otps(&self) -> Result<u64> {
        self.repo.delete_expired().await
    }
}

/// Digest bound to recipient and purpose, so equal codes never collide across them
fn code_digest(email: &str, purpose: OtpPurpose, code: &str) -> String {
    sha256_hex(&format!("{}:{}:{}", purpose.as_str(), email, code))
}
