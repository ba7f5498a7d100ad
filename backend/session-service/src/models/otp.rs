use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// What a one-time code authorizes. Codes never verify across purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    TwoFactor,
    PasswordReset,
    EmailVerify,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::TwoFactor => "two_factor",
            OtpPurpose::PasswordReset => "password_reset",
            OtpPurpose::EmailVerify => "email_verify",
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "two_factor" | "2fa" => Ok(OtpPurpose::TwoFactor),
            "password_reset" => Ok(OtpPurpose::PasswordReset),
            "email_verify" => Ok(OtpPurpose::EmailVerify),
            other => Err(format!("unknown OTP purpose: {}", other)),
        }
    }
}

/// Who a code is issued to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpIdentity {
    pub user_id: Option<Uuid>,
    pub email: String,
}

impl OtpIdentity {
    pub fn new(user_id: Option<Uuid>, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
        }
    }
}

/// Stored one-time code; `used` flips false -> true exactly once
#[derive(Debug, Clone, FromRow)]
pub struct OtpCode {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: String,
    pub code_hash: String,
    pub purpose: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOtp {
    pub user_id: Option<Uuid>,
    pub email: String,
    pub code_hash: String,
    pub purpose: OtpPurpose,
    pub expires_at: DateTime<Utc>,
}
