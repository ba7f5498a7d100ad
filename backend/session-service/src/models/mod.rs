pub mod otp;
pub mod refresh_token;
pub mod user;

pub use otp::{NewOtp, OtpCode, OtpIdentity, OtpPurpose};
pub use refresh_token::{IssuedRefreshToken, RefreshToken};
pub use user::{NewUser, TwoFactorConfig, User, UserProfile};
