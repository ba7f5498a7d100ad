/// Service layer for the session service
///
/// - `otp`: one-time code issuance and single-use verification
/// - `refresh_tokens`: opaque refresh tokens with atomic rotation
/// - `auth`: the orchestrator composing every flow
/// - `email`: code and notice delivery (SMTP or no-op)
/// - `maintenance`: periodic purge of expired rows
pub mod auth;
pub mod email;
pub mod maintenance;
pub mod otp;
pub mod refresh_tokens;

pub use auth::{
    AuthComponents, AuthOrchestrator, LoginOutcome, NewAccount, TokenPair, VerifiedIdentity,
};
pub use email::{EmailService, Notice, NotificationSender, RecordingSender};
pub use maintenance::{spawn_maintenance, sweep_once};
pub use otp::{OtpConfig, OtpManager};
pub use refresh_tokens::RefreshTokenStore;
