/// Email delivery for one-time codes and account notices
use crate::config::EmailSettings;
use crate::error::{Result, SessionError};
use crate::models::OtpPurpose;
use crate::validators::mask_email;
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Informational mails; delivery is best-effort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Welcome,
    PasswordChanged,
}

/// Outbound channel for codes and notices
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Deliver a one-time code. Callers treat failure as fatal.
    async fn send_code(&self, recipient: &str, code: &str, purpose: OtpPurpose) -> Result<()>;

    async fn send_notice(&self, recipient: &str, notice: Notice) -> Result<()>;
}

/// Async email transport wrapper (SMTP or no-op)
#[derive(Clone)]
pub struct EmailService {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
}

impl EmailService {
    /// Build email service from configuration
    ///
    /// If SMTP host is empty, operates in no-op mode (logs only).
    pub fn new(config: &EmailSettings) -> Result<Self> {
        let from = config
            .smtp_from
            .parse::<Mailbox>()
            .map_err(|e| SessionError::Internal(format!("Invalid SMTP_FROM address: {}", e)))?;

        let transport = if config.smtp_host.trim().is_empty() {
            warn!("SMTP host not configured; email service will operate in no-op mode");
            None
        } else {
            let builder = if config.use_starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            }
            .map_err(|e| {
                SessionError::Internal(format!("Failed to configure SMTP transport: {}", e))
            })?
            .port(config.smtp_port);

            let builder = match (&config.smtp_username, &config.smtp_password) {
                (Some(username), Some(password)) => builder
                    .credentials(Credentials::new(username.to_string(), password.to_string())),
                _ => builder,
            };

            Some(Arc::new(builder.build()))
        };

        Ok(Self { transport, from })
    }

    /// Check if SMTP transport is enabled
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    async fn send_mail(&self, recipient: &str, subject: &str, body: String) -> Result<()> {
        let Some(transport) = &self.transport else {
            info!(
                subject,
                recipient = %mask_email(recipient),
                "Email service running in no-op mode; skipping actual send"
            );
            return Ok(());
        };

        let to = recipient.parse::<Mailbox>().map_err(|e| {
            SessionError::Notification(format!("Invalid recipient email address: {}", e))
        })?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| SessionError::Notification(format!("Failed to build email: {}", e)))?;

        transport
            .send(email)
            .await
            .map_err(|e| SessionError::Notification(format!("Failed to send email: {}", e)))?;
        info!(subject, recipient = %mask_email(recipient), "email sent");
        Ok(())
    }
}

fn code_message(code: &str, purpose: OtpPurpose) -> (&'static str, String) {
    match purpose {
        OtpPurpose::TwoFactor => (
            "Your sign-in code",
            format!(
                "Your sign-in code is {}.\n\nIt expires shortly and can be used once. \
                 If you did not try to sign in, change your password.",
                code
            ),
        ),
        OtpPurpose::PasswordReset => (
            "Reset your password",
            format!(
                "Use the code {} to reset your password.\n\n\
                 If you did not request a reset, you can ignore this email.",
                code
            ),
        ),
        OtpPurpose::EmailVerify => (
            "Verify your email address",
            format!("Your email verification code is {}.", code),
        ),
    }
}

fn notice_message(notice: Notice) -> (&'static str, String) {
    match notice {
        Notice::Welcome => (
            "Welcome",
            "Your account has been created. You can now sign in.".to_string(),
        ),
        Notice::PasswordChanged => (
            "Your password was changed",
            "Your password was just changed and all sessions were signed out. \
             If this was not you, reset your password immediately."
                .to_string(),
        ),
    }
}

#[async_trait]
impl NotificationSender for EmailService {
    async fn send_code(&self, recipient: &str, code: &str, purpose: OtpPurpose) -> Result<()> {
        let (subject, body) = code_message(code, purpose);
        self.send_mail(recipient, subject, body).await
    }

    async fn send_notice(&self, recipient: &str, notice: Notice) -> Result<()> {
        let (subject, body) = notice_message(notice);
        self.send_mail(recipient, subject, body).await
    }
}

/// A message captured by `RecordingSender`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Code {
        recipient: String,
        code: String,
        purpose: OtpPurpose,
    },
    Notice {
        recipient: String,
        notice: Notice,
    },
}

/// Sender that keeps every message in memory, for tests and local runs.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMessage>>,
    fail_codes: std::sync::atomic::AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `send_code` calls fail
    pub fn fail_code_delivery(&self, fail: bool) {
        self.fail_codes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// The most recent code sent to `recipient` for `purpose`
    pub fn last_code(&self, recipient: &str, purpose: OtpPurpose) -> Option<String> {
        self.messages().into_iter().rev().find_map(|m| match m {
            SentMessage::Code {
                recipient: r,
                code,
                purpose: p,
            } if r == recipient && p == purpose => Some(code),
            _ => None,
        })
    }

    pub fn notices_for(&self, recipient: &str) -> Vec<Notice> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                SentMessage::Notice {
                    recipient: r,
                    notice,
                } if r == recipient => Some(notice),
                _ => None,
            })
            .collect()
    }

    fn record(&self, message: SentMessage) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message);
        }
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send_code(&self, recipient: &str, code: &str, purpose: OtpPurpose) -> Result<()> {
        if self.fail_codes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(SessionError::Notification("delivery disabled".to_string()));
        }
        self.record(SentMessage::Code {
            recipient: recipient.to_string(),
            code: code.to_string(),
            purpose,
        });
        Ok(())
    }

    async fn send_notice(&self, recipient: &str, notice: Notice) -> Result<()> {
        self.record(SentMessage::Notice {
            recipient: recipient.to_string(),
            notice,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_settings() -> EmailSettings {
        EmailSettings {
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_from: "no-reply@example.com".to_string(),
            use_starttls: true,
        }
    }

    #[tokio::test]
    async fn test_noop_mode_accepts_sends() {
        let service = EmailService::new(&noop_settings()).unwrap();
        assert!(!service.is_enabled());
        service
            .send_code("user@example.com", "123456", OtpPurpose::TwoFactor)
            .await
            .unwrap();
        service
            .send_notice("user@example.com", Notice::Welcome)
            .await
            .unwrap();
    }

    #[test]
    fn test_invalid_from_rejected() {
        let mut settings = noop_settings();
        settings.smtp_from = "not an address".to_string();
        assert!(EmailService::new(&settings).is_err());
    }

    #[test]
    fn test_code_message_contains_code() {
        for purpose in [
            OtpPurpose::TwoFactor,
            OtpPurpose::PasswordReset,
            OtpPurpose::EmailVerify,
        ] {
            let (_, body) = code_message("424242", purpose);
            assert!(body.contains("424242"));
        }
    }

    #[tokio::test]
    async fn test_recording_sender_tracks_latest_code() {
        let sender = RecordingSender::new();
        sender
            .send_code("a@example.com", "111111", OtpPurpose::TwoFactor)
            .await
            .unwrap();
        sender
            .send_code("a@example.com", "222222", OtpPurpose::TwoFactor)
            .await
            .unwrap();

        assert_eq!(
            sender.last_code("a@example.com", OtpPurpose::TwoFactor),
            Some("222222".to_string())
        );
        assert_eq!(
            sender.last_code("a@example.com", OtpPurpose::PasswordReset),
            None
        );

        sender.fail_code_delivery(true);
        assert!(matches!(
            sender
                .send_code("a@example.com", "333333", OtpPurpose::TwoFactor)
                .await,
            Err(SessionError::Notification(_))
        ));
    }
}
