mod common;

use chrono::Utc;
use common::{Harness, TEST_SECRET};
use crypto_core::AccessTokenClaims;
use jsonwebtoken::{encode, EncodingKey, Header};
use std::time::Duration;
use session_service::models::OtpPurpose;
use session_service::services::{LoginOutcome, NewAccount, Notice};
use session_service::SessionError;

const PASSWORD: &str = "correct-horse-42";

async fn register(harness: &Harness, email: &str) -> uuid::Uuid {
    harness
        .auth
        .register(NewAccount {
            email: email.to_string(),
            password: PASSWORD.to_string(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_two_factor_login() {
    let harness = Harness::new();
    let user_id = register(&harness, "grace@example.com").await;
    harness.auth.enable_two_factor(user_id).await.unwrap();

    let outcome = harness
        .auth
        .login("grace@example.com", PASSWORD)
        .await
        .unwrap();
    let LoginOutcome::TwoFactorRequired { expires_in } = outcome else {
        panic!("expected a second factor challenge");
    };
    assert_eq!(expires_in, 600);

    let code = harness
        .sender
        .last_code("grace@example.com", OtpPurpose::TwoFactor)
        .expect("code delivered");

    let pair = harness
        .auth
        .verify_two_factor("grace@example.com", &code)
        .await
        .unwrap();
    let claims = harness.auth.authenticate(&pair.access_token).await.unwrap();
    assert_eq!(claims.sub, user_id.to_string());

    assert!(matches!(
        harness
            .auth
            .verify_two_factor("grace@example.com", &code)
            .await,
        Err(SessionError::InvalidCode)
    ));
}

#[tokio::test]
async fn test_two_factor_delivery_failure_aborts_login() {
    let harness = Harness::new();
    let user_id = register(&harness, "offline@example.com").await;
    harness.auth.enable_two_factor(user_id).await.unwrap();
    harness.sender.fail_code_delivery(true);

    let result = harness.auth.login("offline@example.com", PASSWORD).await;
    assert!(matches!(result, Err(SessionError::Notification(_))));
}

#[tokio::test]
async fn test_disabled_two_factor_logs_in_directly() {
    let harness = Harness::new();
    let user_id = register(&harness, "plain@example.com").await;
    harness.auth.enable_two_factor(user_id).await.unwrap();
    harness.auth.disable_two_factor(user_id).await.unwrap();

    let outcome = harness.auth.login("plain@example.com", PASSWORD).await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
    assert!(harness
        .sender
        .last_code("plain@example.com", OtpPurpose::TwoFactor)
        .is_none());
}

#[tokio::test]
async fn test_password_reset_invalidates_sessions() {
    let harness = Harness::new();
    let user_id = register(&harness, "reset@example.com").await;

    let LoginOutcome::Authenticated(first) =
        harness.auth.login("reset@example.com", PASSWORD).await.unwrap()
    else {
        panic!("expected tokens");
    };
    let LoginOutcome::Authenticated(second) =
        harness.auth.login("reset@example.com", PASSWORD).await.unwrap()
    else {
        panic!("expected tokens");
    };
    assert_eq!(harness.db.refresh_token_count(user_id).await, 2);

    harness
        .auth
        .request_password_reset("reset@example.com")
        .await
        .unwrap();
    let code = harness
        .sender
        .last_code("reset@example.com", OtpPurpose::PasswordReset)
        .expect("reset code delivered");

    harness
        .auth
        .reset_password("reset@example.com", &code, "brand-new-pass-7")
        .await
        .unwrap();

    assert_eq!(harness.db.refresh_token_count(user_id).await, 0);
    for pair in [first, second] {
        assert!(matches!(
            harness.auth.refresh(&pair.refresh_token).await,
            Err(SessionError::InvalidToken)
        ));
    }

    assert!(matches!(
        harness.auth.login("reset@example.com", PASSWORD).await,
        Err(SessionError::InvalidCredentials)
    ));
    assert!(matches!(
        harness
            .auth
            .login("reset@example.com", "brand-new-pass-7")
            .await,
        Ok(LoginOutcome::Authenticated(_))
    ));
    assert!(harness
        .sender
        .notices_for("reset@example.com")
        .contains(&Notice::PasswordChanged));
}

#[tokio::test]
async fn test_weak_password_keeps_reset_code_usable() {
    let harness = Harness::new();
    register(&harness, "weak@example.com").await;
    harness
        .auth
        .request_password_reset("weak@example.com")
        .await
        .unwrap();
    let code = harness
        .sender
        .last_code("weak@example.com", OtpPurpose::PasswordReset)
        .unwrap();

    assert!(matches!(
        harness
            .auth
            .reset_password("weak@example.com", &code, "short")
            .await,
        Err(SessionError::Validation(_))
    ));
    harness
        .auth
        .reset_password("weak@example.com", &code, "long-enough-9")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_password_reset_for_unknown_email_is_silent() {
    let harness = Harness::new();

    harness
        .auth
        .request_password_reset("ghost@example.com")
        .await
        .unwrap();
    assert!(harness.sender.messages().is_empty());
}

#[tokio::test]
async fn test_code_send_limit() {
    let harness = Harness::new();
    register(&harness, "spam@example.com").await;

    for _ in 0..5 {
        harness
            .auth
            .request_password_reset("spam@example.com")
            .await
            .unwrap();
    }
    assert!(matches!(
        harness.auth.request_password_reset("spam@example.com").await,
        Err(SessionError::RateLimited { .. })
    ));
}

#[tokio::test]
async fn test_email_verification() {
    let harness = Harness::new();
    let user_id = register(&harness, "verify@example.com").await;

    harness.auth.send_email_verification(user_id).await.unwrap();
    let code = harness
        .sender
        .last_code("verify@example.com", OtpPurpose::EmailVerify)
        .unwrap();

    let profile = harness
        .auth
        .confirm_email("verify@example.com", &code)
        .await
        .unwrap();
    assert!(profile.email_verified);

    assert!(matches!(
        harness.auth.send_email_verification(user_id).await,
        Err(SessionError::Validation(_))
    ));
}

#[tokio::test]
async fn test_revoked_access_token_rejected() {
    let harness = Harness::new();
    register(&harness, "revoke@example.com").await;
    let LoginOutcome::Authenticated(pair) =
        harness.auth.login("revoke@example.com", PASSWORD).await.unwrap()
    else {
        panic!("expected tokens");
    };

    harness
        .auth
        .revoke_access_token(&pair.access_token)
        .await
        .unwrap();
    assert!(matches!(
        harness.auth.authenticate(&pair.access_token).await,
        Err(SessionError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let harness = Harness::new();
    register(&harness, "twice@example.com").await;
    let LoginOutcome::Authenticated(pair) =
        harness.auth.login("twice@example.com", PASSWORD).await.unwrap()
    else {
        panic!("expected tokens");
    };

    harness.auth.logout(&pair.refresh_token, None).await.unwrap();
    harness.auth.logout(&pair.refresh_token, None).await.unwrap();
}

#[tokio::test]
async fn test_verified_identity_provisions_once() {
    let harness = Harness::new();
    let identity = session_service::services::VerifiedIdentity {
        email: "Oauth@Example.com".to_string(),
        first_name: "Ext".to_string(),
        last_name: "User".to_string(),
    };

    let first = harness
        .auth
        .login_with_verified_identity(identity.clone())
        .await
        .unwrap();
    let second = harness
        .auth
        .login_with_verified_identity(identity)
        .await
        .unwrap();

    assert_eq!(first.user.id, second.user.id);
    assert_eq!(first.user.email, "oauth@example.com");
    assert!(first.user.email_verified);
}

#[tokio::test]
async fn test_revocation_covers_final_second_of_validity() {
    let harness = Harness::new();
    let user_id = register(&harness, "edge@example.com").await;

    // Start of a fresh second, so `exp == now` holds for the whole test
    let millis = Utc::now().timestamp_subsec_millis() as u64;
    tokio::time::sleep(Duration::from_millis(1_000 - millis.min(999))).await;

    let now = Utc::now().timestamp();
    let claims = AccessTokenClaims {
        sub: user_id.to_string(),
        email: "edge@example.com".to_string(),
        first_name: "Grace".to_string(),
        last_name: "Hopper".to_string(),
        iat: now - 899,
        exp: now,
        jti: uuid::Uuid::new_v4().to_string(),
        iss: "session-service".to_string(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap();

    assert!(harness.auth.authenticate(&token).await.is_ok());
    harness.auth.revoke_access_token(&token).await.unwrap();
    assert!(matches!(
        harness.auth.authenticate(&token).await,
        Err(SessionError::InvalidToken)
    ));
}
