/// Integration tests for crypto-core JWT functionality
///
/// This test module covers:
/// - Token generation and validation through the public API
/// - Isolation between independently keyed managers
/// - Expiry derived from the configured TTL
use crypto_core::{TokenManager, TokenManagerConfig};
use std::time::Duration;
use uuid::Uuid;

fn manager(secret: &str, ttl_secs: u64) -> TokenManager {
    TokenManager::new(TokenManagerConfig {
        secret: secret.to_string(),
        issuer: "integration-test".to_string(),
        access_ttl: Duration::from_secs(ttl_secs),
    })
    .expect("valid manager config")
}

#[test]
fn test_token_roundtrip_preserves_identity() {
    let manager = manager("integration-secret-aaaaaaaaaaaaaaaaaaaaaaaa", 900);
    let user_id = Uuid::new_v4();

    let token = manager
        .generate_token(user_id, "grace@example.com", "Grace", "Hopper")
        .expect("Failed to generate token");
    let claims = manager.verify_token(&token).expect("Failed to validate token");

    assert_eq!(claims.subject_id().unwrap(), user_id);
    assert_eq!(claims.email, "grace@example.com");
    assert_eq!(claims.first_name, "Grace");
    assert_eq!(claims.last_name, "Hopper");
    assert_eq!(claims.iss, "integration-test");
}

#[test]
fn test_expiry_follows_configured_ttl() {
    let short = manager("integration-secret-bbbbbbbbbbbbbbbbbbbbbbbb", 60);
    let long = manager("integration-secret-bbbbbbbbbbbbbbbbbbbbbbbb", 7200);
    let user_id = Uuid::new_v4();

    let short_claims = short
        .verify_token(&short.generate_token(user_id, "a@b.io", "A", "B").unwrap())
        .unwrap();
    let long_claims = long
        .verify_token(&long.generate_token(user_id, "a@b.io", "A", "B").unwrap())
        .unwrap();

    assert_eq!(short_claims.exp - short_claims.iat, 60);
    assert_eq!(long_claims.exp - long_claims.iat, 7200);
    assert_eq!(long.access_ttl(), Duration::from_secs(7200));
}

#[test]
fn test_managers_with_different_secrets_are_isolated() {
    let tenant_a = manager("tenant-a-secret-cccccccccccccccccccccccc", 900);
    let tenant_b = manager("tenant-b-secret-dddddddddddddddddddddddd", 900);
    let user_id = Uuid::new_v4();

    let token_a = tenant_a
        .generate_token(user_id, "a@example.com", "A", "A")
        .unwrap();

    assert!(tenant_a.verify_token(&token_a).is_ok());
    assert!(tenant_b.verify_token(&token_a).is_err());
}

#[test]
fn test_truncated_signature_rejected() {
    let manager = manager("integration-secret-eeeeeeeeeeeeeeeeeeeeeeee", 900);
    let token = manager
        .generate_token(Uuid::new_v4(), "x@example.com", "X", "Y")
        .unwrap();

    let truncated = &token[..token.len() - 4];
    assert!(manager.verify_token(truncated).is_err());
}
