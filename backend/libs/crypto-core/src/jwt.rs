//! Access-token signing and verification.
//!
//! Access tokens are compact HS256 JWTs (`header.payload.signature`) carrying the
//! subject id, email, names, issue time and expiry.
//!
//! ## Security Design
//!
//! - **HS256 ONLY**: the header algorithm must match exactly, which rules out
//!   `none`, RS/HS confusion and silent downgrades to another HMAC width
//! - **No global keys**: a `TokenManager` is built from explicit configuration,
//!   so several independently keyed instances can coexist (and tests stay isolated)
//! - **One failure mode**: bad signature, tampered payload, expiry and malformed
//!   input all surface as `JwtError::InvalidToken`
//!
//! ## Usage
//!
//! ```rust
//! use crypto_core::jwt::{TokenManager, TokenManagerConfig};
//! use std::time::Duration;
//!
//! let manager = TokenManager::new(TokenManagerConfig {
//!     secret: "0123456789abcdef0123456789abcdef".to_string(),
//!     issuer: "session-service".to_string(),
//!     access_ttl: Duration::from_secs(3600),
//! })
//! .unwrap();
//!
//! let user_id = uuid::Uuid::new_v4();
//! let token = manager
//!     .generate_token(user_id, "ada@example.com", "Ada", "Lovelace")
//!     .unwrap();
//! let claims = manager.verify_token(&token).unwrap();
//! assert_eq!(claims.email, "ada@example.com");
//! ```
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// The single accepted signing algorithm
const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// Shortest accepted HMAC secret (256 bits)
pub const MIN_SECRET_BYTES: usize = 32;

const DEFAULT_ACCESS_TTL_SECS: u64 = 3600;

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Claims carried by every access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token id, so tokens minted in the same second remain distinct
    pub jti: String,
    pub iss: String,
}

impl AccessTokenClaims {
    /// Parse the subject back into a user id.
    pub fn subject_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidToken)
    }

    /// Seconds of validity left at `now_secs`, zero once expired.
    pub fn remaining_secs(&self, now_secs: i64) -> u64 {
        (self.exp - now_secs).max(0) as u64
    }
}

/// Construction parameters for a `TokenManager`
#[derive(Clone)]
pub struct TokenManagerConfig {
    pub secret: String,
    pub issuer: String,
    pub access_ttl: Duration,
}

impl fmt::Debug for TokenManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManagerConfig")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .finish()
    }
}

impl Default for TokenManagerConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "session-service".to_string(),
            access_ttl: Duration::from_secs(DEFAULT_ACCESS_TTL_SECS),
        }
    }
}

// ============================================================================
// Token Manager
// ============================================================================

/// Issues and verifies access tokens with one symmetric secret.
///
/// Stateless: no store is consulted, so verification never depends on (and
/// never fails open because of) external availability.
#[derive(Clone)]
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_ttl: Duration,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Build a manager from configuration.
    ///
    /// ## Errors
    ///
    /// Returns `JwtError::InvalidKey` if the secret is shorter than 32 bytes or
    /// the TTL is zero.
    pub fn new(config: TokenManagerConfig) -> Result<Self, JwtError> {
        if config.secret.len() < MIN_SECRET_BYTES {
            return Err(JwtError::InvalidKey(format!(
                "secret must be at least {MIN_SECRET_BYTES} bytes"
            )));
        }
        if config.access_ttl.is_zero() {
            return Err(JwtError::InvalidKey(
                "access token TTL must be positive".to_string(),
            ));
        }

        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.algorithms = vec![JWT_ALGORITHM];
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.set_issuer(&[config.issuer.as_str()]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer,
            access_ttl: config.access_ttl,
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Generate a signed access token expiring `access_ttl` from now.
    pub fn generate_token(
        &self,
        subject_id: Uuid,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<String, JwtError> {
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            sub: subject_id.to_string(),
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            iat: now,
            exp: now + self.access_ttl.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
        };

        self.sign(&claims)
    }

    fn sign(&self, claims: &AccessTokenClaims) -> Result<String, JwtError> {
        encode(&Header::new(JWT_ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    /// Verify signature, algorithm, issuer and expiry, returning the claims.
    ///
    /// Every rejection is the same `JwtError::InvalidToken`; the concrete
    /// reason is only logged at debug level.
    pub fn verify_token(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        match decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(err) => {
                tracing::debug!(reason = ?err.kind(), "access token rejected");
                Err(JwtError::InvalidToken)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    const TEST_SECRET: &str = "test-secret-0123456789abcdef-0123456789";

    fn manager_with(secret: &str) -> TokenManager {
        TokenManager::new(TokenManagerConfig {
            secret: secret.to_string(),
            issuer: "test-issuer".to_string(),
            access_ttl: Duration::from_secs(3600),
        })
        .expect("valid test config")
    }

    fn issue(manager: &TokenManager) -> (Uuid, String) {
        let user_id = Uuid::new_v4();
        let token = manager
            .generate_token(user_id, "test@example.com", "Test", "User")
            .expect("Failed to generate token");
        (user_id, token)
    }

    #[test]
    fn test_generate_access_token() {
        let manager = manager_with(TEST_SECRET);
        let (_, token) = issue(&manager);
        assert_eq!(token.matches('.').count(), 2); // JWT has 3 parts
    }

    #[test]
    fn test_validate_valid_token() {
        let manager = manager_with(TEST_SECRET);
        let (user_id, token) = issue(&manager);

        let claims = manager.verify_token(&token).expect("token should verify");
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.subject_id().unwrap(), user_id);
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.first_name, "Test");
        assert_eq!(claims.last_name, "User");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_tokens_issued_together_are_distinct() {
        let manager = manager_with(TEST_SECRET);
        let user_id = Uuid::new_v4();
        let a = manager.generate_token(user_id, "a@example.com", "A", "B").unwrap();
        let b = manager.generate_token(user_id, "a@example.com", "A", "B").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_reject_short_secret() {
        let result = TokenManager::new(TokenManagerConfig {
            secret: "short".to_string(),
            ..TokenManagerConfig::default()
        });
        assert!(matches!(result, Err(JwtError::InvalidKey(_))));
    }

    #[test]
    fn test_reject_malformed_token() {
        let manager = manager_with(TEST_SECRET);
        assert!(matches!(
            manager.verify_token("invalid.token.here"),
            Err(JwtError::InvalidToken)
        ));
        assert!(matches!(
            manager.verify_token(""),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn test_reject_token_signed_with_other_secret() {
        let issuer = manager_with("another-secret-0123456789abcdef-9876543210");
        let verifier = manager_with(TEST_SECRET);
        let (_, token) = issue(&issuer);

        assert!(matches!(
            verifier.verify_token(&token),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn test_reject_tampered_payload() {
        let manager = manager_with(TEST_SECRET);
        let (_, token) = issue(&manager);

        let parts: Vec<&str> = token.split('.').collect();
        let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let mut claims: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        claims["email"] = serde_json::Value::String("attacker@example.com".to_string());
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(
            manager.verify_token(&forged),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn test_reject_expired_token() {
        let manager = manager_with(TEST_SECRET);
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            sub: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            iat: now - 7200,
            exp: now - 5,
            jti: Uuid::new_v4().to_string(),
            iss: "test-issuer".to_string(),
        };
        let token = manager.sign(&claims).unwrap();

        assert!(matches!(
            manager.verify_token(&token),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn test_reject_algorithm_substitution() {
        let manager = manager_with(TEST_SECRET);
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            sub: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            iat: now,
            exp: now + 600,
            jti: Uuid::new_v4().to_string(),
            iss: "test-issuer".to_string(),
        };
        // Same secret, different HMAC width
        let hs384 = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(
            manager.verify_token(&hs384),
            Err(JwtError::InvalidToken)
        ));

        // Unsigned token
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let unsigned = format!("{header}.{payload}.");
        assert!(matches!(
            manager.verify_token(&unsigned),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn test_reject_foreign_issuer() {
        let ours = manager_with(TEST_SECRET);
        let theirs = TokenManager::new(TokenManagerConfig {
            secret: TEST_SECRET.to_string(),
            issuer: "someone-else".to_string(),
            access_ttl: Duration::from_secs(60),
        })
        .unwrap();
        let (_, token) = issue(&theirs);

        assert!(matches!(
            ours.verify_token(&token),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn test_remaining_secs() {
        let manager = manager_with(TEST_SECRET);
        let (_, token) = issue(&manager);
        let claims = manager.verify_token(&token).unwrap();

        assert_eq!(claims.remaining_secs(claims.iat), 3600);
        assert_eq!(claims.remaining_secs(claims.exp + 10), 0);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = TokenManagerConfig {
            secret: TEST_SECRET.to_string(),
            ..TokenManagerConfig::default()
        };
        assert!(!format!("{config:?}").contains(TEST_SECRET));
    }
}
