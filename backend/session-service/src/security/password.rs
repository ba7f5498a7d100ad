/// Password hashing and verification using Argon2id
use crate::error::{Result, SessionError};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Hash verified when no account matches, so unknown emails cost the same
/// time as wrong passwords.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(b"dummy-password-for-timing", &salt)
        .ok()
        .map(|h| h.to_string())
});

/// Hash a password using Argon2id algorithm
///
/// ## Security
///
/// - Algorithm: Argon2id (default configuration)
/// - Salt: Random 16-byte salt generated per password
///
/// ## Returns
///
/// PHC-formatted hash string safe for database storage
///
/// ## Errors
///
/// Returns `Validation` if the password fails the strength rules
pub fn hash_password(password: &str) -> Result<String> {
    validate_password_strength(password)?;

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| SessionError::Internal(format!("Password hashing failed: {}", e)))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against its PHC hash (constant-time comparison)
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| SessionError::Internal(format!("Invalid password hash format: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(SessionError::Internal(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}

/// Burn one verification's worth of work; always reports no match.
pub fn verify_against_dummy(password: &str) -> bool {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
    false
}

/// Validate password strength
///
/// ## Requirements
///
/// - 8 to 128 characters
/// - At least one letter and one digit
pub fn validate_password_strength(password: &str) -> Result<()> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(SessionError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(SessionError::Validation(format!(
            "Password must be at most {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }

    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(SessionError::Validation(
            "Password must contain at least one letter and one digit".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse 42").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse 42", &hash).unwrap());
        assert!(!verify_password("wrong horse 42", &hash).unwrap());
    }

    #[test]
    fn test_same_password_different_salts() {
        let a = hash_password("Passw0rdPassw0rd").unwrap();
        let b = hash_password("Passw0rdPassw0rd").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_weak_passwords_rejected() {
        assert!(matches!(
            hash_password("short1"),
            Err(SessionError::Validation(_))
        ));
        assert!(matches!(
            hash_password("onlyletters"),
            Err(SessionError::Validation(_))
        ));
        assert!(matches!(
            hash_password("1234567890"),
            Err(SessionError::Validation(_))
        ));
    }

    #[test]
    fn test_malformed_hash_is_internal_error() {
        assert!(matches!(
            verify_password("anything1", "not-a-phc-string"),
            Err(SessionError::Internal(_))
        ));
    }

    #[test]
    fn test_dummy_verify_never_matches() {
        assert!(!verify_against_dummy("dummy-password-for-timing"));
    }
}
