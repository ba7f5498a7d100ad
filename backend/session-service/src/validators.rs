//! Input validation utilities for the session service

use once_cell::sync::Lazy;
use regex::Regex;

// Compile regex patterns once at startup
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("hardcoded email regex is invalid - fix source code")
});

static REFRESH_TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{43}$")
        .expect("hardcoded refresh token regex is invalid - fix source code")
});

/// Validate email format (RFC 5322 simplified)
pub fn validate_email(email: &str) -> bool {
    !email.is_empty() && email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

/// Canonical form used for storage and lookups
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// `j***@example.com` form for logs
pub fn mask_email(email: &str) -> String {
    if let Some(at_pos) = email.find('@') {
        let local = &email[..at_pos];
        let domain = &email[at_pos..];
        match local.chars().next() {
            Some(first) if local.chars().count() > 2 => format!("{}***{}", first, domain),
            _ => format!("**{}", domain),
        }
    } else {
        "***@***".to_string()
    }
}

/// A well-formed code is exactly `length` ASCII digits
pub fn validate_otp_format(code: &str, length: usize) -> bool {
    code.len() == length && code.bytes().all(|b| b.is_ascii_digit())
}

/// A well-formed refresh token is 43 base64url characters
pub fn validate_refresh_token_format(token: &str) -> bool {
    REFRESH_TOKEN_REGEX.is_match(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(validate_email("user@example.com"));
        assert!(validate_email("test.user+tag@sub.example.co.uk"));
    }

    #[test]
    fn test_invalid_email() {
        assert!(!validate_email(""));
        assert!(!validate_email("no-at-sign"));
        assert!(!validate_email("user@nodot"));
        assert!(!validate_email(&format!("{}@example.com", "a".repeat(250))));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("john@example.com"), "j***@example.com");
        assert_eq!(mask_email("jo@example.com"), "**@example.com");
        assert_eq!(mask_email("garbage"), "***@***");
    }

    #[test]
    fn test_otp_format() {
        assert!(validate_otp_format("012345", 6));
        assert!(!validate_otp_format("12345", 6));
        assert!(!validate_otp_format("12345a", 6));
        assert!(!validate_otp_format("１２３４５６", 6));
    }

    #[test]
    fn test_refresh_token_format() {
        let token = crypto_core::generate_opaque_token();
        assert!(validate_refresh_token_format(&token));
        assert!(!validate_refresh_token_format("header.payload.signature"));
        assert!(!validate_refresh_token_format(""));
    }
}
