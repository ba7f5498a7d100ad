use sha2::{Digest, Sha256};

/// Compute SHA256 hash of input bytes
pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// Hex-encoded SHA-256 of a secret value.
///
/// Stores key refresh tokens, OTP codes and revocation markers by this digest so
/// that a database or Redis dump never contains a usable secret.
pub fn sha256_hex(value: &str) -> String {
    hex::encode(sha256(value.as_bytes()))
}
