//! Secret generation backed by the operating system CSPRNG.
//!
//! Nothing in here may be seeded from time or any other guessable source;
//! every byte comes from `OsRng`.
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, Rng, RngCore};

/// Entropy of an opaque refresh token (256 bits).
pub const OPAQUE_TOKEN_BYTES: usize = 32;

/// Generate an opaque, URL-safe token with 256 bits of entropy.
///
/// The result is 43 base64url characters without padding. It never contains
/// `.`, so it cannot be mistaken for a three-segment JWT.
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; OPAQUE_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a numeric one-time code of exactly `length` decimal digits.
///
/// Each digit is drawn uniformly; leading zeros are kept.
pub fn generate_numeric_code(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
