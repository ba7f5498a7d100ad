//! Cryptographic primitives shared by the session services.
//!
//! - `jwt`: HS256 access-token signing and verification (`TokenManager`)
//! - `hash`: SHA-256 digests used to key stored secrets
//! - `random`: CSPRNG-backed opaque tokens and numeric one-time codes
pub mod hash;
pub mod jwt;
pub mod random;

pub use hash::{sha256, sha256_hex};
pub use jwt::{AccessTokenClaims, JwtError, TokenManager, TokenManagerConfig};
pub use random::{generate_numeric_code, generate_opaque_token};
