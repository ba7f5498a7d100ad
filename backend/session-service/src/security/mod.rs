/// Security primitives for the session service
///
/// - **password**: Argon2id password hashing
/// - **rate_limit**: distributed fixed-window request limiting (fails open)
/// - **token_revocation**: access token blacklist (fails open)
///
/// Access token signing lives in `crypto_core::jwt`.
pub mod password;
pub mod rate_limit;
pub mod token_revocation;

pub use crypto_core::jwt;
pub use password::{hash_password, verify_password};
pub use rate_limit::{
    CounterStore, MemoryCounterStore, RateLimitConfig, RateLimitDecision, RateLimiter,
    RedisCounterStore,
};
pub use token_revocation::{
    Blacklist, MemoryRevocationStore, RedisRevocationStore, RevocationStore,
};
