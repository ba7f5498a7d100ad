//! Shared fixtures: the full service wired over in-memory stores.
#![allow(dead_code)]

use crypto_core::{TokenManager, TokenManagerConfig};
use session_service::db::memory::MemoryDatabase;
use session_service::http::{build_router, AppState};
use session_service::security::{
    Blacklist, MemoryCounterStore, MemoryRevocationStore, RateLimitConfig, RateLimiter,
};
use session_service::services::{
    AuthComponents, AuthOrchestrator, OtpConfig, OtpManager, RecordingSender, RefreshTokenStore,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub struct Harness {
    pub db: Arc<MemoryDatabase>,
    pub sender: Arc<RecordingSender>,
    pub revocations: Arc<MemoryRevocationStore>,
    pub tokens: Arc<TokenManager>,
    pub refresh_tokens: Arc<RefreshTokenStore>,
    pub auth: Arc<AuthOrchestrator>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_request_limit(1_000)
    }

    pub fn with_request_limit(max_requests: u64) -> Self {
        let db = Arc::new(MemoryDatabase::new());
        let sender = Arc::new(RecordingSender::new());
        let revocations = Arc::new(MemoryRevocationStore::new());

        let tokens = Arc::new(
            TokenManager::new(TokenManagerConfig {
                secret: TEST_SECRET.to_string(),
                issuer: "session-service".to_string(),
                access_ttl: Duration::from_secs(900),
            })
            .unwrap(),
        );
        let refresh_tokens = Arc::new(RefreshTokenStore::new(
            db.clone(),
            Duration::from_secs(7 * 24 * 3600),
        ));
        let otp = Arc::new(OtpManager::new(db.clone(), OtpConfig::default()));
        let counters = Arc::new(MemoryCounterStore::new());

        let auth = Arc::new(AuthOrchestrator::new(AuthComponents {
            users: db.clone(),
            two_factor: db.clone(),
            tokens: tokens.clone(),
            refresh_tokens: refresh_tokens.clone(),
            otp,
            blacklist: Arc::new(Blacklist::new(revocations.clone())),
            notifier: sender.clone(),
            otp_send_limiter: Some(Arc::new(RateLimiter::new(
                counters.clone(),
                RateLimitConfig {
                    max_requests: 5,
                    window: Duration::from_secs(3_600),
                    ..RateLimitConfig::default()
                },
            ))),
        }));

        let rate_limiter = Arc::new(RateLimiter::new(
            counters,
            RateLimitConfig {
                max_requests,
                window: Duration::from_secs(60),
                ..RateLimitConfig::default()
            },
        ));

        Self {
            db,
            sender,
            revocations,
            tokens,
            refresh_tokens,
            auth,
            rate_limiter,
        }
    }

    pub fn router(&self) -> axum::Router {
        self.router_behind(Vec::new())
    }

    /// Router that believes `X-Forwarded-For` from `proxies`
    pub fn router_behind(&self, proxies: Vec<IpAddr>) -> axum::Router {
        build_router(AppState {
            auth: self.auth.clone(),
            rate_limiter: self.rate_limiter.clone(),
            trusted_proxies: proxies.into(),
        })
    }
}
