/// Periodic purge of expired one-time codes and refresh tokens
use crate::services::otp::OtpManager;
use crate::services::refresh_tokens::RefreshTokenStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub otps_deleted: u64,
    pub refresh_tokens_deleted: u64,
}

/// Run one sweep. Failures are logged; one table failing does not skip the other.
pub async fn sweep_once(otp: &OtpManager, refresh_tokens: &RefreshTokenStore) -> SweepReport {
    let mut report = SweepReport::default();

    match otp.cleanup_expired_otps().await {
        Ok(deleted) => report.otps_deleted = deleted,
        Err(e) => error!(error = %e, "Expired OTP sweep failed"),
    }
    match refresh_tokens.cleanup_expired_tokens().await {
        Ok(deleted) => report.refresh_tokens_deleted = deleted,
        Err(e) => error!(error = %e, "Expired refresh token sweep failed"),
    }

    if report.otps_deleted > 0 || report.refresh_tokens_deleted > 0 {
        info!(
            otps_deleted = report.otps_deleted,
            refresh_tokens_deleted = report.refresh_tokens_deleted,
            "Maintenance sweep completed"
        );
    } else {
        debug!("Maintenance sweep found nothing to delete");
    }
    report
}

/// Sweep every `period` until `shutdown` changes or its sender is dropped
pub fn spawn_maintenance(
    otp: Arc<OtpManager>,
    refresh_tokens: Arc<RefreshTokenStore>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    info!(period_secs = period.as_secs(), "Starting maintenance task");

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep_once(&otp, &refresh_tokens).await;
                }
                _ = shutdown.changed() => {
                    info!("Maintenance task shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryDatabase;
    use crate::models::{OtpIdentity, OtpPurpose};
    use crate::services::otp::OtpConfig;
    use crate::services::refresh_tokens::DEFAULT_REFRESH_TOKEN_TTL;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sweep_removes_only_expired_rows() {
        let db = Arc::new(MemoryDatabase::new());
        let otp = OtpManager::new(db.clone(), OtpConfig::default());
        let refresh = RefreshTokenStore::new(db.clone(), DEFAULT_REFRESH_TOKEN_TTL);

        otp.create_otp(&OtpIdentity::new(None, "old@example.com"), OtpPurpose::TwoFactor)
            .await
            .unwrap();
        otp.create_otp(&OtpIdentity::new(None, "new@example.com"), OtpPurpose::TwoFactor)
            .await
            .unwrap();
        db.set_otp_expiry("old@example.com", Utc::now() - chrono::Duration::minutes(1))
            .await;

        let stale = refresh.save_refresh_token(Uuid::new_v4()).await.unwrap();
        let live = refresh.save_refresh_token(Uuid::new_v4()).await.unwrap();
        db.set_refresh_token_expiry(
            &stale.record.token_hash,
            Utc::now() - chrono::Duration::minutes(1),
        )
        .await;

        let report = sweep_once(&otp, &refresh).await;
        assert_eq!(
            report,
            SweepReport {
                otps_deleted: 1,
                refresh_tokens_deleted: 1
            }
        );
        assert_eq!(db.otp_count().await, 1);
        assert!(refresh.get_refresh_token(&live.value).await.is_ok());
    }

    #[tokio::test]
    async fn test_sweep_survives_store_outage() {
        let db = Arc::new(MemoryDatabase::new());
        let otp = OtpManager::new(db.clone(), OtpConfig::default());
        let refresh = RefreshTokenStore::new(db.clone(), DEFAULT_REFRESH_TOKEN_TTL);
        db.set_unavailable(true);

        assert_eq!(sweep_once(&otp, &refresh).await, SweepReport::default());
    }

    #[tokio::test]
    async fn test_spawned_task_stops_on_shutdown() {
        let db = Arc::new(MemoryDatabase::new());
        let otp = Arc::new(OtpManager::new(db.clone(), OtpConfig::default()));
        let refresh = Arc::new(RefreshTokenStore::new(db, DEFAULT_REFRESH_TOKEN_TTL));
        let (tx, rx) = watch::channel(false);

        let handle = spawn_maintenance(otp, refresh, Duration::from_millis(10), rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("maintenance task did not stop")
            .unwrap();
    }
}
