use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_cron_scheduler::{Job, JobSchedulerError};

use crate::models::CardStatus;
use crate::store::{CardStore, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryAuditReport {
    pub checked_at: DateTime<Utc>,
    pub active: i64,
    /// ACTIVE cards whose expiry has passed
    pub expired: i64,
}

/// Counts ACTIVE cards past their expiry.
///
/// Expiry is a read-time view, so this job only reports; it never changes
/// card status.
pub async fn audit_expired_cards(
    store: &dyn CardStore,
    now: DateTime<Utc>,
) -> StoreResult<ExpiryAuditReport> {
    let active = store.count_by_status(CardStatus::Active).await?;
    let expired = store.count_expired(now).await?;

    let report = ExpiryAuditReport {
        checked_at: now,
        active,
        expired,
    };

    if expired > 0 {
        tracing::warn!(?report, "Active cards past expiry");
    } else {
        tracing::info!(?report, "Expiry audit completed");
    }

    Ok(report)
}

/// Cron job running [`audit_expired_cards`] on `schedule` (six-field cron, seconds first)
pub fn expiry_audit_job(
    schedule: &str,
    store: Arc<dyn CardStore>,
) -> Result<Job, JobSchedulerError> {
    Job::new_async(schedule, move |_id, _scheduler| {
        let store = store.clone();
        Box::pin(async move {
            if let Err(e) = audit_expired_cards(store.as_ref(), Utc::now()).await {
                tracing::error!(error = %e, "Expiry audit failed");
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::card::expiry_for;
    use crate::store::MemoryCardStore;
    use crate::testing::card_with_code;

    #[tokio::test]
    async fn test_audit_counts_expired_active_cards() {
        let store = MemoryCardStore::new();
        let now = Utc::now();

        let mut stale = card_with_code("FAMTNCH0001");
        stale.generated_at = now - chrono::Duration::days(2000);
        stale.expires_at = expiry_for(stale.generated_at);
        store.seed(stale);

        let mut revoked = card_with_code("FAMTNCH0002");
        revoked.generated_at = now - chrono::Duration::days(2000);
        revoked.expires_at = expiry_for(revoked.generated_at);
        revoked.status = CardStatus::Revoked;
        store.seed(revoked);

        let mut fresh = card_with_code("FAMTNCH0003");
        fresh.generated_at = now;
        fresh.expires_at = expiry_for(now);
        store.seed(fresh);

        let report = audit_expired_cards(&store, now).await.unwrap();

        assert_eq!(report.active, 2);
        assert_eq!(report.expired, 1);
        // Reporting only, nothing was revoked
        assert_eq!(store.count_by_status(CardStatus::Revoked).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_audit_propagates_store_failure() {
        let store = MemoryCardStore::new();
        store.set_unavailable(true);

        assert!(audit_expired_cards(&store, Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_schedule_is_rejected() {
        let store: Arc<dyn CardStore> = Arc::new(MemoryCardStore::new());
        assert!(expiry_audit_job("every hour", store).is_err());
    }
}
