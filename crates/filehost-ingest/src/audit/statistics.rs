use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use filehost_core::models::ErrorStatistics;
use filehost_core::ErrorMetadata;
use filehost_db::{MetadataResult, MetadataStore};

/// Read side of the error log: statistics and retention.
pub struct StatisticsAggregator<M: MetadataStore> {
    store: Arc<M>,
}

impl<M: MetadataStore> Clone for StatisticsAggregator<M> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<M: MetadataStore> StatisticsAggregator<M> {
    pub fn new(store: Arc<M>) -> Self {
        Self { store }
    }

    /// Failed uploads ended within the last `period_days` days.
    #[tracing::instrument(skip(self))]
    pub async fn get_error_statistics(&self, period_days: u32) -> MetadataResult<ErrorStatistics> {
        let until = Utc::now();
        let since = until - Duration::days(i64::from(period_days));

        let mut session = self.store.begin().await?;
        let counts = self
            .store
            .count_failed_by_type(&mut session, since, until)
            .await?;
        self.store.rollback(session).await?;

        let mut stats = ErrorStatistics {
            period_days,
            error_type_counts: BTreeMap::new(),
            ..Default::default()
        };
        for (error_type, count) in counts {
            *stats.error_type_counts.entry(error_type).or_default() += count;
            stats.total_failed_uploads += count;
            if error_type.is_retryable() {
                stats.retryable_count += count;
            } else {
                stats.non_retryable_count += count;
            }
        }

        Ok(stats)
    }

    /// Delete error log entries older than `retention_days`. Returns the count deleted.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup_old_error_logs(&self, retention_days: u32) -> MetadataResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));

        let mut session = self.store.begin().await?;
        let deleted = self
            .store
            .delete_failed_attempts_before(&mut session, cutoff)
            .await?;
        self.store.commit(session).await?;

        tracing::info!(deleted, cutoff = %cutoff, "Old error log entries removed");
        Ok(deleted)
    }
}
