use std::sync::Arc;
use std::time::Duration;

use filehost_db::MetadataStore;
use serde::Serialize;
use tokio::time::interval;

use crate::audit::StatisticsAggregator;
use crate::recovery::RecoveryExecutor;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionSummary {
    pub error_logs_deleted: u64,
    pub stale_uploads_recovered: usize,
}

/// Periodic error-log pruning and stale upload reconciliation.
pub struct RetentionService<M: MetadataStore> {
    statistics: StatisticsAggregator<M>,
    recovery: RecoveryExecutor<M>,
    retention_days: u32,
    stale_after: chrono::Duration,
    every: Duration,
}

impl<M: MetadataStore> RetentionService<M> {
    pub fn new(
        statistics: StatisticsAggregator<M>,
        recovery: RecoveryExecutor<M>,
        retention_days: u32,
        stale_after: chrono::Duration,
        every: Duration,
    ) -> Self {
        Self {
            statistics,
            recovery,
            retention_days,
            stale_after,
            every,
        }
    }

    /// Start the background retention task.
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut retention_interval = interval(self.every);

            loop {
                retention_interval.tick().await;

                tracing::info!("Starting scheduled error log retention");
                let summary = self.run_once().await;
                tracing::info!(
                    error_logs_deleted = summary.error_logs_deleted,
                    stale_uploads_recovered = summary.stale_uploads_recovered,
                    "Retention pass completed"
                );
            }
        })
    }

    /// One retention pass. Each step's failure is logged and does not stop the other.
    #[tracing::instrument(skip(self), fields(retention.days = self.retention_days))]
    pub async fn run_once(&self) -> RetentionSummary {
        let error_logs_deleted = match self
            .statistics
            .cleanup_old_error_logs(self.retention_days)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(error = %e, "Failed to clean up old error logs");
                0
            }
        };

        let stale_uploads_recovered = match self.recovery.reconcile_stale(self.stale_after).await {
            Ok(reports) => reports.len(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to reconcile stale uploads");
                0
            }
        };

        RetentionSummary {
            error_logs_deleted,
            stale_uploads_recovered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use filehost_core::models::{AttemptStatus, FileRecord, RequestContext, UploadAttempt};
    use filehost_core::ErrorType;
    use filehost_db::MemoryMetadataStore;
    use filehost_storage::LocalStorage;
    use tempfile::tempdir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_run_once_prunes_logs_and_stale_records() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(
            LocalStorage::new(dir.path().join("files"), dir.path().join("tmp"))
                .await
                .unwrap(),
        );
        let store = Arc::new(MemoryMetadataStore::new());

        let mut session = store.begin().await.unwrap();
        let mut old_attempt = UploadAttempt::finished(
            Uuid::new_v4(),
            AttemptStatus::Failed,
            &RequestContext::default(),
            Utc::now(),
        );
        old_attempt.error_id = Some(old_attempt.id);
        old_attempt.error_type = Some(ErrorType::StorageError);
        old_attempt.ended_at = Utc::now() - chrono::Duration::days(90);
        store.record_attempt(&mut session, &old_attempt).await.unwrap();

        let id = Uuid::new_v4();
        let mut abandoned = FileRecord::pending(id, "a.bin", "x", "application/octet-stream", None);
        abandoned.created_at = Utc::now() - chrono::Duration::hours(5);
        store.insert_pending(&mut session, &abandoned).await.unwrap();
        store.commit(session).await.unwrap();

        let service = RetentionService::new(
            StatisticsAggregator::new(store.clone()),
            RecoveryExecutor::new(store.clone(), storage),
            30,
            chrono::Duration::hours(1),
            Duration::from_secs(3600),
        );

        let first = service.run_once().await;
        assert_eq!(first.error_logs_deleted, 1);
        assert_eq!(first.stale_uploads_recovered, 1);
        assert!(store.records().await.is_empty());

        let second = service.run_once().await;
        assert_eq!(second, RetentionSummary::default());
    }
}
