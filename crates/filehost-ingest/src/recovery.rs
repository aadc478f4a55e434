//! Post-failure cleanup of storage and metadata.

use std::sync::Arc;

use chrono::Utc;
use filehost_db::{MetadataResult, MetadataStore};
use filehost_storage::{shard, Root, Storage, StoragePath, StorageResult};
use serde::Serialize;
use uuid::Uuid;

/// What one `recover` call did. Step failures are recorded, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub file_uuid: Uuid,
    pub temp_files_removed: usize,
    pub final_files_removed: usize,
    pub dirs_pruned: usize,
    pub record_deleted: bool,
    /// The record was already `success`; its bytes and row were left alone.
    pub kept_committed: bool,
    pub errors: Vec<String>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn files_removed(&self) -> usize {
        self.temp_files_removed + self.final_files_removed
    }
}

enum RollbackOutcome {
    Absent,
    Deleted,
    KeptCommitted,
}

pub struct RecoveryExecutor<M: MetadataStore> {
    store: Arc<M>,
    storage: Arc<dyn Storage>,
}

impl<M: MetadataStore> Clone for RecoveryExecutor<M> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            storage: self.storage.clone(),
        }
    }
}

impl<M: MetadataStore> RecoveryExecutor<M> {
    pub fn new(store: Arc<M>, storage: Arc<dyn Storage>) -> Self {
        Self { store, storage }
    }

    /// Remove every byte and any non-`success` record belonging to `file_uuid`.
    ///
    /// Filesystem cleanup runs first, then metadata rollback; each step runs
    /// whether or not the other failed. Safe to call repeatedly.
    #[tracing::instrument(skip(self), fields(file_uuid = %file_uuid))]
    pub async fn recover(&self, file_uuid: Uuid) -> RecoveryReport {
        let mut report = RecoveryReport {
            file_uuid,
            ..Default::default()
        };

        // Final bytes of a committed record are live; everything else is orphaned.
        // With the status unknown the final bytes stay for a later pass.
        let keep_final = match self.is_committed(file_uuid).await {
            Ok(committed) => committed,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read record status, keeping final bytes");
                report.errors.push(format!("status lookup: {}", e));
                report
                    .errors
                    .push("shard cleanup skipped: record status unknown".to_string());
                true
            }
        };

        self.cleanup_files(file_uuid, keep_final, &mut report).await;

        match self.rollback_metadata(file_uuid).await {
            Ok(RollbackOutcome::Deleted) => report.record_deleted = true,
            Ok(RollbackOutcome::KeptCommitted) => report.kept_committed = true,
            Ok(RollbackOutcome::Absent) => {}
            Err(e) => {
                tracing::error!(error = %e, "Metadata rollback failed");
                report.errors.push(format!("metadata rollback: {}", e));
            }
        }

        if report.is_clean() {
            tracing::info!(
                temp_files_removed = report.temp_files_removed,
                final_files_removed = report.final_files_removed,
                dirs_pruned = report.dirs_pruned,
                record_deleted = report.record_deleted,
                "Recovery completed"
            );
        } else {
            tracing::warn!(errors = ?report.errors, "Recovery completed with errors");
        }

        report
    }

    /// Recover every `pending` record created more than `older_than` ago.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_stale(
        &self,
        older_than: chrono::Duration,
    ) -> MetadataResult<Vec<RecoveryReport>> {
        let cutoff = Utc::now() - older_than;
        let mut session = self.store.begin().await?;
        let stale = self.store.list_stale_pending(&mut session, cutoff).await?;
        self.store.rollback(session).await?;

        if !stale.is_empty() {
            tracing::info!(count = stale.len(), cutoff = %cutoff, "Reconciling stale pending uploads");
        }

        let mut reports = Vec::with_capacity(stale.len());
        for record in stale {
            reports.push(self.recover(record.file_uuid).await);
        }
        Ok(reports)
    }

    async fn is_committed(&self, file_uuid: Uuid) -> MetadataResult<bool> {
        let mut session = self.store.begin().await?;
        let record = self.store.get_by_uuid(&mut session, file_uuid).await?;
        self.store.rollback(session).await?;
        Ok(record.is_some_and(|r| r.is_success()))
    }

    async fn cleanup_files(&self, file_uuid: Uuid, keep_final: bool, report: &mut RecoveryReport) {
        let pattern = shard::file_name_pattern(&file_uuid);

        match self.remove_matching(Root::Temp, "", &pattern).await {
            Ok(removed) => report.temp_files_removed = removed,
            Err(e) => {
                tracing::error!(error = %e, "Temp file cleanup failed");
                report.errors.push(format!("temp cleanup: {}", e));
            }
        }

        if keep_final {
            return;
        }

        let shard_dir = shard::shard_dir(&file_uuid);
        match self.remove_matching(Root::Final, &shard_dir, &pattern).await {
            Ok(0) => {}
            Ok(removed) => {
                report.final_files_removed = removed;
                match self.storage.prune_empty_dirs(Root::Final, &shard_dir).await {
                    Ok(pruned) => report.dirs_pruned = pruned,
                    Err(e) => {
                        tracing::warn!(error = %e, shard = %shard_dir, "Shard pruning failed");
                        report.errors.push(format!("shard prune: {}", e));
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, shard = %shard_dir, "Shard file cleanup failed");
                report.errors.push(format!("shard cleanup: {}", e));
            }
        }
    }

    /// Delete every match, continuing past individual failures.
    async fn remove_matching(&self, root: Root, dir: &str, pattern: &str) -> StorageResult<usize> {
        let matches: Vec<StoragePath> = self.storage.find(root, dir, pattern).await?;
        let mut removed = 0;
        let mut first_error = None;

        for path in matches {
            match self.storage.delete(&path).await {
                Ok(()) => {
                    tracing::debug!(path = %path, "Removed orphaned file");
                    removed += 1;
                }
                Err(e) => {
                    tracing::error!(path = %path, error = %e, "Failed to remove orphaned file");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    async fn rollback_metadata(&self, file_uuid: Uuid) -> MetadataResult<RollbackOutcome> {
        let mut session = self.store.begin().await?;
        let outcome = match self.store.get_by_uuid(&mut session, file_uuid).await? {
            None => RollbackOutcome::Absent,
            Some(record) if record.is_success() => RollbackOutcome::KeptCommitted,
            Some(_) => {
                self.store.delete(&mut session, file_uuid).await?;
                RollbackOutcome::Deleted
            }
        };

        match outcome {
            RollbackOutcome::Deleted => self.store.commit(session).await?,
            _ => self.store.rollback(session).await?,
        }
        Ok(outcome)
    }
}
