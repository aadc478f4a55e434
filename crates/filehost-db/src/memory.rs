//! In-memory metadata store.
//!
//! Sessions are serialized: `begin` takes an owned lock on the whole state and
//! works on a private copy that replaces the shared state on commit. This gives
//! serializable isolation, so a task must never hold two sessions at once.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filehost_core::constants::CONTENT_HASH_UNIQUE_CONSTRAINT;
use filehost_core::models::{
    AttemptStatus, CompletedUpload, FileRecord, FileStatus, UploadAttempt,
};
use filehost_core::{ErrorType, MetadataError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::store::{MetadataResult, MetadataStore};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    records: HashMap<Uuid, FileRecord>,
    attempts: Vec<UploadAttempt>,
}

pub struct MemorySession {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed file records, oldest first.
    pub async fn records(&self) -> Vec<FileRecord> {
        let state = self.state.lock().await;
        let mut records: Vec<_> = state.records.values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// Committed upload attempts in insertion order.
    pub async fn attempts(&self) -> Vec<UploadAttempt> {
        self.state.lock().await.attempts.clone()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    type Session = MemorySession;

    async fn begin(&self) -> MetadataResult<Self::Session> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(MemorySession { guard, working })
    }

    async fn commit(&self, session: Self::Session) -> MetadataResult<()> {
        let MemorySession { mut guard, working } = session;
        *guard = working;
        Ok(())
    }

    async fn rollback(&self, _session: Self::Session) -> MetadataResult<()> {
        Ok(())
    }

    async fn insert_pending(
        &self,
        session: &mut Self::Session,
        record: &FileRecord,
    ) -> MetadataResult<()> {
        if session.working.records.contains_key(&record.file_uuid) {
            return Err(MetadataError::UniqueViolation {
                constraint: "file_records_pkey".to_string(),
            });
        }
        if record.file_size < 0 {
            return Err(MetadataError::Integrity(format!(
                "file_size {} violates file_records_file_size_check",
                record.file_size
            )));
        }
        session
            .working
            .records
            .insert(record.file_uuid, record.clone());
        Ok(())
    }

    async fn get_by_uuid(
        &self,
        session: &mut Self::Session,
        file_uuid: Uuid,
    ) -> MetadataResult<Option<FileRecord>> {
        Ok(session.working.records.get(&file_uuid).cloned())
    }

    async fn find_success_by_hash(
        &self,
        session: &mut Self::Session,
        content_hash: &str,
    ) -> MetadataResult<Option<FileRecord>> {
        Ok(session
            .working
            .records
            .values()
            .find(|r| r.is_success() && r.content_hash.as_deref() == Some(content_hash))
            .cloned())
    }

    async fn mark_success(
        &self,
        session: &mut Self::Session,
        file_uuid: Uuid,
        completed: &CompletedUpload,
    ) -> MetadataResult<FileRecord> {
        let taken = session.working.records.values().any(|r| {
            r.file_uuid != file_uuid
                && r.is_success()
                && r.content_hash.as_deref() == Some(completed.content_hash.as_str())
        });
        if taken {
            return Err(MetadataError::UniqueViolation {
                constraint: CONTENT_HASH_UNIQUE_CONSTRAINT.to_string(),
            });
        }

        let record = session
            .working
            .records
            .get_mut(&file_uuid)
            .ok_or_else(|| MetadataError::NotFound(format!("file record {}", file_uuid)))?;
        record.status = FileStatus::Success;
        record.file_size = completed.file_size;
        record.content_hash = Some(completed.content_hash.clone());
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete(&self, session: &mut Self::Session, file_uuid: Uuid) -> MetadataResult<bool> {
        Ok(session.working.records.remove(&file_uuid).is_some())
    }

    async fn list_stale_pending(
        &self,
        session: &mut Self::Session,
        before: DateTime<Utc>,
    ) -> MetadataResult<Vec<FileRecord>> {
        let mut stale: Vec<_> = session
            .working
            .records
            .values()
            .filter(|r| r.status == FileStatus::Pending && r.created_at < before)
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.created_at);
        Ok(stale)
    }

    async fn record_attempt(
        &self,
        session: &mut Self::Session,
        attempt: &UploadAttempt,
    ) -> MetadataResult<()> {
        session.working.attempts.push(attempt.clone());
        Ok(())
    }

    async fn count_failed_by_type(
        &self,
        session: &mut Self::Session,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> MetadataResult<Vec<(ErrorType, i64)>> {
        let mut counts: HashMap<ErrorType, i64> = HashMap::new();
        for attempt in session.working.attempts.iter().filter(|a| {
            a.status == AttemptStatus::Failed && a.ended_at >= since && a.ended_at <= until
        }) {
            let error_type = attempt.error_type.unwrap_or(ErrorType::UnknownError);
            *counts.entry(error_type).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn delete_failed_attempts_before(
        &self,
        session: &mut Self::Session,
        cutoff: DateTime<Utc>,
    ) -> MetadataResult<u64> {
        let before = session.working.attempts.len();
        session
            .working
            .attempts
            .retain(|a| !(a.status == AttemptStatus::Failed && a.ended_at < cutoff));
        Ok((before - session.working.attempts.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use filehost_core::models::RequestContext;

    fn pending(name: &str) -> FileRecord {
        let id = Uuid::new_v4();
        FileRecord::pending(id, name, format!("{}.bin", id), "application/octet-stream", None)
    }

    fn completed(hash: &str) -> CompletedUpload {
        CompletedUpload {
            file_size: 3,
            content_hash: hash.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_negative_size() {
        let store = MemoryMetadataStore::new();
        let mut record = pending("neg.bin");
        record.file_size = -1;

        let mut session = store.begin().await.unwrap();
        let err = store.insert_pending(&mut session, &record).await.unwrap_err();
        assert!(matches!(err, MetadataError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let store = MemoryMetadataStore::new();
        let record = pending("a.txt");

        let mut session = store.begin().await.unwrap();
        store.insert_pending(&mut session, &record).await.unwrap();
        store.rollback(session).await.unwrap();

        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_session_discards_changes() {
        let store = MemoryMetadataStore::new();
        {
            let mut session = store.begin().await.unwrap();
            store.insert_pending(&mut session, &pending("a.txt")).await.unwrap();
        }
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_mark_success_enforces_unique_hash() {
        let store = MemoryMetadataStore::new();
        let first = pending("a.txt");
        let second = pending("b.txt");

        let mut session = store.begin().await.unwrap();
        store.insert_pending(&mut session, &first).await.unwrap();
        store.insert_pending(&mut session, &second).await.unwrap();
        let promoted = store
            .mark_success(&mut session, first.file_uuid, &completed("abc"))
            .await
            .unwrap();
        assert!(promoted.is_success());

        let err = store
            .mark_success(&mut session, second.file_uuid, &completed("abc"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation_on(CONTENT_HASH_UNIQUE_CONSTRAINT));
        store.commit(session).await.unwrap();

        let mut session = store.begin().await.unwrap();
        let winner = store
            .find_success_by_hash(&mut session, "abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(winner.file_uuid, first.file_uuid);
    }

    #[tokio::test]
    async fn test_mark_success_missing_record() {
        let store = MemoryMetadataStore::new();
        let mut session = store.begin().await.unwrap();
        let err = store
            .mark_success(&mut session, Uuid::new_v4(), &completed("abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_attempt_counts_and_cleanup() {
        let store = MemoryMetadataStore::new();
        let now = Utc::now();
        let ctx = RequestContext::default();

        let mut session = store.begin().await.unwrap();
        for (error_type, age_days) in [
            (ErrorType::NetworkError, 1),
            (ErrorType::NetworkError, 2),
            (ErrorType::ValidationError, 40),
        ] {
            let mut attempt =
                UploadAttempt::finished(Uuid::new_v4(), AttemptStatus::Failed, &ctx, now);
            attempt.error_id = Some(attempt.id);
            attempt.error_type = Some(error_type);
            attempt.ended_at = now - Duration::days(age_days);
            store.record_attempt(&mut session, &attempt).await.unwrap();
        }
        let ok = UploadAttempt::finished(Uuid::new_v4(), AttemptStatus::Success, &ctx, now);
        store.record_attempt(&mut session, &ok).await.unwrap();
        store.commit(session).await.unwrap();

        let mut session = store.begin().await.unwrap();
        let counts = store
            .count_failed_by_type(&mut session, now - Duration::days(7), now)
            .await
            .unwrap();
        assert_eq!(counts, vec![(ErrorType::NetworkError, 2)]);

        let deleted = store
            .delete_failed_attempts_before(&mut session, now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        store.commit(session).await.unwrap();

        assert_eq!(store.attempts().await.len(), 3);
    }

    #[tokio::test]
    async fn test_list_stale_pending() {
        let store = MemoryMetadataStore::new();
        let mut old = pending("old.txt");
        old.created_at = Utc::now() - Duration::hours(3);
        let fresh = pending("fresh.txt");

        let mut session = store.begin().await.unwrap();
        store.insert_pending(&mut session, &old).await.unwrap();
        store.insert_pending(&mut session, &fresh).await.unwrap();
        let stale = store
            .list_stale_pending(&mut session, Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].file_uuid, old.file_uuid);
    }
}
