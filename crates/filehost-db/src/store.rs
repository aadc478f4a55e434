use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filehost_core::models::{CompletedUpload, FileRecord, UploadAttempt};
use filehost_core::{ErrorType, MetadataError};
use uuid::Uuid;

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Transactional record store for file metadata and upload attempts.
///
/// Implementations must be safe to share between concurrent uploads. A
/// session is exclusively owned by one caller and ends with exactly one of
/// [`commit`](MetadataStore::commit) or [`rollback`](MetadataStore::rollback);
/// dropping it without either discards its changes.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    type Session: Send;

    async fn begin(&self) -> MetadataResult<Self::Session>;

    async fn commit(&self, session: Self::Session) -> MetadataResult<()>;

    async fn rollback(&self, session: Self::Session) -> MetadataResult<()>;

    /// Insert a new record. The record's `file_uuid` must not exist yet.
    async fn insert_pending(
        &self,
        session: &mut Self::Session,
        record: &FileRecord,
    ) -> MetadataResult<()>;

    async fn get_by_uuid(
        &self,
        session: &mut Self::Session,
        file_uuid: Uuid,
    ) -> MetadataResult<Option<FileRecord>>;

    /// The `success` record holding `content_hash`, if any.
    async fn find_success_by_hash(
        &self,
        session: &mut Self::Session,
        content_hash: &str,
    ) -> MetadataResult<Option<FileRecord>>;

    /// Promote a pending record to `success`.
    ///
    /// Fails with [`MetadataError::UniqueViolation`] naming
    /// `CONTENT_HASH_UNIQUE_CONSTRAINT` when another `success` record already
    /// holds the same hash, and with [`MetadataError::NotFound`] when the record
    /// is gone.
    async fn mark_success(
        &self,
        session: &mut Self::Session,
        file_uuid: Uuid,
        completed: &CompletedUpload,
    ) -> MetadataResult<FileRecord>;

    /// Delete a record. Returns whether a row was removed.
    async fn delete(&self, session: &mut Self::Session, file_uuid: Uuid) -> MetadataResult<bool>;

    /// `pending` records created before `before`.
    async fn list_stale_pending(
        &self,
        session: &mut Self::Session,
        before: DateTime<Utc>,
    ) -> MetadataResult<Vec<FileRecord>>;

    async fn record_attempt(
        &self,
        session: &mut Self::Session,
        attempt: &UploadAttempt,
    ) -> MetadataResult<()>;

    /// Failed attempts ended within `[since, until]`, grouped by error type.
    async fn count_failed_by_type(
        &self,
        session: &mut Self::Session,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> MetadataResult<Vec<(ErrorType, i64)>>;

    /// Delete failed attempts ended before `cutoff`. Returns the count deleted.
    async fn delete_failed_attempts_before(
        &self,
        session: &mut Self::Session,
        cutoff: DateTime<Utc>,
    ) -> MetadataResult<u64>;
}
