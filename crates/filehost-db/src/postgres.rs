//! PostgreSQL metadata store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filehost_core::models::{CompletedUpload, FileRecord, UploadAttempt};
use filehost_core::{ErrorType, MetadataError};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::store::{MetadataResult, MetadataStore};

const FILE_RECORD_COLUMNS: &str = "file_uuid, original_filename, storage_path, file_size, \
     content_type, content_hash, status, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresMetadataStore {
    pool: PgPool,
}

impl PostgresMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    type Session = Transaction<'static, Postgres>;

    async fn begin(&self) -> MetadataResult<Self::Session> {
        self.pool.begin().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to begin database transaction");
            MetadataError::from(e)
        })
    }

    async fn commit(&self, session: Self::Session) -> MetadataResult<()> {
        session.commit().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to commit database transaction");
            MetadataError::from(e)
        })
    }

    async fn rollback(&self, session: Self::Session) -> MetadataResult<()> {
        session.rollback().await.map_err(MetadataError::from)
    }

    #[tracing::instrument(skip(self, session, record), fields(
        db.system = "postgresql",
        db.table = "file_records",
        db.operation = "insert",
        db.record_id = %record.file_uuid
    ))]
    async fn insert_pending(
        &self,
        session: &mut Self::Session,
        record: &FileRecord,
    ) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO file_records (
                file_uuid, original_filename, storage_path, file_size,
                content_type, content_hash, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.file_uuid)
        .bind(&record.original_filename)
        .bind(&record.storage_path)
        .bind(record.file_size)
        .bind(&record.content_type)
        .bind(&record.content_hash)
        .bind(record.status)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut **session)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, session), fields(
        db.table = "file_records",
        db.operation = "select",
        db.record_id = %file_uuid
    ))]
    async fn get_by_uuid(
        &self,
        session: &mut Self::Session,
        file_uuid: Uuid,
    ) -> MetadataResult<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {} FROM file_records WHERE file_uuid = $1",
            FILE_RECORD_COLUMNS
        ))
        .bind(file_uuid)
        .fetch_optional(&mut **session)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self, session), fields(db.table = "file_records", db.operation = "select"))]
    async fn find_success_by_hash(
        &self,
        session: &mut Self::Session,
        content_hash: &str,
    ) -> MetadataResult<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {} FROM file_records WHERE content_hash = $1 AND status = 'success'",
            FILE_RECORD_COLUMNS
        ))
        .bind(content_hash)
        .fetch_optional(&mut **session)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self, session, completed), fields(
        db.table = "file_records",
        db.operation = "update",
        db.record_id = %file_uuid
    ))]
    async fn mark_success(
        &self,
        session: &mut Self::Session,
        file_uuid: Uuid,
        completed: &CompletedUpload,
    ) -> MetadataResult<FileRecord> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            r#"
            UPDATE file_records
            SET status = 'success', file_size = $2, content_hash = $3, updated_at = NOW()
            WHERE file_uuid = $1
            RETURNING {}
            "#,
            FILE_RECORD_COLUMNS
        ))
        .bind(file_uuid)
        .bind(completed.file_size)
        .bind(&completed.content_hash)
        .fetch_optional(&mut **session)
        .await?;

        record.ok_or_else(|| MetadataError::NotFound(format!("file record {}", file_uuid)))
    }

    #[tracing::instrument(skip(self, session), fields(
        db.table = "file_records",
        db.operation = "delete",
        db.record_id = %file_uuid
    ))]
    async fn delete(&self, session: &mut Self::Session, file_uuid: Uuid) -> MetadataResult<bool> {
        let result = sqlx::query("DELETE FROM file_records WHERE file_uuid = $1")
            .bind(file_uuid)
            .execute(&mut **session)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, session), fields(db.table = "file_records", db.operation = "select_list"))]
    async fn list_stale_pending(
        &self,
        session: &mut Self::Session,
        before: DateTime<Utc>,
    ) -> MetadataResult<Vec<FileRecord>> {
        let records = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {} FROM file_records WHERE status = 'pending' AND created_at < $1 ORDER BY created_at",
            FILE_RECORD_COLUMNS
        ))
        .bind(before)
        .fetch_all(&mut **session)
        .await?;

        Ok(records)
    }

    #[tracing::instrument(skip(self, session, attempt), fields(
        db.table = "upload_attempts",
        db.operation = "insert",
        db.record_id = %attempt.id,
        file_uuid = %attempt.file_uuid
    ))]
    async fn record_attempt(
        &self,
        session: &mut Self::Session,
        attempt: &UploadAttempt,
    ) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_attempts (
                id, file_uuid, status, client_ip, user_agent, started_at, ended_at,
                error_id, error_type, error_message, context
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.file_uuid)
        .bind(attempt.status)
        .bind(&attempt.client_ip)
        .bind(&attempt.user_agent)
        .bind(attempt.started_at)
        .bind(attempt.ended_at)
        .bind(attempt.error_id)
        .bind(attempt.error_type)
        .bind(&attempt.error_message)
        .bind(&attempt.context)
        .execute(&mut **session)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, session), fields(db.table = "upload_attempts", db.operation = "aggregate"))]
    async fn count_failed_by_type(
        &self,
        session: &mut Self::Session,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> MetadataResult<Vec<(ErrorType, i64)>> {
        let rows = sqlx::query_as::<_, (ErrorType, i64)>(
            r#"
            SELECT COALESCE(error_type, 'UNKNOWN_ERROR'::upload_error_type) AS error_type,
                   COUNT(*) AS failed
            FROM upload_attempts
            WHERE status = 'failed' AND ended_at >= $1 AND ended_at <= $2
            GROUP BY 1
            "#,
        )
        .bind(since)
        .bind(until)
        .fetch_all(&mut **session)
        .await?;

        Ok(rows)
    }

    #[tracing::instrument(skip(self, session), fields(db.table = "upload_attempts", db.operation = "delete"))]
    async fn delete_failed_attempts_before(
        &self,
        session: &mut Self::Session,
        cutoff: DateTime<Utc>,
    ) -> MetadataResult<u64> {
        let result =
            sqlx::query("DELETE FROM upload_attempts WHERE status = 'failed' AND ended_at < $1")
                .bind(cutoff)
                .execute(&mut **session)
                .await?;

        Ok(result.rows_affected())
    }
}
