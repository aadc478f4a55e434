//! Upload orchestration.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use filehost_core::constants::CONTENT_HASH_UNIQUE_CONSTRAINT;
use filehost_core::models::{
    AttemptStatus, CompletedUpload, FileRecord, RequestContext, UploadAttempt, UploadMetadata,
};
use filehost_core::MetadataError;
use filehost_db::{MetadataResult, MetadataStore};
use filehost_storage::{shard, ByteStream, Root, Storage, StorageError, StoragePath};
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::Instrument;
use uuid::Uuid;

use crate::audit::{AuditLogger, LogSink, StatisticsAggregator};
use crate::classifier::classify;
use crate::fault::UploadFault;
use crate::handler::{UploadErrorHandler, UploadErrorResponse};
use crate::hashing::HashingReader;
use crate::policy::{PolicyViolation, UploadPolicy};
use crate::recovery::RecoveryExecutor;

/// A successful ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The upload's bytes were stored under a new record.
    Stored(FileRecord),
    /// Identical content was already stored; the upload's own bytes and
    /// record were discarded and `file` is the existing record.
    Deduplicated {
        file: FileRecord,
        discarded_uuid: Uuid,
    },
}

impl IngestOutcome {
    pub fn file(&self) -> &FileRecord {
        match self {
            IngestOutcome::Stored(file) | IngestOutcome::Deduplicated { file, .. } => file,
        }
    }

    pub fn into_file(self) -> FileRecord {
        match self {
            IngestOutcome::Stored(file) | IngestOutcome::Deduplicated { file, .. } => file,
        }
    }

    pub fn is_deduplicated(&self) -> bool {
        matches!(self, IngestOutcome::Deduplicated { .. })
    }
}

pub struct Download {
    pub file: FileRecord,
    pub stream: ByteStream,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Drives uploads through validate, hash, store and persist.
///
/// Faults from any stage surface at one place, [`ingest`](Self::ingest), and
/// go through [`UploadErrorHandler`]. When `ingest` returns, the upload's
/// record is either `success` or gone.
pub struct FileUploadCoordinator<M: MetadataStore> {
    store: Arc<M>,
    storage: Arc<dyn Storage>,
    policy: UploadPolicy,
    recovery: RecoveryExecutor<M>,
    handler: UploadErrorHandler<M>,
}

impl<M: MetadataStore> FileUploadCoordinator<M> {
    pub fn new(
        store: Arc<M>,
        storage: Arc<dyn Storage>,
        policy: UploadPolicy,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let recovery = RecoveryExecutor::new(store.clone(), storage.clone());
        let audit = AuditLogger::new(store.clone(), sink);
        let handler = UploadErrorHandler::new(recovery.clone(), audit);
        Self {
            store,
            storage,
            policy,
            recovery,
            handler,
        }
    }

    pub fn recovery(&self) -> &RecoveryExecutor<M> {
        &self.recovery
    }

    pub fn error_handler(&self) -> &UploadErrorHandler<M> {
        &self.handler
    }

    pub fn statistics(&self) -> StatisticsAggregator<M> {
        StatisticsAggregator::new(self.store.clone())
    }

    /// Ingest one upload stream.
    pub async fn ingest<R>(
        &self,
        reader: R,
        metadata: UploadMetadata,
        ctx: &RequestContext,
    ) -> Result<IngestOutcome, UploadErrorResponse>
    where
        R: AsyncRead + Send + Unpin,
    {
        let started_at = Utc::now();
        let file_uuid = Uuid::new_v4();
        let span = tracing::info_span!(
            "ingest",
            file_uuid = %file_uuid,
            filename = %metadata.original_filename,
            content_type = %metadata.content_type,
            client_ip = %ctx.client_ip_or_unknown()
        );

        async move {
            match self.run(file_uuid, reader, &metadata, ctx, started_at).await {
                Ok(outcome) => Ok(outcome),
                Err(fault) if fault.duplicate_content_hash().is_some() => {
                    self.resolve_duplicate(fault, file_uuid, ctx, started_at)
                        .await
                }
                Err(fault) => Err(self.handler.handle_upload_error(fault, file_uuid, ctx).await),
            }
        }
        .instrument(span)
        .await
    }

    /// The committed record for `file_uuid`; pending or unknown uploads are `None`.
    pub async fn get_file(&self, file_uuid: Uuid) -> MetadataResult<Option<FileRecord>> {
        let mut session = self.store.begin().await?;
        let record = self.store.get_by_uuid(&mut session, file_uuid).await?;
        self.store.rollback(session).await?;
        Ok(record.filter(FileRecord::is_success))
    }

    pub async fn open_download(&self, file_uuid: Uuid) -> Result<Option<Download>, DownloadError> {
        let Some(file) = self.get_file(file_uuid).await? else {
            return Ok(None);
        };
        let path = StoragePath::new(Root::Final, file.storage_path.clone());
        let stream = self.storage.read_stream(&path).await?;
        Ok(Some(Download { file, stream }))
    }

    async fn run<R>(
        &self,
        file_uuid: Uuid,
        reader: R,
        metadata: &UploadMetadata,
        ctx: &RequestContext,
        started_at: DateTime<Utc>,
    ) -> Result<IngestOutcome, UploadFault>
    where
        R: AsyncRead + Send + Unpin,
    {
        let extension = shard::extension_for(&metadata.original_filename);
        let final_path = StoragePath::final_for(&file_uuid, &extension);
        let temp_path = StoragePath::temp_for(&file_uuid);

        let record = FileRecord::pending(
            file_uuid,
            metadata.original_filename.clone(),
            final_path.key.clone(),
            metadata.content_type.clone(),
            metadata.declared_size,
        );
        let mut session = self.store.begin().await?;
        self.store.insert_pending(&mut session, &record).await?;
        self.store.commit(session).await?;

        self.policy.check(metadata)?;

        let write_start = Instant::now();
        let mut body = HashingReader::new(reader, Some(self.policy.max_file_size()));
        let written = match self.storage.write(&temp_path, &mut body).await {
            Ok(written) => written,
            Err(e) => return Err(self.write_fault(&mut body, e)),
        };
        let content_hash = body.finalize_hex();
        tracing::debug!(
            size_bytes = written,
            content_hash = %content_hash,
            duration_ms = write_start.elapsed().as_secs_f64() * 1000.0,
            "Upload body stored in temp root"
        );

        if let Some(existing) = self.find_by_hash(&content_hash).await? {
            tracing::info!(
                existing_uuid = %existing.file_uuid,
                "Identical content already stored, discarding upload"
            );
            self.recovery.recover(file_uuid).await;
            self.record_reference(file_uuid, &existing, ctx, started_at)
                .await;
            return Ok(IngestOutcome::Deduplicated {
                file: existing,
                discarded_uuid: file_uuid,
            });
        }

        self.storage.rename(&temp_path, &final_path).await?;

        let completed = CompletedUpload {
            file_size: i64::try_from(written).unwrap_or(i64::MAX),
            content_hash,
        };
        let stored = self
            .commit_success(file_uuid, &completed, ctx, started_at)
            .await?;

        tracing::info!(
            size_bytes = stored.file_size,
            storage_path = %stored.storage_path,
            "Upload stored"
        );
        Ok(IngestOutcome::Stored(stored))
    }

    /// Tell a size-cap or client-stream failure apart from a storage failure.
    fn write_fault<R>(&self, body: &mut HashingReader<R>, err: StorageError) -> UploadFault {
        if body.limit_exceeded() {
            return PolicyViolation::FileTooLarge {
                size: body.bytes_read(),
                max: self.policy.max_file_size(),
            }
            .into();
        }
        match body.take_source_error() {
            Some(source) => UploadFault::ClientStream(source),
            None => UploadFault::Storage(err),
        }
    }

    async fn commit_success(
        &self,
        file_uuid: Uuid,
        completed: &CompletedUpload,
        ctx: &RequestContext,
        started_at: DateTime<Utc>,
    ) -> Result<FileRecord, UploadFault> {
        let mut session = self.store.begin().await?;
        let stored = self
            .store
            .mark_success(&mut session, file_uuid, completed)
            .await
            .map_err(|e| duplicate_or(e, &completed.content_hash))?;

        let attempt = UploadAttempt::finished(file_uuid, AttemptStatus::Success, ctx, started_at);
        self.store.record_attempt(&mut session, &attempt).await?;
        self.store
            .commit(session)
            .await
            .map_err(|e| duplicate_or(e, &completed.content_hash))?;
        Ok(stored)
    }

    /// Answer a lost content-hash race with the winner's record.
    async fn resolve_duplicate(
        &self,
        fault: UploadFault,
        file_uuid: Uuid,
        ctx: &RequestContext,
        started_at: DateTime<Utc>,
    ) -> Result<IngestOutcome, UploadErrorResponse> {
        let content_hash = fault.duplicate_content_hash().unwrap_or_default().to_string();
        tracing::info!(
            error_type = %classify(&fault),
            content_hash = %content_hash,
            "Content hash committed concurrently, resolving to existing record"
        );

        self.recovery.recover(file_uuid).await;

        match self.find_by_hash(&content_hash).await {
            Ok(Some(winner)) => {
                self.record_reference(file_uuid, &winner, ctx, started_at)
                    .await;
                Ok(IngestOutcome::Deduplicated {
                    file: winner,
                    discarded_uuid: file_uuid,
                })
            }
            Ok(None) => Err(self.handler.handle_upload_error(fault, file_uuid, ctx).await),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to look up the committed record");
                Err(self.handler.handle_upload_error(fault, file_uuid, ctx).await)
            }
        }
    }

    async fn find_by_hash(&self, content_hash: &str) -> MetadataResult<Option<FileRecord>> {
        let mut session = self.store.begin().await?;
        let existing = self
            .store
            .find_success_by_hash(&mut session, content_hash)
            .await?;
        self.store.rollback(session).await?;
        Ok(existing)
    }

    /// Record a deduplicated attempt. The upload already succeeded, so a
    /// failure here is only logged.
    async fn record_reference(
        &self,
        file_uuid: Uuid,
        existing: &FileRecord,
        ctx: &RequestContext,
        started_at: DateTime<Utc>,
    ) {
        let mut attempt =
            UploadAttempt::finished(file_uuid, AttemptStatus::Deduplicated, ctx, started_at);
        attempt.context = Some(serde_json::json!({
            "deduplicated_to": existing.file_uuid,
        }));

        let result = async {
            let mut session = self.store.begin().await?;
            self.store.record_attempt(&mut session, &attempt).await?;
            self.store.commit(session).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to record deduplicated upload attempt");
        }
    }
}

fn duplicate_or(source: MetadataError, content_hash: &str) -> UploadFault {
    if source.is_unique_violation_on(CONTENT_HASH_UNIQUE_CONSTRAINT) {
        UploadFault::DuplicateContent {
            content_hash: content_hash.to_string(),
            source,
        }
    } else {
        UploadFault::Metadata(source)
    }
}
