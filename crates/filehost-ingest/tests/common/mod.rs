#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filehost_core::models::{CompletedUpload, FileRecord, UploadAttempt, UploadMetadata};
use filehost_core::{ErrorType, MetadataError};
use filehost_db::memory::MemorySession;
use filehost_db::{MemoryMetadataStore, MetadataResult, MetadataStore};
use filehost_ingest::{FileUploadCoordinator, LogSink, UploadPolicy};
use filehost_storage::{
    ByteStream, LocalStorage, Root, Storage, StorageBackend, StorageError, StoragePath,
    StorageResult,
};
use tempfile::TempDir;
use tokio::io::AsyncRead;
use uuid::Uuid;

/// Collects sink lines in memory.
#[derive(Default)]
pub struct CaptureSink {
    lines: StdMutex<Vec<String>>,
}

impl CaptureSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogSink for CaptureSink {
    async fn append(&self, line: &str) -> io::Result<()> {
        self.lines.lock().unwrap().push(line.to_string());
        Ok(())
    }
}

/// A sink whose append panics.
pub struct PanickingSink;

#[async_trait]
impl LogSink for PanickingSink {
    async fn append(&self, _line: &str) -> io::Result<()> {
        panic!("log sink exploded");
    }
}

/// Memory store with injectable faults.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryMetadataStore,
    mark_success_failure: StdMutex<Option<fn() -> MetadataError>>,
    get_by_uuid_failure: StdMutex<Option<fn() -> MetadataError>>,
    hidden_hash_lookups: AtomicUsize,
}

impl FaultyStore {
    /// Fail the next `mark_success` with the given error.
    pub fn fail_next_mark_success(&self, error: fn() -> MetadataError) {
        *self.mark_success_failure.lock().unwrap() = Some(error);
    }

    /// Fail the next `get_by_uuid` with the given error.
    pub fn fail_next_get_by_uuid(&self, error: fn() -> MetadataError) {
        *self.get_by_uuid_failure.lock().unwrap() = Some(error);
    }

    /// Make the next `count` content-hash lookups miss, as if the winning
    /// upload had not committed yet.
    pub fn hide_hash_lookups(&self, count: usize) {
        self.hidden_hash_lookups.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetadataStore for FaultyStore {
    type Session = MemorySession;

    async fn begin(&self) -> MetadataResult<Self::Session> {
        self.inner.begin().await
    }

    async fn commit(&self, session: Self::Session) -> MetadataResult<()> {
        self.inner.commit(session).await
    }

    async fn rollback(&self, session: Self::Session) -> MetadataResult<()> {
        self.inner.rollback(session).await
    }

    async fn insert_pending(
        &self,
        session: &mut Self::Session,
        record: &FileRecord,
    ) -> MetadataResult<()> {
        self.inner.insert_pending(session, record).await
    }

    async fn get_by_uuid(
        &self,
        session: &mut Self::Session,
        file_uuid: Uuid,
    ) -> MetadataResult<Option<FileRecord>> {
        let failure = self.get_by_uuid_failure.lock().unwrap().take();
        if let Some(error) = failure {
            return Err(error());
        }
        self.inner.get_by_uuid(session, file_uuid).await
    }

    async fn find_success_by_hash(
        &self,
        session: &mut Self::Session,
        content_hash: &str,
    ) -> MetadataResult<Option<FileRecord>> {
        let hidden = self
            .hidden_hash_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hidden {
            return Ok(None);
        }
        self.inner.find_success_by_hash(session, content_hash).await
    }

    async fn mark_success(
        &self,
        session: &mut Self::Session,
        file_uuid: Uuid,
        completed: &CompletedUpload,
    ) -> MetadataResult<FileRecord> {
        let failure = self.mark_success_failure.lock().unwrap().take();
        if let Some(error) = failure {
            return Err(error());
        }
        self.inner.mark_success(session, file_uuid, completed).await
    }

    async fn delete(&self, session: &mut Self::Session, file_uuid: Uuid) -> MetadataResult<bool> {
        self.inner.delete(session, file_uuid).await
    }

    async fn list_stale_pending(
        &self,
        session: &mut Self::Session,
        before: DateTime<Utc>,
    ) -> MetadataResult<Vec<FileRecord>> {
        self.inner.list_stale_pending(session, before).await
    }

    async fn record_attempt(
        &self,
        session: &mut Self::Session,
        attempt: &UploadAttempt,
    ) -> MetadataResult<()> {
        self.inner.record_attempt(session, attempt).await
    }

    async fn count_failed_by_type(
        &self,
        session: &mut Self::Session,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> MetadataResult<Vec<(ErrorType, i64)>> {
        self.inner.count_failed_by_type(session, since, until).await
    }

    async fn delete_failed_attempts_before(
        &self,
        session: &mut Self::Session,
        cutoff: DateTime<Utc>,
    ) -> MetadataResult<u64> {
        self.inner.delete_failed_attempts_before(session, cutoff).await
    }
}

/// Local storage whose writes fail with an OS error after creating the file.
pub struct FailingWriteStorage {
    pub inner: LocalStorage,
    pub os_error: i32,
}

#[async_trait]
impl Storage for FailingWriteStorage {
    async fn write(
        &self,
        path: &StoragePath,
        _reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<u64> {
        let mut partial: &[u8] = b"partial";
        self.inner.write(path, &mut partial).await?;
        Err(StorageError::WriteFailed {
            path: path.to_string(),
            source: io::Error::from_raw_os_error(self.os_error),
        })
    }

    async fn rename(&self, from: &StoragePath, to: &StoragePath) -> StorageResult<()> {
        self.inner.rename(from, to).await
    }

    async fn delete(&self, path: &StoragePath) -> StorageResult<()> {
        self.inner.delete(path).await
    }

    async fn exists(&self, path: &StoragePath) -> StorageResult<bool> {
        self.inner.exists(path).await
    }

    async fn find(&self, root: Root, dir: &str, pattern: &str) -> StorageResult<Vec<StoragePath>> {
        self.inner.find(root, dir, pattern).await
    }

    async fn prune_empty_dirs(&self, root: Root, dir: &str) -> StorageResult<usize> {
        self.inner.prune_empty_dirs(root, dir).await
    }

    async fn read_stream(&self, path: &StoragePath) -> StorageResult<ByteStream> {
        self.inner.read_stream(path).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}

pub struct Harness<M: MetadataStore> {
    pub dir: TempDir,
    pub store: Arc<M>,
    pub storage: Arc<LocalStorage>,
    pub sink: Arc<CaptureSink>,
    pub coordinator: FileUploadCoordinator<M>,
}

pub async fn local_storage(dir: &TempDir) -> LocalStorage {
    LocalStorage::new(dir.path().join("files"), dir.path().join("tmp"))
        .await
        .unwrap()
}

pub async fn harness<M: MetadataStore + Default>(policy: UploadPolicy) -> Harness<M> {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(local_storage(&dir).await);
    let store = Arc::new(M::default());
    let sink = Arc::new(CaptureSink::default());
    let coordinator =
        FileUploadCoordinator::new(store.clone(), storage.clone(), policy, sink.clone());
    Harness {
        dir,
        store,
        storage,
        sink,
        coordinator,
    }
}

pub fn default_policy() -> UploadPolicy {
    UploadPolicy::new(1024 * 1024, vec![])
}

pub fn metadata(name: &str, content_type: &str) -> UploadMetadata {
    UploadMetadata {
        original_filename: name.to_string(),
        content_type: content_type.to_string(),
        declared_size: None,
    }
}

/// Every regular file below `root`, recursively.
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

/// Files under either root whose name starts with `file_uuid`.
pub fn files_for(storage: &LocalStorage, file_uuid: &Uuid) -> Vec<PathBuf> {
    let prefix = file_uuid.to_string();
    [Root::Temp, Root::Final]
        .into_iter()
        .flat_map(|root| files_under(storage.root_path(root)))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect()
}
