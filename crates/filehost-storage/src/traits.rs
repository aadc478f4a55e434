//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::shard::{Root, StoragePath};
use crate::StorageBackend;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed for {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Read failed for {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Delete failed for {path}: {source}")]
    DeleteFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// The underlying OS error, when there is one.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            StorageError::WriteFailed { source, .. }
            | StorageError::ReadFailed { source, .. }
            | StorageError::DeleteFailed { source, .. } => Some(source),
            StorageError::IoError(source) => Some(source),
            _ => None,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Chunked download stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Storage abstraction trait
///
/// Keys are always relative to one of the two roots (see [`Root`]); the
/// backend owns the mapping from `(root, key)` to its physical location and
/// must reject keys that would escape a root.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stream `reader` to `path` until EOF and return the number of bytes written.
    ///
    /// The data is durable when this returns `Ok`.
    async fn write(
        &self,
        path: &StoragePath,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<u64>;

    /// Atomically move a file, typically from the temp root to the final root.
    async fn rename(&self, from: &StoragePath, to: &StoragePath) -> StorageResult<()>;

    /// Delete a file. Deleting a missing file is not an error.
    async fn delete(&self, path: &StoragePath) -> StorageResult<()>;

    /// Check if a file exists
    async fn exists(&self, path: &StoragePath) -> StorageResult<bool>;

    /// List files directly inside `dir` (relative to `root`, `""` for the root
    /// itself) whose file name matches the glob `pattern`.
    async fn find(&self, root: Root, dir: &str, pattern: &str) -> StorageResult<Vec<StoragePath>>;

    /// Remove `dir` and then each ancestor while they are empty, stopping at the
    /// first non-empty ancestor or at the root. Returns the number of
    /// directories removed.
    async fn prune_empty_dirs(&self, root: Root, dir: &str) -> StorageResult<usize>;

    /// Download a file as a stream of chunks.
    async fn read_stream(&self, path: &StoragePath) -> StorageResult<ByteStream>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
