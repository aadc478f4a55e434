//! File record model: one logical file across its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Lifecycle state of a [`FileRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "file_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Success,
    Failed,
}

/// A logical file owned by the metadata store.
///
/// Inserted as `pending` when an upload starts, promoted to `success` once the
/// bytes are durable under their final path and the commit went through, or
/// deleted by recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct FileRecord {
    pub file_uuid: Uuid,
    pub original_filename: String,
    /// Final-root storage key (`ab/cd/<uuid>.<ext>`), fixed at insert time.
    pub storage_path: String,
    pub file_size: i64,
    pub content_type: String,
    /// Hex SHA-256 of the content; unknown while pending.
    pub content_hash: Option<String>,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Build a fresh `pending` record.
    pub fn pending(
        file_uuid: Uuid,
        original_filename: impl Into<String>,
        storage_path: impl Into<String>,
        content_type: impl Into<String>,
        declared_size: Option<u64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            file_uuid,
            original_filename: original_filename.into(),
            storage_path: storage_path.into(),
            file_size: declared_size
                .map(|s| i64::try_from(s).unwrap_or(i64::MAX))
                .unwrap_or(0),
            content_type: content_type.into(),
            content_hash: None,
            status: FileStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FileStatus::Success
    }
}

/// Values written when a pending record is promoted to `success`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    pub file_size: i64,
    pub content_hash: String,
}
