//! Error types module
//!
//! This module holds the upload failure taxonomy ([`ErrorType`]) together with the
//! fixed response metadata attached to each entry, and the error type returned by
//! every metadata store implementation ([`MetadataError`]).
//!
//! `From<sqlx::Error>` for `MetadataError` is gated behind the `sqlx` feature.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like resource limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "DATABASE_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether re-issuing the same request may succeed without client-side changes
    fn is_retryable(&self) -> bool;

    /// Client-facing message; never carries internal paths or raw error text
    fn client_message(&self) -> &'static str;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Upload failure taxonomy.
///
/// Every fault raised during ingestion resolves to exactly one of these tags.
/// Stored in the `upload_attempts.error_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "upload_error_type", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    ValidationError,
    StorageError,
    DatabaseError,
    NetworkError,
    PermissionError,
    DiskFullError,
    UnknownError,
}

impl ErrorType {
    pub const ALL: [ErrorType; 7] = [
        ErrorType::ValidationError,
        ErrorType::StorageError,
        ErrorType::DatabaseError,
        ErrorType::NetworkError,
        ErrorType::PermissionError,
        ErrorType::DiskFullError,
        ErrorType::UnknownError,
    ];

    pub fn as_str(&self) -> &'static str {
        error_type_static_metadata(*self).1
    }
}

/// Static metadata for each variant: (http_status, error_code, retryable, client_message, log_level).
fn error_type_static_metadata(
    error_type: ErrorType,
) -> (u16, &'static str, bool, &'static str, LogLevel) {
    match error_type {
        ErrorType::ValidationError => (
            400,
            "VALIDATION_ERROR",
            false,
            "The uploaded file did not pass validation. Check the file and try again.",
            LogLevel::Debug,
        ),
        ErrorType::StorageError => (
            500,
            "STORAGE_ERROR",
            true,
            "The file could not be stored. Please try again.",
            LogLevel::Error,
        ),
        ErrorType::DatabaseError => (
            500,
            "DATABASE_ERROR",
            true,
            "The file information could not be saved. Please try again.",
            LogLevel::Error,
        ),
        ErrorType::NetworkError => (
            503,
            "NETWORK_ERROR",
            true,
            "A network error interrupted the upload. Please try again.",
            LogLevel::Warn,
        ),
        ErrorType::PermissionError => (
            500,
            "PERMISSION_ERROR",
            false,
            "The server is not permitted to store this file. Please contact support.",
            LogLevel::Error,
        ),
        ErrorType::DiskFullError => (
            507,
            "DISK_FULL_ERROR",
            false,
            "The server has run out of storage space. Please contact support.",
            LogLevel::Error,
        ),
        ErrorType::UnknownError => (
            500,
            "UNKNOWN_ERROR",
            false,
            "An unexpected error occurred while uploading the file.",
            LogLevel::Error,
        ),
    }
}

impl ErrorMetadata for ErrorType {
    fn http_status_code(&self) -> u16 {
        error_type_static_metadata(*self).0
    }

    fn error_code(&self) -> &'static str {
        error_type_static_metadata(*self).1
    }

    fn is_retryable(&self) -> bool {
        error_type_static_metadata(*self).2
    }

    fn client_message(&self) -> &'static str {
        error_type_static_metadata(*self).3
    }

    fn log_level(&self) -> LogLevel {
        error_type_static_metadata(*self).4
    }
}

impl Display for ErrorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Invalid error type: {}", s))
    }
}

/// Errors raised by metadata store implementations.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Metadata store disconnected: {0}")]
    Disconnected(String),

    #[error("Connection failure: {0}")]
    Connection(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query failed: {0}")]
    Query(String),
}

impl MetadataError {
    /// True when the error is the content-hash uniqueness guard firing.
    pub fn is_unique_violation_on(&self, name: &str) -> bool {
        matches!(self, MetadataError::UniqueViolation { constraint } if constraint == name)
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for MetadataError {
    fn from(err: SqlxError) -> Self {
        use sqlx::error::ErrorKind;

        match err {
            SqlxError::Database(db) => match db.kind() {
                ErrorKind::UniqueViolation => MetadataError::UniqueViolation {
                    constraint: db.constraint().unwrap_or_default().to_string(),
                },
                ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => MetadataError::Integrity(db.message().to_string()),
                _ => match db.code() {
                    Some(code) if code.starts_with("23") => {
                        MetadataError::Integrity(db.message().to_string())
                    }
                    // 08xxx: connection exception, 57P01..03: admin shutdown / crash
                    Some(code) if code.starts_with("08") || code.starts_with("57P") => {
                        MetadataError::Disconnected(db.message().to_string())
                    }
                    _ => MetadataError::Query(db.message().to_string()),
                },
            },
            SqlxError::PoolClosed | SqlxError::PoolTimedOut | SqlxError::WorkerCrashed => {
                MetadataError::Disconnected(err.to_string())
            }
            SqlxError::Io(_) | SqlxError::Tls(_) => MetadataError::Connection(err.to_string()),
            SqlxError::RowNotFound => MetadataError::NotFound(err.to_string()),
            other => MetadataError::Query(other.to_string()),
        }
    }
}
