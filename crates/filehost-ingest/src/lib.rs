//! Filehost ingestion pipeline
//!
//! [`FileUploadCoordinator`] drives an upload through validate, hash, store and
//! persist. Any fault raised along the way is caught once, at the coordinator
//! boundary, and handed to the recovery chain:
//!
//! 1. [`classify`] maps the fault to an [`ErrorType`](filehost_core::ErrorType).
//! 2. [`RecoveryExecutor`] removes orphaned bytes and rolls back metadata.
//! 3. [`AuditLogger`] appends the error log entry and returns its `error_id`.
//!
//! [`UploadErrorHandler`] packages the chain for callers that catch faults
//! themselves, and [`StatisticsAggregator`] / [`RetentionService`] read and
//! prune the resulting error log.

pub mod audit;
pub mod classifier;
pub mod coordinator;
pub mod fault;
pub mod handler;
pub mod hashing;
pub mod policy;
pub mod recovery;
pub mod retention;

pub use audit::{AuditLogger, FileLogSink, LogSink, StatisticsAggregator, TracingLogSink};
pub use classifier::{classify, ErrorClassifier};
pub use coordinator::{Download, DownloadError, FileUploadCoordinator, IngestOutcome};
pub use fault::UploadFault;
pub use handler::{ClientErrorView, UploadErrorHandler, UploadErrorResponse};
pub use hashing::HashingReader;
pub use policy::{PolicyViolation, UploadPolicy};
pub use recovery::{RecoveryExecutor, RecoveryReport};
pub use retention::{RetentionService, RetentionSummary};
