//! Failure audit trail
//!
//! [`AuditLogger`] records each failure twice: as a `failed` upload attempt in
//! the metadata store (the queryable error log) and as one line on an
//! append-only [`LogSink`]:
//!
//! ```text
//! [2024-05-01T12:00:00.000Z] ERROR_ID=<uuid> FILE_UUID=<uuid> TYPE=DISK_FULL_ERROR IP=10.0.0.1 MESSAGE=<text>
//! ```
//!
//! Neither write may fail the caller; the `error_id` is returned regardless.

mod sink;
mod statistics;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use filehost_core::models::{ErrorLogEntry, RequestContext};
use filehost_core::constants::UNKNOWN_CLIENT_IP;
use filehost_core::ErrorType;
use filehost_db::MetadataStore;
use uuid::Uuid;

use crate::fault::UploadFault;

pub use sink::{FileLogSink, LogSink, TracingLogSink};
pub use statistics::StatisticsAggregator;

pub struct AuditLogger<M: MetadataStore> {
    store: Arc<M>,
    sink: Arc<dyn LogSink>,
}

impl<M: MetadataStore> Clone for AuditLogger<M> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<M: MetadataStore> AuditLogger<M> {
    pub fn new(store: Arc<M>, sink: Arc<dyn LogSink>) -> Self {
        Self { store, sink }
    }

    /// Record a failure under a fresh `error_id` and return it.
    pub async fn log_failure(
        &self,
        fault: &UploadFault,
        error_type: ErrorType,
        file_uuid: Uuid,
        ctx: &RequestContext,
    ) -> Uuid {
        let error_id = Uuid::new_v4();
        self.log_failure_with_id(error_id, fault, error_type, file_uuid, ctx)
            .await;
        error_id
    }

    /// Record a failure under an `error_id` minted by the caller.
    #[tracing::instrument(skip_all, fields(error_id = %error_id, file_uuid = %file_uuid, error_type = %error_type))]
    pub async fn log_failure_with_id(
        &self,
        error_id: Uuid,
        fault: &UploadFault,
        error_type: ErrorType,
        file_uuid: Uuid,
        ctx: &RequestContext,
    ) {
        let entry = ErrorLogEntry {
            error_id,
            file_uuid,
            error_type,
            message: fault.to_string(),
            client_ip: ctx.client_ip.clone(),
            context: ctx.to_context_map(),
            timestamp: Utc::now(),
        };

        if let Err(e) = self.persist(&entry, ctx).await {
            tracing::error!(error = %e, "Failed to persist error log entry");
        }

        if let Err(e) = self.sink.append(&format_line(&entry)).await {
            tracing::error!(error = %e, "Failed to append to error log sink");
        }
    }

    async fn persist(
        &self,
        entry: &ErrorLogEntry,
        ctx: &RequestContext,
    ) -> filehost_db::MetadataResult<()> {
        let attempt = entry.to_attempt(ctx.user_agent.clone(), entry.timestamp);
        let mut session = self.store.begin().await?;
        self.store.record_attempt(&mut session, &attempt).await?;
        self.store.commit(session).await
    }
}

/// One sink line for `entry`, newline-terminated.
pub fn format_line(entry: &ErrorLogEntry) -> String {
    format!(
        "[{}] ERROR_ID={} FILE_UUID={} TYPE={} IP={} MESSAGE={}\n",
        format_timestamp(&entry.timestamp),
        entry.error_id,
        entry.file_uuid,
        entry.error_type,
        entry
            .client_ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .unwrap_or(UNKNOWN_CLIENT_IP),
        single_line(&entry.message),
    )
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn single_line(message: &str) -> String {
    message
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use filehost_core::models::AttemptStatus;
    use filehost_db::MemoryMetadataStore;
    use std::io;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct CaptureSink {
        lines: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LogSink for CaptureSink {
        async fn append(&self, line: &str) -> io::Result<()> {
            self.lines.lock().await.push(line.to_string());
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl LogSink for BrokenSink {
        async fn append(&self, _line: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "sink unavailable"))
        }
    }

    fn fault() -> UploadFault {
        UploadFault::Internal(anyhow::anyhow!("first line\nsecond line"))
    }

    #[tokio::test]
    async fn test_log_failure_writes_line_and_attempt() {
        let store = Arc::new(MemoryMetadataStore::new());
        let sink = Arc::new(CaptureSink::default());
        let logger = AuditLogger::new(store.clone(), sink.clone());
        let file_uuid = Uuid::new_v4();
        let ctx = RequestContext::new(Some("10.0.0.7".to_string()), Some("curl/8".to_string()));

        let error_id = logger
            .log_failure(&fault(), ErrorType::UnknownError, file_uuid, &ctx)
            .await;

        let lines = sink.lines.lock().await;
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!(line.starts_with('['));
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.contains(&format!(
            "] ERROR_ID={} FILE_UUID={} TYPE=UNKNOWN_ERROR IP=10.0.0.7 MESSAGE=first line second line",
            error_id, file_uuid
        )));

        let attempts = store.attempts().await;
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, AttemptStatus::Failed);
        assert_eq!(attempts[0].error_id, Some(error_id));
        assert_eq!(attempts[0].user_agent.as_deref(), Some("curl/8"));
    }

    #[tokio::test]
    async fn test_missing_ip_is_unknown() {
        let store = Arc::new(MemoryMetadataStore::new());
        let sink = Arc::new(CaptureSink::default());
        let logger = AuditLogger::new(store, sink.clone());

        logger
            .log_failure(&fault(), ErrorType::UnknownError, Uuid::new_v4(), &RequestContext::default())
            .await;

        assert!(sink.lines.lock().await[0].contains(" IP=unknown "));
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let store = Arc::new(MemoryMetadataStore::new());
        let logger = AuditLogger::new(store.clone(), Arc::new(BrokenSink));

        let first = logger
            .log_failure(&fault(), ErrorType::UnknownError, Uuid::new_v4(), &RequestContext::default())
            .await;
        let second = logger
            .log_failure(&fault(), ErrorType::UnknownError, Uuid::new_v4(), &RequestContext::default())
            .await;

        assert_ne!(first, second);
        assert_eq!(store.attempts().await.len(), 2);
    }
}
