//! The recovery chain: classify, recover, log, respond.

use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Utc};
use filehost_core::models::RequestContext;
use filehost_core::{ErrorMetadata, ErrorType, LogLevel};
use filehost_db::MetadataStore;
use futures::FutureExt;
use serde::Serialize;
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::classifier::classify;
use crate::fault::UploadFault;
use crate::recovery::RecoveryExecutor;

/// Outcome of a failed upload, handed to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadErrorResponse {
    pub error_type: ErrorType,
    /// Fixed client-facing text for `error_type`.
    pub error_message: String,
    pub status_code: u16,
    pub is_retryable: bool,
    pub file_uuid: Uuid,
    pub error_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// The only fields a client may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientErrorView {
    pub status_code: u16,
    pub message: String,
    pub is_retryable: bool,
    pub error_id: Uuid,
}

impl UploadErrorResponse {
    pub fn new(error_type: ErrorType, file_uuid: Uuid, error_id: Uuid) -> Self {
        Self {
            error_type,
            error_message: error_type.client_message().to_string(),
            status_code: error_type.http_status_code(),
            is_retryable: error_type.is_retryable(),
            file_uuid,
            error_id,
            timestamp: Utc::now(),
        }
    }

    /// Generic 500 used when handling the fault failed itself.
    pub fn internal(file_uuid: Uuid, error_id: Uuid) -> Self {
        Self::new(ErrorType::UnknownError, file_uuid, error_id)
    }

    pub fn client_view(&self) -> ClientErrorView {
        ClientErrorView {
            status_code: self.status_code,
            message: self.error_message.clone(),
            is_retryable: self.is_retryable,
            error_id: self.error_id,
        }
    }
}

pub struct UploadErrorHandler<M: MetadataStore> {
    recovery: RecoveryExecutor<M>,
    audit: AuditLogger<M>,
}

impl<M: MetadataStore> Clone for UploadErrorHandler<M> {
    fn clone(&self) -> Self {
        Self {
            recovery: self.recovery.clone(),
            audit: self.audit.clone(),
        }
    }
}

impl<M: MetadataStore> UploadErrorHandler<M> {
    pub fn new(recovery: RecoveryExecutor<M>, audit: AuditLogger<M>) -> Self {
        Self { recovery, audit }
    }

    /// Classify `fault`, clean up after `file_uuid`, log the failure and build
    /// the response. Never fails: a fault inside this chain yields a generic
    /// 500 that keeps the already-minted `error_id`.
    pub async fn handle_upload_error(
        &self,
        fault: UploadFault,
        file_uuid: Uuid,
        ctx: &RequestContext,
    ) -> UploadErrorResponse {
        let error_id = Uuid::new_v4();

        let chain = async {
            let error_type = classify(&fault);
            self.recovery.recover(file_uuid).await;
            self.audit
                .log_failure_with_id(error_id, &fault, error_type, file_uuid, ctx)
                .await;
            error_type
        };

        match AssertUnwindSafe(chain).catch_unwind().await {
            Ok(error_type) => {
                emit(error_type, &fault, file_uuid, error_id);
                UploadErrorResponse::new(error_type, file_uuid, error_id)
            }
            Err(_) => {
                tracing::error!(
                    file_uuid = %file_uuid,
                    error_id = %error_id,
                    error = %fault,
                    "Upload error handling failed"
                );
                UploadErrorResponse::internal(file_uuid, error_id)
            }
        }
    }
}

fn emit(error_type: ErrorType, fault: &UploadFault, file_uuid: Uuid, error_id: Uuid) {
    match error_type.log_level() {
        LogLevel::Debug => tracing::debug!(
            file_uuid = %file_uuid,
            error_id = %error_id,
            error_type = %error_type,
            error = %fault,
            "Upload rejected"
        ),
        LogLevel::Warn => tracing::warn!(
            file_uuid = %file_uuid,
            error_id = %error_id,
            error_type = %error_type,
            error = %fault,
            "Upload failed"
        ),
        LogLevel::Error => tracing::error!(
            file_uuid = %file_uuid,
            error_id = %error_id,
            error_type = %error_type,
            error = %fault,
            "Upload failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_uses_table_values() {
        let file_uuid = Uuid::new_v4();
        let error_id = Uuid::new_v4();
        let response = UploadErrorResponse::new(ErrorType::NetworkError, file_uuid, error_id);

        assert_eq!(response.status_code, 503);
        assert!(response.is_retryable);
        assert_eq!(response.error_message, ErrorType::NetworkError.client_message());

        let view = response.client_view();
        assert_eq!(view.error_id, error_id);
        assert_eq!(view.status_code, 503);
    }

    #[test]
    fn test_client_view_has_four_fields() {
        let response = UploadErrorResponse::internal(Uuid::new_v4(), Uuid::new_v4());
        let json = serde_json::to_value(response.client_view()).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 4);
        for key in ["status_code", "message", "is_retryable", "error_id"] {
            assert!(keys.iter().any(|k| k == key), "{key}");
        }
        assert_eq!(json["status_code"], 500);
    }
}
