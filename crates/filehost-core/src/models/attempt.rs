//! Upload attempt model.
//!
//! A failed attempt doubles as the persisted form of an [`ErrorLogEntry`]: the
//! error columns are only populated when `status` is `failed`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

use crate::error::ErrorType;

use super::context::RequestContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "attempt_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    /// Bytes stored under a new file record.
    Success,
    /// Upload resolved to an existing record with the same content hash.
    Deduplicated,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct UploadAttempt {
    pub id: Uuid,
    pub file_uuid: Uuid,
    pub status: AttemptStatus,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub error_id: Option<Uuid>,
    pub error_type: Option<ErrorType>,
    pub error_message: Option<String>,
    pub context: Option<JsonValue>,
}

impl UploadAttempt {
    /// A finished, non-failed attempt.
    pub fn finished(
        file_uuid: Uuid,
        status: AttemptStatus,
        ctx: &RequestContext,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_uuid,
            status,
            client_ip: ctx.client_ip.clone(),
            user_agent: ctx.user_agent.clone(),
            started_at,
            ended_at: Utc::now(),
            error_id: None,
            error_type: None,
            error_message: None,
            context: None,
        }
    }
}

/// Immutable record of one failure occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub error_id: Uuid,
    pub file_uuid: Uuid,
    pub error_type: ErrorType,
    pub message: String,
    pub client_ip: Option<String>,
    pub context: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorLogEntry {
    /// Persisted form: a `failed` attempt row.
    pub fn to_attempt(&self, user_agent: Option<String>, started_at: DateTime<Utc>) -> UploadAttempt {
        let context = serde_json::to_value(&self.context).ok();
        UploadAttempt {
            id: self.error_id,
            file_uuid: self.file_uuid,
            status: AttemptStatus::Failed,
            client_ip: self.client_ip.clone(),
            user_agent,
            started_at,
            ended_at: self.timestamp,
            error_id: Some(self.error_id),
            error_type: Some(self.error_type),
            error_message: Some(self.message.clone()),
            context,
        }
    }
}

impl TryFrom<UploadAttempt> for ErrorLogEntry {
    type Error = anyhow::Error;

    fn try_from(attempt: UploadAttempt) -> Result<Self, Self::Error> {
        if attempt.status != AttemptStatus::Failed {
            return Err(anyhow::anyhow!(
                "Upload attempt {} is not a failed attempt",
                attempt.id
            ));
        }
        let context = attempt
            .context
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        Ok(ErrorLogEntry {
            error_id: attempt.error_id.unwrap_or(attempt.id),
            file_uuid: attempt.file_uuid,
            error_type: attempt.error_type.unwrap_or(ErrorType::UnknownError),
            message: attempt.error_message.unwrap_or_default(),
            client_ip: attempt.client_ip,
            context,
            timestamp: attempt.ended_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ErrorLogEntry {
        let mut context = BTreeMap::new();
        context.insert("stage".to_string(), "store".to_string());
        ErrorLogEntry {
            error_id: Uuid::new_v4(),
            file_uuid: Uuid::new_v4(),
            error_type: ErrorType::StorageError,
            message: "write failed".to_string(),
            client_ip: Some("10.0.0.1".to_string()),
            context,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn failed_attempt_carries_error_columns() {
        let entry = entry();
        let attempt = entry.to_attempt(Some("curl/8".to_string()), entry.timestamp);
        assert_eq!(attempt.status, AttemptStatus::Failed);
        assert_eq!(attempt.error_id, Some(entry.error_id));
        assert_eq!(attempt.error_type, Some(ErrorType::StorageError));

        let back = ErrorLogEntry::try_from(attempt).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn successful_attempt_is_not_an_error_log_entry() {
        let attempt = UploadAttempt::finished(
            Uuid::new_v4(),
            AttemptStatus::Success,
            &RequestContext::default(),
            Utc::now(),
        );
        assert!(ErrorLogEntry::try_from(attempt).is_err());
    }
}
