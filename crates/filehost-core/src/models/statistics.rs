use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ErrorType;

/// Failure statistics over a trailing window of days.
///
/// `retryable_count + non_retryable_count == total_failed_uploads` always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    pub period_days: u32,
    pub total_failed_uploads: i64,
    pub error_type_counts: BTreeMap<ErrorType, i64>,
    pub retryable_count: i64,
    pub non_retryable_count: i64,
}
