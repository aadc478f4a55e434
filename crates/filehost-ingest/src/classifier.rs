//! Fault classification.
//!
//! An ordered table of `(predicate, ErrorType)` rules, evaluated first match
//! wins. Specific OS conditions (disk full, permission denied) come before the
//! generic storage I/O rule that would otherwise also match them.

use std::io;

use filehost_core::{ErrorType, MetadataError};

use crate::fault::UploadFault;

type Rule = (fn(&UploadFault) -> bool, ErrorType);

// ENOSPC, EDQUOT
const DISK_FULL_OS_CODES: [i32; 2] = [28, 122];
// EPERM, EACCES
const PERMISSION_OS_CODES: [i32; 2] = [1, 13];

static RULES: &[Rule] = &[
    (is_validation, ErrorType::ValidationError),
    (is_disk_full, ErrorType::DiskFullError),
    (is_permission_denied, ErrorType::PermissionError),
    (is_storage_io, ErrorType::StorageError),
    (is_database, ErrorType::DatabaseError),
    (is_network, ErrorType::NetworkError),
];

/// Map a fault to its taxonomy entry. Pure and total.
pub fn classify(fault: &UploadFault) -> ErrorType {
    RULES
        .iter()
        .find(|(matches, _)| matches(fault))
        .map(|(_, error_type)| *error_type)
        .unwrap_or(ErrorType::UnknownError)
}

/// Unit handle over [`classify`] for callers that prefer a value to pass around.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn classify(&self, fault: &UploadFault) -> ErrorType {
        classify(fault)
    }
}

fn is_validation(fault: &UploadFault) -> bool {
    matches!(fault, UploadFault::Policy(_))
}

fn is_disk_full(fault: &UploadFault) -> bool {
    fault.io_error().is_some_and(|e| {
        e.raw_os_error()
            .is_some_and(|code| DISK_FULL_OS_CODES.contains(&code))
            || e.to_string().to_ascii_lowercase().contains("no space left")
    })
}

fn is_permission_denied(fault: &UploadFault) -> bool {
    fault.io_error().is_some_and(|e| {
        e.kind() == io::ErrorKind::PermissionDenied
            || e.raw_os_error()
                .is_some_and(|code| PERMISSION_OS_CODES.contains(&code))
    })
}

fn is_storage_io(fault: &UploadFault) -> bool {
    matches!(fault, UploadFault::Storage(_)) || fault.io_error().is_some()
}

fn is_database(fault: &UploadFault) -> bool {
    match fault {
        UploadFault::DuplicateContent { .. } => true,
        UploadFault::Metadata(e) => !matches!(e, MetadataError::Connection(_)),
        _ => false,
    }
}

fn is_network(fault: &UploadFault) -> bool {
    matches!(
        fault,
        UploadFault::ClientStream(_) | UploadFault::Metadata(MetadataError::Connection(_))
    )
}
