use std::io;

use filehost_core::MetadataError;
use filehost_storage::StorageError;
use thiserror::Error;

use crate::policy::PolicyViolation;

/// A fault raised while ingesting one upload.
///
/// The display text is internal: it goes to the error log, never to clients.
#[derive(Debug, Error)]
pub enum UploadFault {
    #[error("Upload rejected: {0}")]
    Policy(#[from] PolicyViolation),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Reading the client's byte stream failed (disconnect, reset, ...).
    #[error("Client stream failed: {0}")]
    ClientStream(#[source] io::Error),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Another upload committed the same content first.
    #[error("Content {content_hash} already stored: {source}")]
    DuplicateContent {
        content_hash: String,
        #[source]
        source: MetadataError,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl UploadFault {
    /// The OS-level error behind this fault, when the fault came from I/O on our side.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            UploadFault::Storage(e) => e.io_error(),
            UploadFault::Internal(e) => e.downcast_ref::<io::Error>(),
            _ => None,
        }
    }

    pub fn duplicate_content_hash(&self) -> Option<&str> {
        match self {
            UploadFault::DuplicateContent { content_hash, .. } => Some(content_hash),
            _ => None,
        }
    }
}
