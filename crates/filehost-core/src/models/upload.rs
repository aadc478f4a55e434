use serde::{Deserialize, Serialize};
use validator::Validate;

/// Client-declared metadata accompanying an upload stream.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UploadMetadata {
    /// Original filename
    #[validate(length(
        min = 1,
        max = 255,
        message = "Filename must be between 1 and 255 characters"
    ))]
    pub original_filename: String,
    /// Content type (MIME type)
    #[validate(length(
        min = 1,
        max = 255,
        message = "Content type must be between 1 and 255 characters"
    ))]
    pub content_type: String,
    /// Size announced by the client (Content-Length), if any
    #[serde(default)]
    pub declared_size: Option<u64>,
}

impl UploadMetadata {
    pub fn new(
        original_filename: impl Into<String>,
        content_type: impl Into<String>,
        declared_size: Option<u64>,
    ) -> Self {
        Self {
            original_filename: original_filename.into(),
            content_type: content_type.into(),
            declared_size,
        }
    }
}
