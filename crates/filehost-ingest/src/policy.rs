//! Upload acceptance policy.

use filehost_core::models::UploadMetadata;
use filehost_core::Config;
use thiserror::Error;
use validator::Validate;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("Invalid upload metadata: {0}")]
    InvalidMetadata(String),

    #[error("File size {size} exceeds the maximum of {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Content type '{0}' is not allowed")]
    ContentTypeNotAllowed(String),
}

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_file_size: u64,
    /// Lower-cased; `type/*` entries match a whole top-level type. Empty allows all.
    allowed_content_types: Vec<String>,
}

impl UploadPolicy {
    pub fn new(max_file_size: u64, allowed_content_types: Vec<String>) -> Self {
        Self {
            max_file_size,
            allowed_content_types: allowed_content_types
                .into_iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_file_size_bytes,
            config.allowed_content_types.clone(),
        )
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Check client-declared metadata before any bytes are accepted.
    pub fn check(&self, metadata: &UploadMetadata) -> Result<(), PolicyViolation> {
        metadata
            .validate()
            .map_err(|e| PolicyViolation::InvalidMetadata(e.to_string()))?;

        if let Some(size) = metadata.declared_size {
            self.check_size(size)?;
        }

        if !self.content_type_allowed(&metadata.content_type) {
            return Err(PolicyViolation::ContentTypeNotAllowed(
                metadata.content_type.clone(),
            ));
        }

        Ok(())
    }

    pub fn check_size(&self, size: u64) -> Result<(), PolicyViolation> {
        if size > self.max_file_size {
            return Err(PolicyViolation::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }
        Ok(())
    }

    pub fn content_type_allowed(&self, content_type: &str) -> bool {
        if self.allowed_content_types.is_empty() {
            return true;
        }
        // Drop parameters such as "; charset=utf-8".
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        self.allowed_content_types.iter().any(|allowed| {
            match allowed.strip_suffix("/*") {
                Some(top_level) => essence
                    .split_once('/')
                    .is_some_and(|(t, sub)| t == top_level && !sub.is_empty()),
                None => *allowed == essence,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(name: &str, content_type: &str, size: Option<u64>) -> UploadMetadata {
        UploadMetadata {
            original_filename: name.to_string(),
            content_type: content_type.to_string(),
            declared_size: size,
        }
    }

    #[test]
    fn test_empty_allow_list_accepts_everything() {
        let policy = UploadPolicy::new(10, vec![]);
        assert!(policy.check(&metadata("a.bin", "application/x-anything", None)).is_ok());
    }

    #[test]
    fn test_declared_size_over_limit() {
        let policy = UploadPolicy::new(10, vec![]);
        assert_eq!(
            policy.check(&metadata("a.bin", "text/plain", Some(11))),
            Err(PolicyViolation::FileTooLarge { size: 11, max: 10 })
        );
        assert!(policy.check(&metadata("a.bin", "text/plain", Some(10))).is_ok());
    }

    #[test]
    fn test_content_type_wildcards_and_parameters() {
        let policy = UploadPolicy::new(10, vec!["image/*".into(), "Text/Plain".into()]);
        assert!(policy.content_type_allowed("image/png"));
        assert!(policy.content_type_allowed("text/plain; charset=utf-8"));
        assert!(!policy.content_type_allowed("image/"));
        assert!(!policy.content_type_allowed("application/pdf"));
        assert!(matches!(
            policy.check(&metadata("doc.pdf", "application/pdf", None)),
            Err(PolicyViolation::ContentTypeNotAllowed(_))
        ));
    }

    #[test]
    fn test_empty_filename_is_invalid() {
        let policy = UploadPolicy::new(10, vec![]);
        assert!(matches!(
            policy.check(&metadata("", "text/plain", None)),
            Err(PolicyViolation::InvalidMetadata(_))
        ));
    }
}
