//! Deterministic storage key derivation.
//!
//! Final key format: `{p1}/{p2}/{uuid}.{ext}` where `p1` is the first two and `p2`
//! the next two hex digits of the UUID. Temp key format: `{uuid}.part`.
//!
//! These functions are pure; the writer and the recovery path must both use them.

use std::fmt::{Display, Formatter, Result as FmtResult};

use filehost_core::constants::{DEFAULT_EXTENSION, MAX_EXTENSION_LEN, TEMP_FILE_SUFFIX};
use uuid::Uuid;

/// Which storage root a key is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Root {
    Final,
    Temp,
}

impl Display for Root {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Root::Final => write!(f, "final"),
            Root::Temp => write!(f, "temp"),
        }
    }
}

/// A key under one of the storage roots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoragePath {
    pub root: Root,
    pub key: String,
}

impl StoragePath {
    pub fn new(root: Root, key: impl Into<String>) -> Self {
        Self {
            root,
            key: key.into(),
        }
    }

    pub fn final_for(file_uuid: &Uuid, extension: &str) -> Self {
        Self::new(Root::Final, final_key(file_uuid, extension))
    }

    pub fn temp_for(file_uuid: &Uuid) -> Self {
        Self::new(Root::Temp, temp_key(file_uuid))
    }
}

impl Display for StoragePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}:{}", self.root, self.key)
    }
}

/// The two shard directory names for a UUID.
pub fn shard_prefixes(file_uuid: &Uuid) -> (String, String) {
    let hex = file_uuid.simple().to_string();
    (hex[0..2].to_string(), hex[2..4].to_string())
}

/// Shard directory (`ab/cd`) relative to the final root.
pub fn shard_dir(file_uuid: &Uuid) -> String {
    let (p1, p2) = shard_prefixes(file_uuid);
    format!("{}/{}", p1, p2)
}

pub fn final_key(file_uuid: &Uuid, extension: &str) -> String {
    format!("{}/{}.{}", shard_dir(file_uuid), file_uuid.as_hyphenated(), extension)
}

pub fn temp_key(file_uuid: &Uuid) -> String {
    format!("{}.{}", file_uuid.as_hyphenated(), TEMP_FILE_SUFFIX)
}

/// Glob pattern matching every file name belonging to `file_uuid`.
pub fn file_name_pattern(file_uuid: &Uuid) -> String {
    format!("{}*", file_uuid.as_hyphenated())
}

/// Lower-cased extension of `filename`, restricted to ASCII alphanumerics.
///
/// Falls back to `bin` when the name has no usable extension.
pub fn extension_for(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_uses_first_two_hex_pairs() {
        let id = Uuid::parse_str("ab12cd34-0000-4000-8000-000000000000").unwrap();
        assert_eq!(shard_dir(&id), "ab/12");
        assert_eq!(
            final_key(&id, "png"),
            "ab/12/ab12cd34-0000-4000-8000-000000000000.png"
        );
        assert_eq!(temp_key(&id), "ab12cd34-0000-4000-8000-000000000000.part");
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(StoragePath::final_for(&id, "txt"), StoragePath::final_for(&id, "txt"));
        assert_eq!(StoragePath::temp_for(&id).root, Root::Temp);
    }

    #[test]
    fn test_pattern_matches_both_keys() {
        let id = Uuid::new_v4();
        let pattern = glob::Pattern::new(&file_name_pattern(&id)).unwrap();
        assert!(pattern.matches(&temp_key(&id)));
        assert!(pattern.matches(&format!("{}.jpg", id)));
        assert!(!pattern.matches(&format!("{}.jpg", Uuid::new_v4())));
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("photo.JPG"), "jpg");
        assert_eq!(extension_for("archive.tar.gz"), "gz");
        assert_eq!(extension_for("README"), "bin");
        assert_eq!(extension_for("evil.../etc"), "bin");
        assert_eq!(extension_for("trailing."), "bin");
    }
}
