//! Shared constants.

/// Placeholder written to audit lines when the client address is unknown.
pub const UNKNOWN_CLIENT_IP: &str = "unknown";

/// Name of the partial unique index guarding one `success` record per content hash.
pub const CONTENT_HASH_UNIQUE_CONSTRAINT: &str = "file_records_success_content_hash_key";

/// Suffix given to in-flight files under the temp root.
pub const TEMP_FILE_SUFFIX: &str = "part";

/// Fallback extension for files whose original name carries none.
pub const DEFAULT_EXTENSION: &str = "bin";

/// Maximum length of an extension kept from the original filename.
pub const MAX_EXTENSION_LEN: usize = 16;
