//! Filehost Storage Library
//!
//! Byte-oriented storage abstraction and the local filesystem implementation.
//!
//! # Storage layout
//!
//! Every backend exposes two roots:
//!
//! - **Final root**: committed files, sharded by file UUID as `ab/cd/{uuid}.{ext}`
//!   where `ab` and `cd` are the first and second pairs of hex digits of the UUID.
//! - **Temp root**: in-flight writes, stored flat as `{uuid}.part`. Bytes only move
//!   under the final root by a rename once the write has completed.
//!
//! Key derivation lives in the `shard` module and is shared by writers and by
//! recovery, which uses it to locate orphaned files.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod shard;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use filehost_core::StorageBackend;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use shard::{Root, StoragePath};
pub use traits::{ByteStream, Storage, StorageError, StorageResult};
