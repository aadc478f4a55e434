//! Filehost Core Library
//!
//! This crate provides the domain models, the upload error taxonomy, metadata
//! store errors and configuration shared by every filehost component.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::Config;
pub use error::{ErrorMetadata, ErrorType, LogLevel, MetadataError};
pub use storage_types::StorageBackend;
