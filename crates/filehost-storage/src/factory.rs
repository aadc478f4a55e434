//! Storage backend construction from configuration.

use std::sync::Arc;

use filehost_core::Config;

#[cfg(not(feature = "storage-local"))]
use crate::traits::StorageError;
use crate::traits::{Storage, StorageResult};
use crate::StorageBackend;

/// Build the storage backend selected by `config.storage_backend`.
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    match config.storage_backend {
        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let storage =
                crate::local::LocalStorage::new(&config.storage_root, &config.storage_temp_root)
                    .await?;
            tracing::info!(
                root = %config.storage_root.display(),
                temp_root = %config.storage_temp_root.display(),
                "Local storage initialized"
            );
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "storage-local"))]
        backend => Err(StorageError::ConfigError(format!(
            "Storage backend '{}' is not available in this build",
            backend
        ))),
    }
}
