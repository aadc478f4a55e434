use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncRead;

use crate::shard::{Root, StoragePath};
use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use crate::StorageBackend;

/// Local filesystem storage implementation
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
    temp_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for committed files (e.g., "/var/lib/filehost/files")
    /// * `temp_path` - Root directory for in-flight writes (e.g., "/var/lib/filehost/tmp")
    pub async fn new(
        base_path: impl Into<PathBuf>,
        temp_path: impl Into<PathBuf>,
    ) -> StorageResult<Self> {
        let base_path = Self::prepare_root(base_path.into()).await?;
        let temp_path = Self::prepare_root(temp_path.into()).await?;

        if base_path == temp_path {
            return Err(StorageError::ConfigError(
                "Temp root must differ from the storage root".to_string(),
            ));
        }

        Ok(LocalStorage {
            base_path,
            temp_path,
        })
    }

    async fn prepare_root(path: PathBuf) -> StorageResult<PathBuf> {
        fs::create_dir_all(&path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                path.display(),
                e
            ))
        })?;
        fs::canonicalize(&path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to canonicalize storage directory {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn root_path(&self, root: Root) -> &Path {
        match root {
            Root::Final => &self.base_path,
            Root::Temp => &self.temp_path,
        }
    }

    /// Convert a key to a filesystem path with security validation
    ///
    /// Only plain path components are accepted, so a key can never resolve
    /// outside its root.
    fn key_to_path(&self, root: Root, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        if key.contains('\\')
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }
        Ok(self.root_path(root).join(relative))
    }

    fn path_for(&self, path: &StoragePath) -> StorageResult<PathBuf> {
        if path.key.is_empty() {
            return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
        }
        self.key_to_path(path.root, &path.key)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Create a file, recreating its parent once if a concurrent prune removed it.
    async fn create_file(&self, path: &Path) -> io::Result<fs::File> {
        self.ensure_parent_dir(path).await?;
        match fs::File::create(path).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.ensure_parent_dir(path).await?;
                fs::File::create(path).await
            }
            other => other,
        }
    }

    async fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.ensure_parent_dir(to).await?;
        match fs::rename(from, to).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !fs::try_exists(from).await? {
                    return Err(e);
                }
                // Destination shard was pruned between create and rename.
                self.ensure_parent_dir(to).await?;
                fs::rename(from, to).await
            }
            Err(e) => {
                // Roots on different filesystems cannot be renamed across.
                tracing::debug!(error = %e, "Rename failed, falling back to copy");
                fs::copy(from, to).await?;
                fs::remove_file(from).await
            }
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn write(
        &self,
        path: &StoragePath,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<u64> {
        let fs_path = self.path_for(path)?;
        let start = std::time::Instant::now();

        let write_failed = |source: io::Error| StorageError::WriteFailed {
            path: path.to_string(),
            source,
        };

        let mut file = self.create_file(&fs_path).await.map_err(write_failed)?;
        let bytes_copied = tokio::io::copy(reader, &mut file)
            .await
            .map_err(write_failed)?;
        file.sync_all().await.map_err(write_failed)?;

        tracing::info!(
            path = %fs_path.display(),
            key = %path,
            size_bytes = bytes_copied,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write successful"
        );

        Ok(bytes_copied)
    }

    async fn rename(&self, from: &StoragePath, to: &StoragePath) -> StorageResult<()> {
        let from_path = self.path_for(from)?;
        let to_path = self.path_for(to)?;

        self.move_file(&from_path, &to_path)
            .await
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => StorageError::NotFound(from.to_string()),
                _ => StorageError::WriteFailed {
                    path: to.to_string(),
                    source,
                },
            })?;

        tracing::debug!(from = %from, to = %to, "Local storage rename successful");
        Ok(())
    }

    async fn delete(&self, path: &StoragePath) -> StorageResult<()> {
        let fs_path = self.path_for(path)?;

        match fs::remove_file(&fs_path).await {
            Ok(()) => {
                tracing::info!(path = %fs_path.display(), key = %path, "Local storage delete successful");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::DeleteFailed {
                path: path.to_string(),
                source,
            }),
        }
    }

    async fn exists(&self, path: &StoragePath) -> StorageResult<bool> {
        let fs_path = self.path_for(path)?;
        fs::try_exists(&fs_path)
            .await
            .map_err(|source| StorageError::ReadFailed {
                path: path.to_string(),
                source,
            })
    }

    async fn find(&self, root: Root, dir: &str, pattern: &str) -> StorageResult<Vec<StoragePath>> {
        let dir_path = if dir.is_empty() {
            self.root_path(root).to_path_buf()
        } else {
            self.key_to_path(root, dir)?
        };
        let dir_str = dir_path.to_str().ok_or_else(|| {
            StorageError::InvalidKey(format!("Non UTF-8 directory: {}", dir_path.display()))
        })?;
        let full_pattern = format!("{}/{}", glob::Pattern::escape(dir_str), pattern);
        let root_path = self.root_path(root).to_path_buf();

        let matches = tokio::task::spawn_blocking(move || -> StorageResult<Vec<StoragePath>> {
            let paths = glob::glob(&full_pattern)
                .map_err(|e| StorageError::InvalidKey(format!("Invalid pattern: {}", e)))?;
            let mut found = Vec::new();
            for entry in paths {
                match entry {
                    Ok(p) if p.is_file() => {
                        if let Some(key) = p
                            .strip_prefix(&root_path)
                            .ok()
                            .and_then(|rel| rel.to_str())
                        {
                            found.push(StoragePath::new(root, key));
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping unreadable path during find");
                    }
                }
            }
            Ok(found)
        })
        .await
        .map_err(|e| StorageError::BackendError(format!("Find task failed: {}", e)))??;

        Ok(matches)
    }

    async fn prune_empty_dirs(&self, root: Root, dir: &str) -> StorageResult<usize> {
        if dir.is_empty() {
            return Ok(0);
        }
        let root_path = self.root_path(root).to_path_buf();
        let mut current = self.key_to_path(root, dir)?;
        let mut removed = 0;

        while current != root_path && current.starts_with(&root_path) {
            match fs::remove_dir(&current).await {
                Ok(()) => {
                    tracing::debug!(path = %current.display(), "Removed empty directory");
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                // Not empty (or not removable): this ancestor stays, and so do its parents.
                Err(_) => break,
            }
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(removed)
    }

    async fn read_stream(&self, path: &StoragePath) -> StorageResult<ByteStream> {
        let fs_path = self.path_for(path)?;

        let file = fs::File::open(&fs_path).await.map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            _ => StorageError::ReadFailed {
                path: path.to_string(),
                source,
            },
        })?;

        let key = path.to_string();
        let stream = tokio_util::io::ReaderStream::new(file).map(move |result| {
            result.map_err(|source| {
                tracing::error!(key = %key, error = %source, "Local storage stream read error");
                StorageError::ReadFailed {
                    path: key.clone(),
                    source,
                }
            })
        });

        Ok(Box::pin(stream))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
