//! Append-only destinations for audit lines.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[async_trait]
pub trait LogSink: Send + Sync {
    /// Append one newline-terminated line.
    async fn append(&self, line: &str) -> io::Result<()>;
}

/// Appends lines to a file, opened lazily in append mode.
pub struct FileLogSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LogSink for FileLogSink {
    async fn append(&self, line: &str) -> io::Result<()> {
        let mut guard = self.file.lock().await;
        if guard.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *guard = Some(file);
        }

        let result = match guard.as_mut() {
            Some(file) => {
                let written = file.write_all(line.as_bytes()).await;
                match written {
                    Ok(()) => file.flush().await,
                    Err(e) => Err(e),
                }
            }
            None => Ok(()),
        };

        // Reopen on the next append after a failed write.
        if result.is_err() {
            *guard = None;
        }
        result
    }
}

/// Emits each line as a `tracing` event on the `upload_errors` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

#[async_trait]
impl LogSink for TracingLogSink {
    async fn append(&self, line: &str) -> io::Result<()> {
        tracing::error!(target: "upload_errors", "{}", line.trim_end());
        Ok(())
    }
}
