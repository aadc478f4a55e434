//! Configuration module
//!
//! Environment-driven configuration for the ingestion pipeline: database,
//! storage roots, upload policy and error-log retention.

use std::env;
use std::path::PathBuf;

use crate::storage_types::StorageBackend;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_FILE_SIZE_MB: u64 = 100;
const ERROR_LOG_RETENTION_DAYS: u32 = 30;
const RETENTION_INTERVAL_SECS: u64 = 3600;
const STALE_PENDING_MINUTES: i64 = 60;

fn megabytes_to_bytes(megabytes: u64) -> Result<u64, anyhow::Error> {
    megabytes
        .checked_mul(1024 * 1024)
        .ok_or_else(|| anyhow::anyhow!("MAX_FILE_SIZE_MB is too large: {}", megabytes))
}

/// Ingestion configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub storage_root: PathBuf,
    pub storage_temp_root: PathBuf,
    // Upload policy
    pub max_file_size_bytes: u64,
    /// Empty means any content type is accepted.
    pub allowed_content_types: Vec<String>,
    // Error log / retention
    pub error_log_path: Option<PathBuf>,
    pub error_log_retention_days: u32,
    pub retention_interval_secs: u64,
    pub stale_pending_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let storage_backend = match env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => StorageBackend::Local,
        };

        let max_file_size_mb = env::var("MAX_FILE_SIZE_MB")
            .unwrap_or_else(|_| MAX_FILE_SIZE_MB.to_string())
            .parse::<u64>()
            .unwrap_or(MAX_FILE_SIZE_MB);

        let allowed_content_types = env::var("ALLOWED_CONTENT_TYPES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Config {
            environment,
            database_url,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            storage_backend,
            storage_root: env::var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/files")),
            storage_temp_root: env::var("STORAGE_TEMP_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/tmp")),
            max_file_size_bytes: megabytes_to_bytes(max_file_size_mb)?,
            allowed_content_types,
            error_log_path: env::var("ERROR_LOG_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            error_log_retention_days: env::var("ERROR_LOG_RETENTION_DAYS")
                .unwrap_or_else(|_| ERROR_LOG_RETENTION_DAYS.to_string())
                .parse()
                .unwrap_or(ERROR_LOG_RETENTION_DAYS),
            retention_interval_secs: env::var("RETENTION_INTERVAL_SECS")
                .unwrap_or_else(|_| RETENTION_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(RETENTION_INTERVAL_SECS),
            stale_pending_minutes: env::var("STALE_PENDING_MINUTES")
                .unwrap_or_else(|_| STALE_PENDING_MINUTES.to_string())
                .parse()
                .unwrap_or(STALE_PENDING_MINUTES),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgresql://")
            && !self.database_url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.storage_root == self.storage_temp_root {
            return Err(anyhow::anyhow!(
                "STORAGE_TEMP_ROOT must differ from STORAGE_ROOT"
            ));
        }

        if self.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            environment: "test".to_string(),
            database_url: "postgres://localhost/filehost".to_string(),
            db_max_connections: 5,
            db_timeout_seconds: 5,
            storage_backend: StorageBackend::Local,
            storage_root: PathBuf::from("/srv/files"),
            storage_temp_root: PathBuf::from("/srv/tmp"),
            max_file_size_bytes: 1024,
            allowed_content_types: vec![],
            error_log_path: None,
            error_log_retention_days: 30,
            retention_interval_secs: 3600,
            stale_pending_minutes: 60,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_rejects_shared_roots() {
        let mut c = config();
        c.storage_temp_root = c.storage_root.clone();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_rejects_non_postgres_url() {
        let mut c = config();
        c.database_url = "mysql://localhost/x".to_string();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_max_file_size_conversion() {
        assert_eq!(megabytes_to_bytes(100).unwrap(), 100 * 1024 * 1024);
        assert!(megabytes_to_bytes(u64::MAX).is_err());
    }

    #[test]
    fn test_rejects_zero_max_size() {
        let mut c = config();
        c.max_file_size_bytes = 0;
        assert!(c.validate().is_err());
    }
}
