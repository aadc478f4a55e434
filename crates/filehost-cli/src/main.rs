//! filehost CLI: operate the ingestion pipeline from the command line.
//!
//! Reads configuration from the environment (`DATABASE_URL`, `STORAGE_ROOT`,
//! `STORAGE_TEMP_ROOT`, ...); a `.env` file is honoured.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use filehost_cli::{error_log_sink, guess_content_type, init_tracing};
use filehost_core::models::{RequestContext, UploadMetadata};
use filehost_core::Config;
use filehost_db::{connect_pool, run_migrations, PostgresMetadataStore};
use filehost_ingest::{FileUploadCoordinator, IngestOutcome, RetentionService, UploadPolicy};
use filehost_storage::create_storage;
use futures::StreamExt;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "filehost", about = "File ingestion pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Ingest a local file
    Ingest {
        /// Path to the file to ingest
        file: PathBuf,
        /// Content type; guessed from the extension when omitted
        #[arg(long)]
        content_type: Option<String>,
        /// Client IP recorded with the attempt
        #[arg(long)]
        client_ip: Option<String>,
    },
    /// Show a stored file's record
    Get {
        /// File UUID
        id: Uuid,
    },
    /// Copy a stored file's bytes to a local path
    Download {
        /// File UUID
        id: Uuid,
        /// Destination path
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Remove every trace of an unfinished upload
    Recover {
        /// File UUID
        id: Uuid,
    },
    /// Recover uploads left pending for too long
    Reconcile {
        /// Age in minutes after which a pending upload is abandoned
        #[arg(long)]
        minutes: Option<i64>,
    },
    /// Failure counts per error type
    Stats {
        /// Trailing window in days
        #[arg(long, default_value = "7")]
        days: u32,
    },
    /// Delete failed attempts older than the retention window
    CleanupErrorLogs {
        /// Retention in days; defaults to ERROR_LOG_RETENTION_DAYS
        #[arg(long)]
        days: Option<u32>,
    },
    /// Run the retention loop until interrupted
    ServeRetention,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", s);
    Ok(())
}

async fn build_coordinator(
    config: &Config,
) -> anyhow::Result<FileUploadCoordinator<PostgresMetadataStore>> {
    let pool = connect_pool(config).await?;
    let store = Arc::new(PostgresMetadataStore::new(pool));
    let storage = create_storage(config)
        .await
        .context("Failed to initialize storage")?;
    Ok(FileUploadCoordinator::new(
        store,
        storage,
        UploadPolicy::from_config(config),
        error_log_sink(config),
    ))
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("Failed to install signal handler")?;
        tokio::select! {
            result = ctrl_c => {
                result.context("Failed to install Ctrl+C handler")?;
                tracing::info!("Received Ctrl+C signal");
            },
            _ = terminate.recv() => {
                tracing::info!("Received terminate signal");
            },
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("Failed to install Ctrl+C handler")?;
        tracing::info!("Received Ctrl+C signal");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Migrate => {
            let pool = connect_pool(&config).await?;
            run_migrations(&pool).await?;
            print_json(&serde_json::json!({ "success": true }))?;
        }
        Commands::Ingest {
            file,
            content_type,
            client_ip,
        } => {
            let coordinator = build_coordinator(&config).await?;
            let handle = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Open {}", file.display()))?;
            let declared_size = handle.metadata().await.ok().map(|m| m.len());
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let content_type =
                content_type.unwrap_or_else(|| guess_content_type(&file).to_string());
            let ctx = RequestContext::new(
                client_ip,
                Some(format!("filehost-cli/{}", env!("CARGO_PKG_VERSION"))),
            );

            match coordinator
                .ingest(
                    handle,
                    UploadMetadata::new(filename, content_type, declared_size),
                    &ctx,
                )
                .await
            {
                Ok(IngestOutcome::Stored(file)) => {
                    print_json(&serde_json::json!({ "status": "stored", "file": file }))?;
                }
                Ok(IngestOutcome::Deduplicated {
                    file,
                    discarded_uuid,
                }) => {
                    print_json(&serde_json::json!({
                        "status": "deduplicated",
                        "discarded_uuid": discarded_uuid,
                        "file": file,
                    }))?;
                }
                Err(response) => {
                    print_json(&response)?;
                    anyhow::bail!(
                        "Upload failed with {} (error id {})",
                        response.error_type,
                        response.error_id
                    );
                }
            }
        }
        Commands::Get { id } => {
            let coordinator = build_coordinator(&config).await?;
            let file = coordinator
                .get_file(id)
                .await?
                .with_context(|| format!("File {} not found", id))?;
            print_json(&file)?;
        }
        Commands::Download { id, output } => {
            let coordinator = build_coordinator(&config).await?;
            let mut download = coordinator
                .open_download(id)
                .await?
                .with_context(|| format!("File {} not found", id))?;
            let mut out = tokio::fs::File::create(&output)
                .await
                .with_context(|| format!("Create {}", output.display()))?;
            let mut written: u64 = 0;
            while let Some(chunk) = download.stream.next().await {
                let chunk = chunk?;
                out.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            out.flush().await?;
            print_json(&serde_json::json!({
                "file_uuid": id,
                "output": output,
                "bytes": written,
            }))?;
        }
        Commands::Recover { id } => {
            let coordinator = build_coordinator(&config).await?;
            let report = coordinator.recovery().recover(id).await;
            print_json(&report)?;
        }
        Commands::Reconcile { minutes } => {
            let coordinator = build_coordinator(&config).await?;
            let minutes = minutes.unwrap_or(config.stale_pending_minutes);
            let reports = coordinator
                .recovery()
                .reconcile_stale(chrono::Duration::minutes(minutes))
                .await?;
            print_json(&reports)?;
        }
        Commands::Stats { days } => {
            let coordinator = build_coordinator(&config).await?;
            let stats = coordinator.statistics().get_error_statistics(days).await?;
            print_json(&stats)?;
        }
        Commands::CleanupErrorLogs { days } => {
            let coordinator = build_coordinator(&config).await?;
            let days = days.unwrap_or(config.error_log_retention_days);
            let deleted = coordinator
                .statistics()
                .cleanup_old_error_logs(days)
                .await?;
            print_json(&serde_json::json!({ "retention_days": days, "deleted": deleted }))?;
        }
        Commands::ServeRetention => {
            let coordinator = build_coordinator(&config).await?;
            let service = Arc::new(RetentionService::new(
                coordinator.statistics(),
                coordinator.recovery().clone(),
                config.error_log_retention_days,
                chrono::Duration::minutes(config.stale_pending_minutes),
                Duration::from_secs(config.retention_interval_secs),
            ));
            let handle = service.start();
            tracing::info!(
                interval_secs = config.retention_interval_secs,
                "Retention service started"
            );
            shutdown_signal().await?;
            handle.abort();
        }
    }

    Ok(())
}
