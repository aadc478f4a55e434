use std::path::Path;
use std::sync::Arc;

use filehost_core::Config;
use filehost_ingest::{FileLogSink, LogSink, TracingLogSink};

/// Content type assumed for a local file when none is given on the command line.
pub fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("txt") | Some("log") => "text/plain",
        Some("csv") => "text/csv",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

/// The error-log sink: append to `ERROR_LOG_PATH` when set, otherwise emit
/// through tracing.
pub fn error_log_sink(config: &Config) -> Arc<dyn LogSink> {
    match &config.error_log_path {
        Some(path) => Arc::new(FileLogSink::new(path.clone())),
        None => Arc::new(TracingLogSink),
    }
}

/// Initialize tracing for CLI binaries.
///
/// `RUST_LOG` overrides the default filter; `LOG_FORMAT=json` switches to
/// JSON lines.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("filehost=info,info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guess_content_type_known_extensions() {
        assert_eq!(guess_content_type(Path::new("a/report.PDF")), "application/pdf");
        assert_eq!(guess_content_type(Path::new("notes.txt")), "text/plain");
        assert_eq!(guess_content_type(Path::new("photo.jpeg")), "image/jpeg");
    }

    #[test]
    fn guess_content_type_falls_back_to_octet_stream() {
        assert_eq!(
            guess_content_type(Path::new("archive.tar.xz")),
            "application/octet-stream"
        );
        assert_eq!(
            guess_content_type(Path::new("Makefile")),
            "application/octet-stream"
        );
    }
}
