//! `docketd`: runs a docket instance, ingesting any files named on the
//! command line, until interrupted.

use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docket_service::{ServiceConfig, ServiceContainer, UploadedFile};

const FALLBACK_MIME: &str = "text/plain";

/// Describe a local file as an upload, sniffing its MIME type.
fn upload_for(path: &Path) -> anyhow::Result<UploadedFile> {
    let metadata =
        std::fs::metadata(path).with_context(|| format!("cannot stat {}", path.display()))?;
    let mime_type = infer::get_from_path(path)
        .ok()
        .flatten()
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string());
    let original_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    let storage_path = std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string();

    Ok(UploadedFile {
        original_name,
        mime_type,
        size_bytes: metadata.len(),
        storage_path,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   RUST_LOG    - standard env filter (default: "docket=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        concat!(
            "docketd=info,docket_service=info,docket_db=info,",
            "docket_search=info,docket_jobs=info,docket_cache=info"
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = Path::new(path).parent().unwrap_or(Path::new("."));
        let file_name = Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("docketd.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = ServiceConfig::from_env();
    let container = ServiceContainer::build(config)
        .await
        .context("failed to build service container")?;
    let docs = container.documents();

    for arg in std::env::args().skip(1) {
        let path = Path::new(&arg);
        match upload_for(path) {
            Ok(upload) => match docs.ingest_and_wait(upload).await {
                Ok(record) => info!(
                    record_id = %record.id,
                    name = %record.original_name,
                    chars = record.extracted_text.len(),
                    extraction_error = record.has_extraction_error(),
                    "Ingested file"
                ),
                Err(e) => warn!(path = %arg, error = %e, "Ingest failed"),
            },
            Err(e) => warn!(path = %arg, error = %e, "Skipping unreadable path"),
        }
    }

    let health = container.health();
    info!(
        health = %serde_json::to_string(&health).unwrap_or_default(),
        "Service ready, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    container.shutdown().await?;
    Ok(())
}
