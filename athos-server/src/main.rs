//! SysAthos upload server

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use athos_core::*;
use athos_engine::StorageEngine;
use athos_server::{build_service, AthosServer};

#[derive(Parser, Debug)]
#[command(name = "athos-server", version, about = "Chunked document upload service")]
struct Args {
    /// Bind address
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Data directory path
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Base of the public URLs handed out for stored files
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    public_base_url: String,

    /// Largest accepted chunk, and largest direct upload, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_CHUNK_BYTES)]
    max_chunk_bytes: u64,

    /// Largest assembled file in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FILE_BYTES)]
    max_file_bytes: u64,

    #[arg(long, default_value_t = DEFAULT_REAP_INTERVAL_SECS)]
    reap_interval_secs: u64,

    /// Idle time after which an unfinished upload is discarded
    #[arg(long, default_value_t = DEFAULT_SESSION_TIMEOUT_SECS)]
    session_timeout_secs: u64,

    /// Check assembled files against a client-supplied BLAKE3 digest
    #[arg(long)]
    verify_checksums: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            max_chunk_bytes: self.max_chunk_bytes,
            max_file_bytes: self.max_file_bytes,
            reap_interval_secs: self.reap_interval_secs,
            session_timeout_secs: self.session_timeout_secs,
            verify_checksums: self.verify_checksums,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting SysAthos upload server");
    info!("Data directory: {}", args.data_dir.display());
    info!("Bind address: {}", args.bind);

    if !args.data_dir.exists() {
        std::fs::create_dir_all(&args.data_dir)
            .with_context(|| format!("creating data directory {}", args.data_dir.display()))?;
        info!("Created data directory: {}", args.data_dir.display());
    }

    let engine = StorageEngine::new(&args.data_dir).context("initializing storage engine")?;
    info!("Storage engine initialized");

    let config = args.upload_config();
    info!(
        max_chunk_bytes = config.max_chunk_bytes,
        max_file_bytes = config.max_file_bytes,
        verify_checksums = config.verify_checksums,
        "Upload limits"
    );

    let service = Arc::new(
        build_service(&engine, &args.public_base_url, config).context("wiring upload service")?,
    );
    let reaper = service.reaper().spawn();

    let server = AthosServer::new(service);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let result = server.serve(args.bind, shutdown).await;

    reaper.shutdown().await;
    if let Err(e) = engine.persist() {
        warn!("Final persist failed: {}", e);
    }

    match &result {
        Ok(()) => info!("Server shutdown gracefully"),
        Err(e) => warn!("Server error: {}", e),
    }
    result
}
