//! discbox-server – entry point.
//!
//! `serve` startup order:
//! 1. Load `.env` and parse configuration from environment variables.
//! 2. Initialise structured tracing.
//! 3. Prepare working directories and build the collaborators.
//! 4. Spawn the sequential scheduler.
//! 5. Build the Axum router and start the HTTP server with graceful
//!    shutdown.
//!
//! `sync` drives the single-job streaming flow against a running server.

mod client;
mod error;
mod routes;
mod schemas;
mod sse;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use discbox::{
    BeetsImporter, Config, JobProgressBroadcaster, JobStore, Scheduler, SyncPipeline, YtdlpFetcher,
};

use crate::state::AppState;

#[derive(Parser)]
#[command(
    name = "discbox-server",
    version,
    about = "Album download and library organization service"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API server.
    Serve {
        /// Host to bind (overrides DISCBOX_HOST).
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides DISCBOX_PORT).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a single sync against a running server, streaming progress.
    Sync {
        /// Album or playlist URL to sync.
        url: String,
        /// Base URL of the server.
        #[arg(long, default_value = "http://127.0.0.1:8337")]
        server: String,
        /// Audio format override for this job.
        #[arg(long)]
        format: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match Cli::parse().command {
        Command::Serve { host, port } => serve(host, port).await,
        Command::Sync {
            url,
            server,
            format,
        } => {
            let success = client::run_sync(&server, &url, format.as_deref()).await?;
            if !success {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::from_env();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config.prepare()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        library = %config.library_dir.display(),
        "discbox-server starting"
    );

    let fetcher = YtdlpFetcher::new(&config.audio_format, &config.audio_quality);
    let importer = BeetsImporter::new(&config.beets_config, &config.library_dir);

    let store = Arc::new(JobStore::new(config.queue_capacity));
    let broadcaster = JobProgressBroadcaster::default();
    let pipeline = Arc::new(SyncPipeline::new(
        Arc::new(fetcher),
        Arc::new(importer),
        config.download_dir.clone(),
    ));
    let scheduler = Scheduler::spawn(store, pipeline, broadcaster);

    let state = Arc::new(AppState {
        scheduler: Arc::clone(&scheduler),
        config: Arc::new(config.clone()),
    });
    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    info!("discbox-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", e);
    }
}
