//! GNSS Share server
//!
//! Streams position fixes read as JSON lines (stdin by default) to every
//! connected receiver.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gs_core::config::{self, ServerConfig};
use gs_core::traits::PositionSource;
use gs_server::source::JsonLinesSource;
use gs_server::{LinkServer, ServerHandle};

#[derive(Parser)]
#[command(name = "gnss-share-server")]
#[command(about = "Share this device's position fixes with receivers on the local network")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Read position lines from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("GNSS Share server starting...");

    let mut config = load_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    let source: Box<dyn PositionSource> = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open position input {:?}", path))?;
            Box::new(JsonLinesSource::new(BufReader::new(file)))
        }
        None => Box::new(JsonLinesSource::new(BufReader::new(tokio::io::stdin()))),
    };

    let server = LinkServer::bind(&config, source)
        .await
        .context("Failed to start server")?;
    let handle = server.handle();

    tokio::spawn(shutdown_on_signal(handle.clone()));
    tokio::spawn(log_status(handle));

    server.run().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<ServerConfig> {
    if let Some(path) = path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path("server");
    if default_path.exists() {
        Ok(config::load_config(&default_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            ServerConfig::default()
        }))
    } else {
        tracing::info!("Using default configuration");
        Ok(ServerConfig::default())
    }
}

async fn shutdown_on_signal(handle: ServerHandle) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }

    handle.shutdown();
}

/// Log receiver count and ingestion changes
async fn log_status(handle: ServerHandle) {
    let mut status = handle.watch();
    let mut last = status.borrow().clone();

    while status.changed().await.is_ok() {
        let current = status.borrow_and_update().clone();
        if current.sessions != last.sessions || current.ingesting != last.ingesting {
            let fix_age = current
                .last_fix_age()
                .map(|age| format!("{:.1}s", age))
                .unwrap_or_else(|| "n/a".to_string());
            tracing::info!(
                "{} receiver(s) connected, ingestion {}, {} satellites, last fix age {}",
                current.sessions,
                if current.ingesting { "active" } else { "idle" },
                current.satellites,
                fix_age
            );
        }
        last = current;
    }
}
