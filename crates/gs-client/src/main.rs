//! GNSS Share client
//!
//! Connects to a GNSS Share server and prints every link event as a JSON
//! line on stdout, for another program to consume.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gs_client::{resolver, ConnectionManager, LinkEvent};
use gs_core::config::{self, ClientConfig};

#[derive(Parser)]
#[command(name = "gnss-share-client")]
#[command(about = "Receive position fixes from a GNSS Share server")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server address; disables gateway resolution
    #[arg(short, long)]
    server: Option<String>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Only print location events
    #[arg(long)]
    locations_only: bool,

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

    // Initialize logging; stdout carries the event stream
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("GNSS Share client starting...");

    let mut config = load_config(args.config.as_deref())?;
    if let Some(server) = args.server {
        config.use_gateway = false;
        config.server_address = server;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let resolver = resolver::from_config(&config);
    let (handle, mut events) = ConnectionManager::spawn(config, resolver);

    // No network monitor here: the link is assumed usable from the start
    handle.network_available();

    let mut stdout = std::io::stdout().lock();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutting down...");
                break;
            }

            event = events.recv() => {
                let Some(event) = event else { break };
                if args.locations_only && !event.is_location() {
                    continue;
                }
                print_event(&mut stdout, &event)?;
            }
        }
    }

    handle.shutdown().await;
    tracing::info!("Client shutdown complete");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<ClientConfig> {
    if let Some(path) = path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path("client");
    if default_path.exists() {
        Ok(config::load_config(&default_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            ClientConfig::default()
        }))
    } else {
        tracing::info!("Using default configuration");
        Ok(ClientConfig::default())
    }
}

fn print_event(out: &mut impl Write, event: &LinkEvent) -> Result<()> {
    serde_json::to_writer(&mut *out, event).context("Failed to encode event")?;
    writeln!(out).context("Failed to write event")?;
    out.flush().context("Failed to flush stdout")?;
    Ok(())
}

async fn shutdown_signal() {
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
