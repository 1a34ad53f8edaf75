//! atvplay - play a local media file on an AirPlay-style receiver.
//!
//! Connects the reverse-HTTP control link, publishes the file over a local
//! HTTP server on the interface the receiver can reach, asks the receiver to
//! play it, then waits for Ctrl+C or for the receiver to hang up.

mod config;
mod media_server;

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use atvlink_core::Link;
use clap::Parser;
use tokio::signal;

use crate::config::PlayerConfig;
use crate::media_server::start_media_server;

/// Play a local media file on an AirPlay-style receiver.
#[derive(Parser, Debug)]
#[command(name = "atvplay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media file to play.
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Receiver control address (host:port).
    #[arg(short, long, env = "ATVPLAY_TARGET")]
    target: Option<String>,

    /// Extension to serve the file with.
    #[arg(short, long, env = "ATVPLAY_EXT")]
    ext: Option<String>,

    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "ATVPLAY_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Seconds between keep-alive no-ops; 0 disables them.
    #[arg(long, env = "ATVPLAY_KEEPALIVE_SECS")]
    keepalive_secs: Option<u64>,

    /// IP address to serve media on (overrides the control link's local address).
    #[arg(short = 'a', long, env = "ATVPLAY_ADVERTISE_IP")]
    advertise_ip: Option<IpAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("atvplay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        PlayerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(target) = args.target {
        config.target = target;
    }
    if let Some(ext) = args.ext {
        config.extension = ext;
    }
    if let Some(secs) = args.keepalive_secs {
        config.keepalive_interval_secs = secs;
    }
    if let Some(ip) = args.advertise_ip {
        config.advertise_ip = Some(ip);
    }

    let file = std::fs::canonicalize(&args.file)
        .with_context(|| format!("Media file not found: {}", args.file.display()))?;
    if !file.is_file() {
        anyhow::bail!("Not a regular file: {}", file.display());
    }

    log::info!(
        "Configuration: target={}, extension={}, keepalive={}s",
        config.target,
        config.extension,
        config.keepalive_interval_secs
    );

    let link = Link::connect(config.target.as_str(), &config.to_link_config())
        .await
        .with_context(|| format!("Failed to open control link to {}", config.target))?;

    // Serve on the interface the receiver was reached through, unless overridden.
    let ip = config.advertise_ip.unwrap_or_else(|| link.local_addr().ip());
    let server = start_media_server(&file, ip, &config.extension)
        .await
        .context("Failed to start media server")?;

    log::info!("Serving {} at {}", file.display(), server.url());

    if let Err(e) = link.play(server.url()).await {
        link.close().await;
        server.shutdown();
        return Err(e).context("Receiver rejected play request");
    }

    log::info!("Playback requested; waiting for Ctrl+C or receiver hangup");

    let outcome = tokio::select! {
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
            Ok(())
        }
        idle = link.idle() => idle.context("Control link ended unexpectedly"),
    };

    link.close().await;
    server.shutdown();

    log::info!("Shutdown complete");
    outcome
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
