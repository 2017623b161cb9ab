//! wcon-server: Web Console relay server.
//!
//! Spawns the managed process, accepts WebSocket viewer connections, streams
//! sanitized console output to them in periodic batches, and routes
//! authorized viewer commands to the process's stdin.

mod audit;
mod auth;
mod broadcast;
mod config;
mod connection;
mod handler;
mod history;
mod server;
mod supervisor;
mod transport;

use clap::Parser;
use config::ServerConfig;
use server::WconServer;
use std::path::PathBuf;
use tracing::{error, info};

/// wcon-server — Web Console relay
#[derive(Parser, Debug)]
#[command(name = "wcon-server", version, about = "Web Console relay server")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Command line of the managed process (e.g. "./server +exec server.cfg")
    #[arg(long)]
    command: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.wcon/config.toml")]
    config: String,

    /// Enable non-essential diagnostic logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing. --verbose raises the default filter to debug;
    // RUST_LOG still wins when set.
    use tracing_subscriber::EnvFilter;
    let default_filter = if cli.verbose {
        "debug"
    } else {
        cli.log_level.as_str()
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    // Load server config (file + CLI overrides)
    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(
        Some(&config_path),
        cli.port,
        cli.command.as_deref(),
        cli.verbose,
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = server_config.port,
        "starting wcon-server"
    );

    let wcon_server = match WconServer::new(server_config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create server");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = wcon_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("wcon-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
