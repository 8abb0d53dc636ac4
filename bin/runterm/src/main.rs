//! runterm - WebSocket server for interactive program sessions
//!
//! Loads configuration, applies command line overrides and serves the
//! event protocol until Ctrl-C, then stops every live session.

use std::env;
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use runterm::{create_app, run_server_with_shutdown, Config, ConfigLoader, SessionManager};

#[derive(Parser, Debug)]
#[command(name = "runterm", version, about = "Run submitted programs on a pseudo-terminal")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Address to listen on
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

fn debug_requested(args: &Args) -> bool {
    args.debug
        || env::var("RUNTERM_DEBUG").map_or(false, |v| v == "1" || v.to_lowercase() == "true")
}

fn init_logging(debug: bool) {
    let log_level = if debug { "debug" } else { "info" };
    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from(env_filter))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn load_configuration(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => match ConfigLoader::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load configuration: {}. Using defaults", e);
                Config::default()
            }
        },
    };

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn shutdown_signal(manager: SessionManager) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
    manager.shutdown().await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(debug_requested(&args));

    info!("Starting {} v{}", runterm::NAME, runterm::VERSION);
    debug!("Arguments: {:?}", args);

    let config = load_configuration(&args)?;
    let addr = config.server.bind_addr();
    debug!("Scratch root: {}", config.workspace.scratch_root.display());

    let manager = SessionManager::new(config);
    let app = create_app(manager.clone());

    run_server_with_shutdown(app, addr, shutdown_signal(manager)).await?;

    info!("runterm stopped");
    Ok(())
}
