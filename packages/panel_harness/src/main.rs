use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use panel_harness::{ConfigOverrides, HarnessConfig, HarnessState};

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "WebSocket control endpoint for remote-control client testing")]
struct Args {
    /// Config file (default: ./harness.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// WebSocket path
    #[arg(long)]
    path: Option<String>,

    /// Capture log to replay after the client sends `ready`
    #[arg(long)]
    playback: Option<PathBuf>,

    /// Interval of the unsolicited `active` message in ms (0 disables)
    #[arg(long)]
    heartbeat_ms: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let default_directive = if args.debug {
        "panel_harness=debug,harness=debug,info"
    } else {
        "panel_harness=info,harness=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let overrides = ConfigOverrides {
        host: args.host,
        port: args.port,
        path: args.path,
        heartbeat_interval_ms: args.heartbeat_ms,
        playback_file: args.playback,
    };
    let config = HarnessConfig::load(args.config.as_deref(), overrides)
        .context("Failed to load configuration")?;
    let addr = config.bind_addr()?;
    let path = config.server.path.clone();

    let state = HarnessState::new(config).context("Failed to load playback capture")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("==============================================");
    info!("Panel Harness WebSocket Server");
    info!("==============================================");
    info!("Listening on: ws://{}{}", actual_addr, path);
    if let Some(ref log) = state.playback {
        info!("Playback armed: {} events after `ready`", log.len());
    }
    info!("Waiting for client connection...");
    info!("==============================================");

    panel_harness::serve(listener, state, shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server closed");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
    info!("Shutting down server...");
}
