//! WeChat MP login proxy (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                 MP LOGIN PROXY                   │
//!   Browser            │  ┌─────────┐    ┌──────────┐    ┌─────────────┐  │
//!   ───────────────────┼─▶│  http   │───▶│  qrcode  │───▶│  upstream   │──┼──▶ mp.weixin.qq.com
//!                      │  │ server  │    │ handler  │    │ client+retry│  │
//!   ◀──────────────────┼──│ (CORS)  │◀───│          │◀───│ + deadline  │◀─┼───
//!                      │  └─────────┘    └──────────┘    └─────────────┘  │
//!                      │                                                  │
//!                      │  ┌────────────────────────────────────────────┐  │
//!                      │  │ config · observability · lifecycle · kv    │  │
//!                      │  └────────────────────────────────────────────┘  │
//!                      └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use mp_login_proxy::config::{load_config, AppConfig};
use mp_login_proxy::lifecycle::{signals, Shutdown};
use mp_login_proxy::observability::{init_tracing, metrics};
use mp_login_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "mp-login-proxy")]
#[command(about = "Proxy for the WeChat MP QR-code login flow", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_tracing(&config.observability);
    tracing::info!("mp-login-proxy v0.1.0 starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.qrcode_endpoint,
        timeout_ms = config.upstream.timeout_ms,
        max_attempts = config.upstream.max_attempts,
        kv_backend = ?config.kv.backend,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(&shutdown);

    let server = HttpServer::from_config(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
