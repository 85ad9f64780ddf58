//! walkie-server: LAN chat hub with a push-to-talk voice channel.
//!
//! Serves the WebSocket chat on one port and the HTTP fallback API on
//! another, both bound to every interface by default so phones and laptops
//! on the same network can reach it.

use std::net::UdpSocket;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use walkie_config::LogLevel;
use walkie_server::{http, serve_ws, Hub, HubConfig, HubHandle};

#[derive(Parser)]
#[command(name = "walkie-server", about = "LAN chat and push-to-talk hub")]
struct Args {
    /// Config file (defaults to the platform config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to bind.
    #[arg(long)]
    bind: Option<String>,

    /// WebSocket port.
    #[arg(long)]
    ws_port: Option<u16>,

    /// HTTP fallback port.
    #[arg(long)]
    http_port: Option<u16>,

    /// Log level when RUST_LOG is unset.
    #[arg(long)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config =
        walkie_config::load_config(args.config.as_deref()).context("failed to load config")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.ws_port {
        config.server.ws_port = port;
    }
    if let Some(port) = args.http_port {
        config.server.http_port = port;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    walkie_config::validation::validate(&config).context("invalid settings")?;

    let level = config.logging.level.as_str();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("walkie_server={level}").into()),
        )
        .init();

    let server = &config.server;
    let (hub, hub_task) = HubHandle::spawn(Hub::new(HubConfig {
        history_limit: server.history_limit as usize,
        max_text_chars: server.max_text_chars as usize,
    }));

    let ws_listener = TcpListener::bind(server.ws_addr())
        .await
        .with_context(|| format!("failed to bind {}", server.ws_addr()))?;
    let http_listener = TcpListener::bind(server.http_addr())
        .await
        .with_context(|| format!("failed to bind {}", server.http_addr()))?;

    tracing::info!(
        ws = %server.ws_addr(),
        http = %server.http_addr(),
        history = server.history_limit,
        "walkie-server listening"
    );
    if let Some(ip) = lan_address() {
        tracing::info!("Connect from the LAN at ws://{}:{}", ip, server.ws_port);
    }

    tokio::spawn(serve_ws(
        ws_listener,
        hub.clone(),
        server.session_queue as usize,
    ));

    let app = http::router(hub);
    let http_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, app).await {
            tracing::error!(error = %e, "HTTP server stopped");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("Shutting down");
    http_task.abort();
    hub_task.abort();
    Ok(())
}

/// Best-effort local address for the startup banner. No packet is sent.
fn lan_address() -> Option<std::net::IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}
