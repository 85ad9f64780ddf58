//! walkie-server: chat hub and push-to-talk relay for a local network.
//!
//! One hub actor owns the message log, presence and the voice channel.
//! Each WebSocket connection runs in its own task and talks to the hub
//! through a [`HubHandle`]. An HTTP fallback accepts messages posted by
//! clients that cannot hold a socket open.

pub mod connection;
pub mod history;
pub mod http;
pub mod hub;
pub mod presence;
pub mod session;
pub mod voice;

use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

pub use hub::{Hub, HubConfig, HubStatus, PostOutcome};
pub use session::HubHandle;

use crate::connection::handle_connection;

/// Accept WebSocket clients forever, one task per connection.
pub async fn serve_ws(listener: TcpListener, hub: HubHandle, queue: usize) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let hub = hub.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, hub, queue).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
