//! Background WebSocket connection loop with auto-reconnect.
//!
//! One task owns the socket. Callers hold a cloneable [`ConnectionHandle`]
//! and receive [`ConnectionEvent`]s on the channel returned by
//! [`ConnectionHandle::connect`]. Event commands are acknowledged only
//! after the frame was written, which is what lets the outbox remove an
//! entry safely. Inbound events are buffered in the task, so a slow
//! receiver never blocks the command side.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};
use walkie_common::{AudioFrame, ClientEvent, ServerEvent, TransportError};
use walkie_config::ClientConfig;

use crate::transport::Transport;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
    pub connect_timeout_secs: u64,
}

impl From<&ClientConfig> for ConnectionConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            url: config.server_url.clone(),
            reconnect_delay_secs: config.reconnect_delay_secs,
            max_reconnect_delay_secs: config.max_reconnect_delay_secs,
            connect_timeout_secs: config.connect_timeout_secs,
        }
    }
}

/// What the connection loop reports.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Server(ServerEvent),
    Audio(AudioFrame),
    Error(String),
}

enum Command {
    Event {
        event: ClientEvent,
        ack: oneshot::Sender<Result<(), TransportError>>,
    },
    Audio(AudioFrame),
    Close,
}

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Socket dropped; reconnect.
    Dropped,
    /// Handle asked to close or went away; stop.
    Closed,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to the background connection. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionHandle {
    command_tx: mpsc::Sender<Command>,
    connected: Arc<AtomicBool>,
}

impl ConnectionHandle {
    /// Start the background connection. Returns `(handle, event_receiver)`.
    pub fn connect(config: ConnectionConfig) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(256);
        let connected = Arc::new(AtomicBool::new(false));

        let handle = Self {
            command_tx,
            connected: Arc::clone(&connected),
        };

        tokio::spawn(connection_loop(config, connected, event_tx, command_rx));

        (handle, event_rx)
    }

    /// Close the socket and stop reconnecting.
    pub async fn close(&self) {
        let _ = self.command_tx.send(Command::Close).await;
    }
}

#[async_trait]
impl Transport for ConnectionHandle {
    async fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let (ack, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Event { event, ack })
            .await
            .map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)?
    }

    fn try_emit_audio(&self, frame: AudioFrame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.command_tx
            .try_send(Command::Audio(frame))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Backoff step: double, capped at `max`.
pub(crate) fn next_delay(current: u64, max: u64) -> u64 {
    current.saturating_mul(2).min(max).max(1)
}

async fn connection_loop(
    config: ConnectionConfig,
    connected: Arc<AtomicBool>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    mut command_rx: mpsc::Receiver<Command>,
) {
    let mut reconnect_delay = config.reconnect_delay_secs;
    // Events not yet taken by the receiver. Commands keep flowing while
    // this is non-empty, so a caller awaiting an ack never stalls the socket.
    let mut inbound: VecDeque<ConnectionEvent> = VecDeque::new();

    loop {
        info!(url = %config.url, "Connecting to walkie server");

        match tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_secs),
            tokio_tungstenite::connect_async(config.url.as_str()),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                connected.store(true, Ordering::SeqCst);
                inbound.push_back(ConnectionEvent::Connected);

                let end = run_session(ws_stream, &mut command_rx, &event_tx, &mut inbound).await;

                connected.store(false, Ordering::SeqCst);
                let keep_running = reject_queued(&mut command_rx);
                inbound.push_back(ConnectionEvent::Disconnected);
                if end == SessionEnd::Closed || !keep_running {
                    info!("Connection closed");
                    let _ = flush_rejecting(&mut command_rx, &event_tx, &mut inbound).await;
                    return;
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to walkie server");
                inbound.push_back(ConnectionEvent::Error(format!("Connection failed: {e}")));
            }
            Err(_elapsed) => {
                let secs = config.connect_timeout_secs;
                error!("WebSocket connection timed out after {secs}s");
                inbound.push_back(ConnectionEvent::Error(
                    TransportError::Timeout(secs).to_string(),
                ));
            }
        }

        if !flush_rejecting(&mut command_rx, &event_tx, &mut inbound).await {
            return;
        }

        // Exponential backoff reconnect.
        info!(
            delay = reconnect_delay,
            "Reconnecting in {} seconds", reconnect_delay
        );
        if !wait_rejecting(&mut command_rx, Duration::from_secs(reconnect_delay)).await {
            return;
        }
        reconnect_delay = next_delay(reconnect_delay, config.max_reconnect_delay_secs);
    }
}

async fn run_session<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    command_rx: &mut mpsc::Receiver<Command>,
    event_tx: &mpsc::Sender<ConnectionEvent>,
    inbound: &mut VecDeque<ConnectionEvent>,
) -> SessionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            permit = event_tx.reserve(), if !inbound.is_empty() => match permit {
                Ok(permit) => {
                    if let Some(event) = inbound.pop_front() {
                        permit.send(event);
                    }
                }
                Err(_) => return SessionEnd::Closed,
            },

            cmd = command_rx.recv() => match cmd {
                Some(Command::Event { event, ack }) => {
                    let json = match event.encode() {
                        Ok(json) => json,
                        Err(e) => {
                            let _ = ack.send(Err(TransportError::WebSocket(e.to_string())));
                            continue;
                        }
                    };
                    match sink.send(WsMessage::Text(json.into())).await {
                        Ok(()) => {
                            let _ = ack.send(Ok(()));
                        }
                        Err(e) => {
                            let _ = ack.send(Err(TransportError::WebSocket(e.to_string())));
                            warn!(error = %e, "WebSocket write failed");
                            return SessionEnd::Dropped;
                        }
                    }
                }
                Some(Command::Audio(frame)) => {
                    if sink.send(WsMessage::Binary(frame.encode().into())).await.is_err() {
                        return SessionEnd::Dropped;
                    }
                }
                Some(Command::Close) | None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return SessionEnd::Closed;
                }
            },

            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match ServerEvent::decode(text.as_str()) {
                    Ok(event) => inbound.push_back(ConnectionEvent::Server(event)),
                    Err(e) => {
                        debug!(error = %e, "Unrecognized message from server");
                    }
                },
                Some(Ok(WsMessage::Binary(data))) => match AudioFrame::decode(&data) {
                    Ok(frame) => inbound.push_back(ConnectionEvent::Audio(frame)),
                    Err(e) => {
                        debug!(error = %e, "Dropping bad audio frame");
                    }
                },
                Some(Ok(WsMessage::Ping(data))) => {
                    let _ = sink.send(WsMessage::Pong(data)).await;
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Server closed connection");
                    return SessionEnd::Dropped;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    return SessionEnd::Dropped;
                }
                _ => {}
            }
        }
    }
}

/// Hand buffered events to the receiver while failing any command that
/// arrives meanwhile. Returns `false` if the handle asked to close or the
/// receiver went away.
async fn flush_rejecting(
    command_rx: &mut mpsc::Receiver<Command>,
    event_tx: &mpsc::Sender<ConnectionEvent>,
    inbound: &mut VecDeque<ConnectionEvent>,
) -> bool {
    while let Some(event) = inbound.pop_front() {
        let send = event_tx.send(event);
        tokio::pin!(send);
        loop {
            tokio::select! {
                sent = &mut send => {
                    if sent.is_err() {
                        return false;
                    }
                    break;
                }
                cmd = command_rx.recv() => match cmd {
                    Some(cmd) => {
                        if !reject(cmd) {
                            return false;
                        }
                    }
                    None => return false,
                },
            }
        }
    }
    true
}

/// Fail commands that raced the disconnect. Returns `false` if the handle
/// asked to close.
fn reject_queued(command_rx: &mut mpsc::Receiver<Command>) -> bool {
    while let Ok(cmd) = command_rx.try_recv() {
        if !reject(cmd) {
            return false;
        }
    }
    true
}

/// Sleep for `delay`, failing any command that arrives meanwhile. Returns
/// `false` if the handle asked to close or went away.
async fn wait_rejecting(command_rx: &mut mpsc::Receiver<Command>, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = command_rx.recv() => match cmd {
                Some(cmd) => {
                    if !reject(cmd) {
                        return false;
                    }
                }
                None => return false,
            },
        }
    }
}

fn reject(cmd: Command) -> bool {
    match cmd {
        Command::Event { ack, .. } => {
            let _ = ack.send(Err(TransportError::NotConnected));
            true
        }
        Command::Audio(_) => true,
        Command::Close => false,
    }
}
