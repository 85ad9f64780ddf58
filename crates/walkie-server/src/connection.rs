//! Per-connection handler: register with the hub, then pump frames both ways.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use walkie_common::{AudioFrame, ClientEvent, SessionId};

use crate::hub::Outbound;
use crate::session::HubHandle;

/// Handle a single WebSocket connection until either side closes it.
pub async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    addr: SocketAddr,
    hub: HubHandle,
    queue: usize,
) {
    let (mut sink, mut stream) = ws.split();
    let session = SessionId::new();

    let (tx, mut rx) = mpsc::channel::<Outbound>(queue);
    if hub.connect(session.clone(), tx).await.is_err() {
        tracing::warn!(peer = %addr, "Hub unavailable, dropping connection");
        return;
    }

    tracing::info!(peer = %addr, session = %session, "Client connected");

    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else {
                    // The hub cut this session off; the client resyncs on reconnect.
                    tracing::warn!(peer = %addr, session = %session, "Session dropped by hub");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let Some(msg) = encode_outbound(&frame) else { continue };
                if sink.send(msg).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match ClientEvent::decode(text.as_str()) {
                        Ok(event) => {
                            if hub.event(session.clone(), event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(session = %session, error = %e, "Ignoring malformed event");
                        }
                    },
                    Some(Ok(Message::Binary(data))) => match AudioFrame::decode(&data) {
                        Ok(audio) => {
                            if hub.audio(session.clone(), audio).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::debug!(session = %session, error = %e, "Ignoring bad audio frame");
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::info!(peer = %addr, session = %session, "Client disconnected");
    let _ = hub.disconnect(session).await;
}

fn encode_outbound(frame: &Outbound) -> Option<Message> {
    match frame {
        Outbound::Event(event) => match event.encode() {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode server event");
                None
            }
        },
        Outbound::Audio(audio) => Some(Message::Binary(audio.encode().into())),
    }
}
