//! The seam between client logic and the socket.

use async_trait::async_trait;
use walkie_common::{AudioFrame, ClientEvent, TransportError};

/// Something that can carry client events to the server.
///
/// `emit` resolves once the frame was written. `try_emit_audio` never
/// waits so it can be called from an audio capture callback.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn emit(&self, event: ClientEvent) -> Result<(), TransportError>;

    fn try_emit_audio(&self, frame: AudioFrame) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}
