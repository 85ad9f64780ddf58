//! Messages composed while offline, waiting to be replayed.
//!
//! Every entry carries its final message id from the moment it is composed,
//! so replaying the same entry twice (socket drain racing a background sync
//! pass, or a drop between write and removal) is absorbed by the server's
//! id dedupe.

use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkie_common::{
    new_id, now_timestamp, ChatMessage, ClientEvent, MessageBody, SendAudioPayload,
    SendMessagePayload, WalkieError,
};

use crate::store::OutboxStore;
use crate::transport::Transport;

/// A message the user composed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Compose {
    Text {
        id: String,
        user: String,
        text: String,
    },
    Audio {
        id: String,
        user: String,
        audio: String,
        duration: f64,
    },
}

impl Compose {
    pub fn text(user: &str, text: &str) -> Self {
        Compose::Text {
            id: new_id(),
            user: user.to_string(),
            text: text.to_string(),
        }
    }

    /// An audio message from raw recorded bytes.
    pub fn audio(user: &str, bytes: &[u8], duration: f64) -> Self {
        Compose::Audio {
            id: new_id(),
            user: user.to_string(),
            audio: base64::engine::general_purpose::STANDARD.encode(bytes),
            duration,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Compose::Text { id, .. } | Compose::Audio { id, .. } => id,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Compose::Text { .. })
    }

    pub fn to_event(&self) -> ClientEvent {
        match self.clone() {
            Compose::Text { id, user, text } => ClientEvent::SendMessage(SendMessagePayload {
                id: Some(id),
                user,
                text,
            }),
            Compose::Audio {
                id,
                user,
                audio,
                duration,
            } => ClientEvent::SendAudio(SendAudioPayload {
                id: Some(id),
                user,
                audio,
                duration,
            }),
        }
    }

    /// The optimistic local copy shown until the server echoes it back.
    pub fn to_local_message(&self) -> ChatMessage {
        let (id, user, body) = match self.clone() {
            Compose::Text { id, user, text } => (id, user, MessageBody::Text { text }),
            Compose::Audio {
                id,
                user,
                audio,
                duration,
            } => (id, user, MessageBody::Audio { audio, duration }),
        };
        ChatMessage {
            id,
            user,
            body,
            timestamp: now_timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub compose: Compose,
    pub pending: bool,
    pub queued_at: String,
}

impl OutboxEntry {
    pub fn new(compose: Compose) -> Self {
        Self {
            compose,
            pending: true,
            queued_at: now_timestamp(),
        }
    }

    pub fn id(&self) -> &str {
        self.compose.id()
    }
}

/// FIFO queue over a durable store.
#[derive(Clone)]
pub struct Outbox {
    store: Arc<dyn OutboxStore>,
}

impl Outbox {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn OutboxStore> {
        Arc::clone(&self.store)
    }

    pub async fn enqueue(&self, compose: Compose) -> Result<(), WalkieError> {
        debug!(id = %compose.id(), "Queueing message for replay");
        self.store.put(OutboxEntry::new(compose)).await?;
        Ok(())
    }

    pub async fn entries(&self) -> Result<Vec<OutboxEntry>, WalkieError> {
        Ok(self.store.list().await?)
    }

    pub async fn len(&self) -> Result<usize, WalkieError> {
        Ok(self.store.list().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, WalkieError> {
        Ok(self.len().await? == 0)
    }

    /// Replay queued entries in order. Each entry is removed only after the
    /// transport accepted it; the first failure stops the drain and leaves
    /// the rest stored.
    pub async fn drain(&self, transport: &dyn Transport) -> Result<usize, WalkieError> {
        let entries = self.store.list().await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let mut sent = 0;
        for entry in entries {
            transport.emit(entry.compose.to_event()).await?;
            self.store.remove(entry.id()).await?;
            sent += 1;
        }
        info!(sent, "Outbox drained");
        Ok(sent)
    }
}
