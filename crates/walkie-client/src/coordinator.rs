//! Online/offline bookkeeping for outgoing messages.
//!
//! While online, sends go straight to the transport. While offline, or when
//! the transport refuses a send, the message is queued in the outbox. Every
//! (re)connection re-announces the user and then drains the outbox in order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkie_common::{ClientEvent, WalkieError};

use crate::outbox::{Compose, Outbox};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Stored for replay; show it as pending.
    Queued,
}

pub struct Coordinator {
    user: String,
    transport: Arc<dyn Transport>,
    outbox: Outbox,
    state: LinkState,
    /// Wakes the background sync task, if there is one.
    sync_trigger: Option<mpsc::Sender<()>>,
}

impl Coordinator {
    pub fn new(user: &str, transport: Arc<dyn Transport>, outbox: Outbox) -> Self {
        Self {
            user: user.to_string(),
            transport,
            outbox,
            state: LinkState::Offline,
            sync_trigger: None,
        }
    }

    pub fn with_sync_trigger(mut self, trigger: mpsc::Sender<()>) -> Self {
        self.sync_trigger = Some(trigger);
        self
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Change the display name and announce it if connected.
    pub async fn rename(&mut self, user: &str) -> Result<(), WalkieError> {
        self.user = user.to_string();
        if self.state == LinkState::Online {
            self.transport
                .emit(ClientEvent::UserJoined(self.user.clone()))
                .await?;
        }
        Ok(())
    }

    pub async fn send(&mut self, compose: Compose) -> Result<SendOutcome, WalkieError> {
        if self.state == LinkState::Online {
            match self.transport.emit(compose.to_event()).await {
                Ok(()) => return Ok(SendOutcome::Sent),
                Err(e) => {
                    warn!(id = %compose.id(), error = %e, "Send failed, queueing");
                    self.state = LinkState::Offline;
                }
            }
        }

        self.outbox.enqueue(compose).await?;
        self.request_sync();
        Ok(SendOutcome::Queued)
    }

    /// Re-announce, then replay the outbox. Safe to call on every connect.
    pub async fn on_connected(&mut self) -> Result<usize, WalkieError> {
        self.state = LinkState::Online;
        if let Err(e) = self
            .transport
            .emit(ClientEvent::UserJoined(self.user.clone()))
            .await
        {
            warn!(error = %e, "Re-announce failed");
            self.state = LinkState::Offline;
            return Err(e.into());
        }

        match self.outbox.drain(self.transport.as_ref()).await {
            Ok(sent) => Ok(sent),
            Err(e) => {
                warn!(error = %e, "Outbox drain interrupted");
                self.state = LinkState::Offline;
                Err(e)
            }
        }
    }

    pub fn on_disconnected(&mut self) {
        if self.state == LinkState::Online {
            info!("Offline, new messages will be queued");
        }
        self.state = LinkState::Offline;
    }

    fn request_sync(&self) {
        if let Some(trigger) = &self.sync_trigger {
            // A full channel already holds a pending wake-up.
            if trigger.try_send(()).is_ok() {
                debug!("Background sync requested");
            }
        }
    }
}
