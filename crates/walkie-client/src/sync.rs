//! Background sync over the HTTP fallback.
//!
//! Posts queued text entries to `POST /api/messages` so they reach the
//! server even before the socket comes back. Audio entries, and everything
//! composed after one, stay queued for socket replay.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkie_common::{TransportError, WalkieError};

use crate::outbox::Compose;
use crate::store::OutboxStore;

#[derive(Serialize)]
struct PostBody<'a> {
    id: &'a str,
    user: &'a str,
    text: &'a str,
}

pub struct BackgroundSync {
    client: reqwest::Client,
    endpoint: String,
    store: Arc<dyn OutboxStore>,
}

impl BackgroundSync {
    pub fn new(http_url: &str, store: Arc<dyn OutboxStore>) -> Result<Self, WalkieError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/messages", http_url.trim_end_matches('/')),
            store,
        })
    }

    /// Run a pass for every wake-up until the trigger is dropped.
    pub fn spawn(self, mut trigger: mpsc::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while trigger.recv().await.is_some() {
                match self.run_once().await {
                    Ok(0) => {}
                    Ok(n) => info!(synced = n, "Background sync delivered queued messages"),
                    Err(e) => warn!(error = %e, "Background sync failed, will retry later"),
                }
            }
            debug!("Background sync stopped");
        })
    }

    /// Post the leading run of queued text entries in order. Stops at the
    /// first audio entry so nothing overtakes it, and at the first network
    /// failure; entries are removed only once the server has them.
    pub async fn run_once(&self) -> Result<usize, WalkieError> {
        let mut delivered = 0;
        for entry in self.store.list().await? {
            let Compose::Text { id, user, text } = &entry.compose else {
                debug!(id = %entry.id(), "Audio entry queued, leaving the rest for the socket");
                break;
            };

            let resp = self
                .client
                .post(&self.endpoint)
                .json(&PostBody { id, user, text })
                .send()
                .await
                .map_err(|e| TransportError::Http(e.to_string()))?;

            match resp.status() {
                // 200 means the id was already logged.
                StatusCode::CREATED | StatusCode::OK => {
                    self.store.remove(id).await?;
                    delivered += 1;
                }
                status => {
                    warn!(id = %id, status = %status, "Server refused queued message");
                    return Err(TransportError::Http(format!("unexpected status {status}")).into());
                }
            }
        }
        Ok(delivered)
    }
}
