//! walkie-client: chat and push-to-talk client for a walkie server.

pub mod capabilities;
pub mod client;
pub mod connection;
pub mod coordinator;
pub mod devices;
pub mod outbox;
pub mod ptt;
pub mod store;
pub mod sync;
pub mod transport;
pub mod view;

pub use capabilities::{Capabilities, Probe};
pub use client::{ChatClient, Update};
pub use connection::{ConnectionConfig, ConnectionEvent, ConnectionHandle};
pub use coordinator::{Coordinator, LinkState, SendOutcome};
pub use outbox::{Compose, Outbox, OutboxEntry};
pub use ptt::{AudioCapture, AudioPlayback, PlaybackScheduler, PttController, PttStart};
pub use store::{FileStore, MemoryStore, OutboxStore};
pub use sync::BackgroundSync;
pub use transport::Transport;
pub use view::{ChatView, ViewEntry};
