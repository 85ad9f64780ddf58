//! Hub actor: the one task that owns all chat state.
//!
//! Connection tasks and the HTTP handler talk to it through a cloneable
//! [`HubHandle`]. Commands are applied one at a time, so the arrival order
//! of commands is the order in which contended requests are decided.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use walkie_common::{AudioFrame, ClientEvent, SendMessagePayload, SessionId, TransportError};

use crate::hub::{Delivery, Hub, HubStatus, Outbound, PostOutcome};

/// Commands accepted by the hub actor.
enum HubCommand {
    Connect {
        session: SessionId,
        tx: mpsc::Sender<Outbound>,
    },
    Event {
        session: SessionId,
        event: ClientEvent,
    },
    Audio {
        session: SessionId,
        frame: AudioFrame,
    },
    Disconnect {
        session: SessionId,
    },
    PostMessage {
        payload: SendMessagePayload,
        reply: oneshot::Sender<PostOutcome>,
    },
    Status {
        reply: oneshot::Sender<HubStatus>,
    },
}

/// Cheap, cloneable handle to the hub actor.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Start the actor. The task ends once every handle is dropped.
    pub fn spawn(hub: Hub) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1024);
        let task = tokio::spawn(run(hub, rx));
        (Self { tx }, task)
    }

    /// Register a session's outbound queue. The history snapshot is queued
    /// before this returns.
    pub async fn connect(
        &self,
        session: SessionId,
        tx: mpsc::Sender<Outbound>,
    ) -> Result<(), TransportError> {
        self.send(HubCommand::Connect { session, tx }).await
    }

    pub async fn event(&self, session: SessionId, event: ClientEvent) -> Result<(), TransportError> {
        self.send(HubCommand::Event { session, event }).await
    }

    pub async fn audio(&self, session: SessionId, frame: AudioFrame) -> Result<(), TransportError> {
        self.send(HubCommand::Audio { session, frame }).await
    }

    pub async fn disconnect(&self, session: SessionId) -> Result<(), TransportError> {
        self.send(HubCommand::Disconnect { session }).await
    }

    pub async fn post_message(
        &self,
        payload: SendMessagePayload,
    ) -> Result<PostOutcome, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::PostMessage { payload, reply }).await?;
        rx.await.map_err(|_| TransportError::Closed)
    }

    pub async fn status(&self) -> Result<HubStatus, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Status { reply }).await?;
        rx.await.map_err(|_| TransportError::Closed)
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), TransportError> {
        self.tx.send(cmd).await.map_err(|_| TransportError::Closed)
    }
}

async fn run(mut hub: Hub, mut rx: mpsc::Receiver<HubCommand>) {
    let mut sessions: HashMap<SessionId, mpsc::Sender<Outbound>> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            HubCommand::Connect { session, tx } => {
                let history = hub.connect(&session);
                if tx.try_send(Outbound::Event(history)).is_err() {
                    warn!(session = %session, "Could not queue history");
                }
                sessions.insert(session, tx);
                debug!(sessions = sessions.len(), "Session connected");
            }
            HubCommand::Event { session, event } => {
                let deliveries = hub.handle_event(&session, event);
                dispatch(&mut hub, &mut sessions, deliveries);
            }
            HubCommand::Audio { session, frame } => {
                let deliveries = hub.handle_audio(&session, frame);
                dispatch(&mut hub, &mut sessions, deliveries);
            }
            HubCommand::Disconnect { session } => {
                sessions.remove(&session);
                let deliveries = hub.disconnect(&session);
                dispatch(&mut hub, &mut sessions, deliveries);
                debug!(sessions = sessions.len(), "Session disconnected");
            }
            HubCommand::PostMessage { payload, reply } => {
                let (outcome, deliveries) = hub.post_message(payload);
                dispatch(&mut hub, &mut sessions, deliveries);
                let _ = reply.send(outcome);
            }
            HubCommand::Status { reply } => {
                let _ = reply.send(hub.status());
            }
        }
    }

    debug!("Hub actor stopped");
}

/// Queue each delivery on every targeted session without waiting.
///
/// A full queue drops audio for that session only. A session that cannot
/// take an event is cut off instead, so it never sees a gap: its sender is
/// dropped and it leaves like any other disconnect, which may in turn
/// produce more deliveries.
fn dispatch(
    hub: &mut Hub,
    sessions: &mut HashMap<SessionId, mpsc::Sender<Outbound>>,
    deliveries: Vec<Delivery>,
) {
    let mut batch = deliveries;
    while !batch.is_empty() {
        let mut lagging: Vec<SessionId> = Vec::new();
        for delivery in batch {
            for (session, tx) in sessions.iter() {
                if !delivery.target.includes(session) || lagging.contains(session) {
                    continue;
                }
                match tx.try_send(delivery.frame.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(Outbound::Audio(_))) => {
                        debug!(session = %session, "Outbound queue full, dropping audio");
                    }
                    Err(mpsc::error::TrySendError::Full(Outbound::Event(_))) => {
                        warn!(session = %session, "Outbound queue full, cutting session off");
                        lagging.push(session.clone());
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(session = %session, "Outbound queue closed");
                    }
                }
            }
        }

        batch = Vec::new();
        for session in lagging {
            sessions.remove(&session);
            batch.extend(hub.disconnect(&session));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walkie_common::{PresenceStatus, ServerEvent};

    async fn connect(hub: &HubHandle, name: &str) -> (SessionId, mpsc::Receiver<Outbound>) {
        connect_with_queue(hub, name, 64).await
    }

    async fn connect_with_queue(
        hub: &HubHandle,
        name: &str,
        queue: usize,
    ) -> (SessionId, mpsc::Receiver<Outbound>) {
        let session = SessionId::from(name);
        let (tx, rx) = mpsc::channel(queue);
        hub.connect(session.clone(), tx).await.unwrap();
        (session, rx)
    }

    async fn next_event(rx: &mut mpsc::Receiver<Outbound>) -> ServerEvent {
        loop {
            match rx.recv().await.expect("queue closed") {
                Outbound::Event(e) => return e,
                Outbound::Audio(_) => continue,
            }
        }
    }

    fn send_message(id: &str) -> ClientEvent {
        ClientEvent::SendMessage(SendMessagePayload {
            id: Some(id.into()),
            user: "bob".into(),
            text: "hi".into(),
        })
    }

    #[tokio::test]
    async fn history_arrives_first() {
        let (hub, _task) = HubHandle::spawn(Hub::default());
        let (a, _rx_a) = connect(&hub, "a").await;
        hub.event(a, send_message("m1")).await.unwrap();

        let (_b, mut rx_b) = connect(&hub, "b").await;
        match next_event(&mut rx_b).await {
            ServerEvent::MessageHistory(msgs) => {
                assert_eq!(msgs.len(), 1);
                assert_eq!(msgs[0].id, "m1");
            }
            other => panic!("expected history, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn snapshot_and_broadcast_do_not_overlap() {
        let (hub, _task) = HubHandle::spawn(Hub::default());
        let (a, _rx_a) = connect(&hub, "a").await;
        let (_b, mut rx_b) = connect(&hub, "b").await;
        hub.event(a, send_message("m1")).await.unwrap();

        assert_eq!(
            next_event(&mut rx_b).await,
            ServerEvent::MessageHistory(Vec::new())
        );
        match next_event(&mut rx_b).await {
            ServerEvent::ReceiveMessage(m) => assert_eq!(m.id, "m1"),
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn busy_reply_is_unicast() {
        let (hub, _task) = HubHandle::spawn(Hub::default());
        let (a, mut rx_a) = connect(&hub, "a").await;
        let (b, mut rx_b) = connect(&hub, "b").await;
        next_event(&mut rx_a).await;
        next_event(&mut rx_b).await;

        hub.event(a, ClientEvent::StartVoiceTransmission("A".into()))
            .await
            .unwrap();
        hub.event(b, ClientEvent::StartVoiceTransmission("B".into()))
            .await
            .unwrap();
        let status = hub.status().await.unwrap();
        assert_eq!(status.speaker.as_deref(), Some("A"));

        assert!(matches!(
            next_event(&mut rx_a).await,
            ServerEvent::VoiceTransmissionStarted(_)
        ));
        assert!(matches!(
            next_event(&mut rx_b).await,
            ServerEvent::VoiceTransmissionStarted(_)
        ));
        assert!(matches!(
            next_event(&mut rx_b).await,
            ServerEvent::VoiceChannelBusy(_)
        ));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn holder_audio_skips_sender() {
        let (hub, _task) = HubHandle::spawn(Hub::default());
        let (a, mut rx_a) = connect(&hub, "a").await;
        let (_b, mut rx_b) = connect(&hub, "b").await;
        next_event(&mut rx_a).await;
        next_event(&mut rx_b).await;

        hub.event(a.clone(), ClientEvent::StartVoiceTransmission("A".into()))
            .await
            .unwrap();
        hub.audio(a, AudioFrame::new(24_000, vec![1, 2])).await.unwrap();
        hub.status().await.unwrap();

        assert!(matches!(
            rx_b.recv().await,
            Some(Outbound::Event(ServerEvent::VoiceTransmissionStarted(_)))
        ));
        assert_eq!(
            rx_b.recv().await,
            Some(Outbound::Audio(AudioFrame::new(24_000, vec![1, 2])))
        );

        assert!(matches!(
            rx_a.recv().await,
            Some(Outbound::Event(ServerEvent::VoiceTransmissionStarted(_)))
        ));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_broadcasts_to_remaining() {
        let (hub, _task) = HubHandle::spawn(Hub::default());
        let (a, mut rx_a) = connect(&hub, "a").await;
        let (b, mut rx_b) = connect(&hub, "b").await;
        next_event(&mut rx_a).await;
        next_event(&mut rx_b).await;

        hub.event(b.clone(), ClientEvent::UserJoined("bob".into()))
            .await
            .unwrap();
        hub.disconnect(b).await.unwrap();
        hub.status().await.unwrap();

        // join: status, count, roster; leave: status, count, roster
        let mut seen = Vec::new();
        while let Ok(Outbound::Event(e)) = rx_a.try_recv() {
            seen.push(e);
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[4], ServerEvent::OnlineCount(0));
        assert_eq!(seen[5], ServerEvent::UpdateUsers(Vec::new()));
        let _ = a;
    }

    #[tokio::test]
    async fn http_post_reaches_sockets() {
        let (hub, _task) = HubHandle::spawn(Hub::default());
        let (_a, mut rx_a) = connect(&hub, "a").await;
        next_event(&mut rx_a).await;

        let outcome = hub
            .post_message(SendMessagePayload {
                id: None,
                user: "bg".into(),
                text: "queued".into(),
            })
            .await
            .unwrap();
        let PostOutcome::Created(msg) = outcome else {
            panic!("expected created");
        };
        assert_eq!(
            next_event(&mut rx_a).await,
            ServerEvent::ReceiveMessage(msg)
        );
    }

    #[tokio::test]
    async fn lagging_session_is_cut_off_not_left_with_gaps() {
        let (hub, _task) = HubHandle::spawn(Hub::default());
        let (a, mut rx_a) = connect(&hub, "a").await;
        // Room for history, count, roster and one message.
        let (slow, mut rx_slow) = connect_with_queue(&hub, "slow", 4).await;
        next_event(&mut rx_a).await;
        hub.event(slow, ClientEvent::UserJoined("sam".into()))
            .await
            .unwrap();

        for i in 0..5 {
            hub.event(a.clone(), send_message(&format!("m{i}")))
                .await
                .unwrap();
        }
        let status = hub.status().await.unwrap();
        assert_eq!(status.online_count, 0);
        assert_eq!(status.messages, 5);

        // What the slow session got is a gapless prefix, then the close.
        assert_eq!(
            next_event(&mut rx_slow).await,
            ServerEvent::MessageHistory(Vec::new())
        );
        assert_eq!(next_event(&mut rx_slow).await, ServerEvent::OnlineCount(1));
        assert_eq!(
            next_event(&mut rx_slow).await,
            ServerEvent::UpdateUsers(vec!["sam".to_string()])
        );
        match next_event(&mut rx_slow).await {
            ServerEvent::ReceiveMessage(m) => assert_eq!(m.id, "m0"),
            other => panic!("expected m0, got {other:?}"),
        }
        assert!(rx_slow.recv().await.is_none());

        // Everyone else still sees every message, then the slow user leave.
        let mut ids = Vec::new();
        let mut left = false;
        while let Ok(Outbound::Event(e)) = rx_a.try_recv() {
            match e {
                ServerEvent::ReceiveMessage(m) => ids.push(m.id),
                ServerEvent::UserStatus(s) if s.status == PresenceStatus::Offline => left = true,
                _ => {}
            }
        }
        assert_eq!(ids, vec!["m0", "m1", "m2", "m3", "m4"]);
        assert!(left);
    }

    #[tokio::test]
    async fn full_queue_only_drops_audio() {
        let (hub, _task) = HubHandle::spawn(Hub::default());
        let (a, mut rx_a) = connect(&hub, "a").await;
        let (_b, mut rx_b) = connect_with_queue(&hub, "b", 3).await;
        next_event(&mut rx_a).await;

        hub.event(a.clone(), ClientEvent::StartVoiceTransmission("A".into()))
            .await
            .unwrap();
        // b holds history + started; one more slot for audio.
        for _ in 0..4 {
            hub.audio(a.clone(), AudioFrame::new(24_000, vec![0, 0]))
                .await
                .unwrap();
        }
        assert_eq!(hub.status().await.unwrap().speaker.as_deref(), Some("A"));

        assert!(matches!(rx_b.recv().await, Some(Outbound::Event(_))));
        assert!(matches!(rx_b.recv().await, Some(Outbound::Event(_))));
        assert!(matches!(rx_b.recv().await, Some(Outbound::Audio(_))));
        assert!(rx_b.try_recv().is_err());

        // b is still connected and receives later events.
        hub.event(a, send_message("after")).await.unwrap();
        hub.status().await.unwrap();
        match next_event(&mut rx_b).await {
            ServerEvent::ReceiveMessage(m) => assert_eq!(m.id, "after"),
            other => panic!("expected message, got {other:?}"),
        }
    }
}
