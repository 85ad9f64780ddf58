//! The chat client: routes connection events to the view, the outbox
//! coordinator and the push-to-talk controller.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};
use walkie_common::{ChatMessage, ClientEvent, ServerEvent, TypingPayload, WalkieError};

use crate::capabilities::Capabilities;
use crate::connection::ConnectionEvent;
use crate::coordinator::{Coordinator, SendOutcome};
use crate::outbox::{Compose, Outbox};
use crate::ptt::{AudioCapture, AudioPlayback, PttController, PttStart};
use crate::transport::Transport;
use crate::view::ChatView;

/// Something the front end should show.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Connected { replayed: usize },
    Disconnected,
    Message { message: ChatMessage, own: bool },
    Pending(ChatMessage),
    Presence { online: usize, roster: Vec<String> },
    Typing(Vec<String>),
    Speaker(Option<String>),
    ChannelBusy(String),
    Error(String),
}

pub struct ChatClient {
    transport: Arc<dyn Transport>,
    coordinator: Coordinator,
    view: ChatView,
    ptt: PttController,
    playback: Option<Box<dyn AudioPlayback>>,
    capabilities: Capabilities,
}

impl ChatClient {
    pub fn new(
        user: &str,
        transport: Arc<dyn Transport>,
        outbox: Outbox,
        capabilities: Capabilities,
        capture: Option<Box<dyn AudioCapture>>,
        playback: Option<Box<dyn AudioPlayback>>,
        busy_indicator: std::time::Duration,
    ) -> Self {
        let capture = capture.filter(|_| capabilities.audio_capture);
        let playback = playback.filter(|_| capabilities.audio_playback);
        Self {
            coordinator: Coordinator::new(user, Arc::clone(&transport), outbox),
            ptt: PttController::new(user, Arc::clone(&transport), capture, busy_indicator),
            transport,
            view: ChatView::new(),
            playback,
            capabilities,
        }
    }

    /// Wake `trigger` whenever a message is queued offline.
    pub fn with_sync_trigger(mut self, trigger: tokio::sync::mpsc::Sender<()>) -> Self {
        if self.capabilities.background_sync {
            self.coordinator = self.coordinator.with_sync_trigger(trigger);
        }
        self
    }

    pub fn user(&self) -> &str {
        self.coordinator.user()
    }

    pub fn view(&self) -> &ChatView {
        &self.view
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn is_busy(&self) -> bool {
        self.ptt.is_busy(Instant::now())
    }

    pub fn is_transmitting(&self) -> bool {
        self.ptt.is_transmitting()
    }

    pub async fn rename(&mut self, user: &str) -> Result<(), WalkieError> {
        self.ptt.set_name(user);
        self.coordinator.rename(user).await
    }

    pub async fn send_text(&mut self, text: &str) -> Result<Option<Update>, WalkieError> {
        let compose = Compose::text(self.user(), text);
        self.send(compose).await
    }

    pub async fn send_audio(
        &mut self,
        pcm: &[u8],
        duration: f64,
    ) -> Result<Option<Update>, WalkieError> {
        let compose = Compose::audio(self.user(), pcm, duration);
        self.send(compose).await
    }

    async fn send(&mut self, compose: Compose) -> Result<Option<Update>, WalkieError> {
        let local = compose.to_local_message();
        match self.coordinator.send(compose).await? {
            SendOutcome::Sent => Ok(None),
            SendOutcome::Queued => {
                self.view.add_pending(local.clone());
                Ok(Some(Update::Pending(local)))
            }
        }
    }

    /// Typing hints are best effort and never queued.
    pub async fn set_typing(&self, is_typing: bool) {
        let event = ClientEvent::Typing(TypingPayload {
            user: self.user().to_string(),
            is_typing,
        });
        if let Err(e) = self.transport.emit(event).await {
            debug!(error = %e, "Typing hint not sent");
        }
    }

    pub async fn press_to_talk(&mut self) -> Result<PttStart, WalkieError> {
        self.ptt.start().await
    }

    pub async fn release_to_talk(&mut self) -> Result<bool, WalkieError> {
        self.ptt.stop().await
    }

    pub async fn handle(&mut self, event: ConnectionEvent) -> Vec<Update> {
        match event {
            ConnectionEvent::Connected => match self.coordinator.on_connected().await {
                Ok(replayed) => vec![Update::Connected { replayed }],
                Err(e) => {
                    warn!(error = %e, "Reconnect handling interrupted");
                    vec![Update::Error(e.to_string())]
                }
            },
            ConnectionEvent::Disconnected => {
                self.coordinator.on_disconnected();
                self.ptt.on_disconnected();
                vec![Update::Disconnected, Update::Speaker(None)]
            }
            ConnectionEvent::Server(event) => self.on_server_event(event),
            ConnectionEvent::Audio(frame) => {
                let block = self.ptt.on_audio(&frame, Instant::now());
                if let Some(playback) = self.playback.as_mut() {
                    playback.play(block);
                }
                Vec::new()
            }
            ConnectionEvent::Error(msg) => vec![Update::Error(msg)],
        }
    }

    fn on_server_event(&mut self, event: ServerEvent) -> Vec<Update> {
        self.ptt.on_server_event(&event, Instant::now());
        let user = self.user().to_string();
        let added = self.view.apply(&event).cloned();

        match event {
            ServerEvent::ReceiveMessage(_) => added
                .map(|message| {
                    let own = message.user == user;
                    vec![Update::Message { message, own }]
                })
                .unwrap_or_default(),
            ServerEvent::MessageHistory(history) => history
                .into_iter()
                .map(|message| {
                    let own = message.user == user;
                    Update::Message { message, own }
                })
                .collect(),
            ServerEvent::OnlineCount(_)
            | ServerEvent::UpdateUsers(_)
            | ServerEvent::UserStatus(_) => vec![Update::Presence {
                online: self.view.online_count(),
                roster: self.view.roster().to_vec(),
            }],
            ServerEvent::UserTyping(_) => vec![Update::Typing(
                self.view.typing().map(String::from).collect(),
            )],
            ServerEvent::VoiceTransmissionStarted(s) => vec![Update::Speaker(Some(s.username))],
            ServerEvent::VoiceTransmissionEnded(_) => vec![Update::Speaker(None)],
            ServerEvent::VoiceChannelBusy(b) => vec![Update::ChannelBusy(b.current_speaker)],
        }
    }
}
