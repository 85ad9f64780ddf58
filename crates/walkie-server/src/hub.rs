//! Event handling for the chat hub.
//!
//! `Hub` owns the voice arbiter, the message log and the presence registry
//! and turns each inbound event into a list of deliveries. It performs no
//! I/O; the actor in [`crate::session`] routes deliveries to sockets.

use serde::Serialize;
use tracing::{debug, info, warn};
use walkie_common::protocol::truncate_chars;
use walkie_common::{
    new_id, now_timestamp, AudioFrame, BusyPayload, ChatMessage, ClientEvent, MessageBody,
    PresenceStatus, SendAudioPayload, SendMessagePayload, ServerEvent, SessionId, SpeakerPayload,
    UserStatusPayload,
};

use crate::history::MessageLog;
use crate::presence::PresenceRegistry;
use crate::voice::{StartOutcome, VoiceArbiter};

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

/// Who receives a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Others(SessionId),
    Only(SessionId),
}

impl Target {
    pub fn includes(&self, session: &SessionId) -> bool {
        match self {
            Target::All => true,
            Target::Others(excluded) => excluded != session,
            Target::Only(only) => only == session,
        }
    }
}

/// A frame queued for a session's socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(ServerEvent),
    Audio(AudioFrame),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub target: Target,
    pub frame: Outbound,
}

impl Delivery {
    fn event(target: Target, event: ServerEvent) -> Self {
        Self {
            target,
            frame: Outbound::Event(event),
        }
    }
}

/// Result of a message posted through the HTTP fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    Created(ChatMessage),
    Duplicate(ChatMessage),
}

/// Point-in-time counters for the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStatus {
    pub online_count: usize,
    pub messages: usize,
    pub speaker: Option<String>,
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub history_limit: usize,
    pub max_text_chars: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            history_limit: walkie_common::limits::HISTORY_LIMIT,
            max_text_chars: walkie_common::limits::MAX_TEXT_CHARS,
        }
    }
}

pub struct Hub {
    config: HubConfig,
    voice: VoiceArbiter,
    log: MessageLog,
    presence: PresenceRegistry,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            log: MessageLog::new(config.history_limit),
            voice: VoiceArbiter::new(),
            presence: PresenceRegistry::new(),
            config,
        }
    }

    /// Snapshot sent to a freshly connected session before anything else.
    pub fn connect(&mut self, session: &SessionId) -> ServerEvent {
        debug!(session = %session, messages = self.log.len(), "Sending history");
        ServerEvent::MessageHistory(self.log.snapshot())
    }

    pub fn handle_event(&mut self, session: &SessionId, event: ClientEvent) -> Vec<Delivery> {
        match event {
            ClientEvent::UserJoined(name) => self.join(session, name),
            ClientEvent::SendMessage(payload) => {
                let msg = self.accept_text(payload);
                self.append(msg)
            }
            ClientEvent::SendAudio(payload) => match self.accept_audio(payload) {
                Some(msg) => self.append(msg),
                None => Vec::new(),
            },
            ClientEvent::Typing(payload) => vec![Delivery::event(
                Target::Others(session.clone()),
                ServerEvent::UserTyping(payload),
            )],
            ClientEvent::StartVoiceTransmission(name) => self.start_voice(session, name),
            ClientEvent::StopVoiceTransmission => self.stop_voice(session),
        }
    }

    /// Relay a frame from the holder to everyone else; drop anything else.
    pub fn handle_audio(&mut self, session: &SessionId, frame: AudioFrame) -> Vec<Delivery> {
        if !self.voice.may_relay(session) {
            debug!(session = %session, "Dropping audio from non-holder");
            return Vec::new();
        }
        vec![Delivery {
            target: Target::Others(session.clone()),
            frame: Outbound::Audio(frame),
        }]
    }

    /// Release the channel if held, then drop the session from presence.
    pub fn disconnect(&mut self, session: &SessionId) -> Vec<Delivery> {
        let mut out = Vec::new();

        if let Some(grant) = self.voice.release_disconnected(session) {
            info!(user = %grant.name, "Speaker disconnected mid-transmission");
            out.push(Delivery::event(
                Target::All,
                ServerEvent::VoiceTransmissionEnded(SpeakerPayload {
                    username: grant.name,
                }),
            ));
        }

        if let Some(name) = self.presence.leave(session) {
            info!(user = %name, session = %session, "User left");
            out.push(Delivery::event(
                Target::Others(session.clone()),
                ServerEvent::UserStatus(UserStatusPayload {
                    user: name,
                    status: PresenceStatus::Offline,
                    online_count: self.presence.count(),
                }),
            ));
            out.extend(self.roster_deliveries());
        }

        out
    }

    /// Append a message that arrived over HTTP.
    pub fn post_message(&mut self, payload: SendMessagePayload) -> (PostOutcome, Vec<Delivery>) {
        let msg = self.accept_text(payload);
        if let Some(existing) = self.log.get(&msg.id) {
            return (PostOutcome::Duplicate(existing.clone()), Vec::new());
        }
        let deliveries = self.append(msg.clone());
        (PostOutcome::Created(msg), deliveries)
    }

    pub fn status(&self) -> HubStatus {
        HubStatus {
            online_count: self.presence.count(),
            messages: self.log.len(),
            speaker: self.voice.holder().map(|g| g.name.clone()),
        }
    }

    // -- handlers -----------------------------------------------------------

    fn join(&mut self, session: &SessionId, name: String) -> Vec<Delivery> {
        self.presence.join(session, &name);
        info!(user = %name, session = %session, "User joined");

        let mut out = vec![Delivery::event(
            Target::Others(session.clone()),
            ServerEvent::UserStatus(UserStatusPayload {
                user: name,
                status: PresenceStatus::Online,
                online_count: self.presence.count(),
            }),
        )];
        out.extend(self.roster_deliveries());
        out
    }

    fn append(&mut self, msg: ChatMessage) -> Vec<Delivery> {
        let id = msg.id.clone();
        if !self.log.append(msg.clone()) {
            debug!(id = %id, "Duplicate message ignored");
            return Vec::new();
        }
        debug!(id = %id, user = %msg.user, audio = msg.is_audio(), "Message appended");
        vec![Delivery::event(Target::All, ServerEvent::ReceiveMessage(msg))]
    }

    fn start_voice(&mut self, session: &SessionId, name: String) -> Vec<Delivery> {
        match self.voice.request_start(session, &name) {
            StartOutcome::Granted(grant) => {
                info!(user = %grant.name, "Voice transmission started");
                vec![Delivery::event(
                    Target::All,
                    ServerEvent::VoiceTransmissionStarted(SpeakerPayload {
                        username: grant.name,
                    }),
                )]
            }
            StartOutcome::Busy { current_speaker } => {
                debug!(requester = %name, speaker = %current_speaker, "Voice channel busy");
                vec![Delivery::event(
                    Target::Only(session.clone()),
                    ServerEvent::VoiceChannelBusy(BusyPayload { current_speaker }),
                )]
            }
        }
    }

    fn stop_voice(&mut self, session: &SessionId) -> Vec<Delivery> {
        match self.voice.request_stop(session) {
            Some(grant) => {
                info!(user = %grant.name, "Voice transmission ended");
                vec![Delivery::event(
                    Target::All,
                    ServerEvent::VoiceTransmissionEnded(SpeakerPayload {
                        username: grant.name,
                    }),
                )]
            }
            None => Vec::new(),
        }
    }

    fn roster_deliveries(&self) -> Vec<Delivery> {
        vec![
            Delivery::event(Target::All, ServerEvent::OnlineCount(self.presence.count())),
            Delivery::event(Target::All, ServerEvent::UpdateUsers(self.presence.roster())),
        ]
    }

    // -- message construction -----------------------------------------------

    fn accept_text(&self, payload: SendMessagePayload) -> ChatMessage {
        ChatMessage {
            id: resolve_id(payload.id),
            user: payload.user,
            body: MessageBody::Text {
                text: truncate_chars(&payload.text, self.config.max_text_chars),
            },
            timestamp: now_timestamp(),
        }
    }

    fn accept_audio(&self, payload: SendAudioPayload) -> Option<ChatMessage> {
        if let Err(e) = payload.validate() {
            warn!(user = %payload.user, error = %e, "Rejecting audio message");
            return None;
        }
        Some(ChatMessage {
            id: resolve_id(payload.id),
            user: payload.user,
            body: MessageBody::Audio {
                audio: payload.audio,
                duration: payload.duration,
            },
            timestamp: now_timestamp(),
        })
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

fn resolve_id(id: Option<String>) -> String {
    match id {
        Some(id) if !id.trim().is_empty() => id,
        _ => new_id(),
    }
}
