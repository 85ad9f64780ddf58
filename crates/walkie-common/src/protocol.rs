//! Wire protocol for the chat socket.
//!
//! Every JSON text frame is an event envelope `{"event": <name>, "data": <payload>}`
//! with kebab-case event names. Audio for the voice channel never rides in
//! these envelopes; it travels as binary frames (see [`crate::audio`]).

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

// ---------------------------------------------------------------------------
// Chat messages
// ---------------------------------------------------------------------------

/// A message as stored in the server log and broadcast to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub user: String,
    #[serde(flatten)]
    pub body: MessageBody,
    pub timestamp: String,
}

/// Either a text body or a recorded audio clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Text { text: String },
    Audio { audio: String, duration: f64 },
}

impl ChatMessage {
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text { text } => Some(text),
            MessageBody::Audio { .. } => None,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.body, MessageBody::Audio { .. })
    }
}

// ---------------------------------------------------------------------------
// Client payloads
// ---------------------------------------------------------------------------

/// Payload of `send-message`. The id is optional so older clients and the
/// HTTP fallback can omit it; the server then assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user: String,
    pub text: String,
}

/// Payload of `send-audio`: base64 clip plus its length in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendAudioPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user: String,
    pub audio: String,
    pub duration: f64,
}

impl SendAudioPayload {
    /// Reject clips whose payload is not standard base64 or whose duration
    /// is not a finite, non-negative number.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(ProtocolError::InvalidDuration(self.duration));
        }
        base64::engine::general_purpose::STANDARD
            .decode(self.audio.as_bytes())
            .map_err(|e| ProtocolError::InvalidAudio(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub user: String,
    pub is_typing: bool,
}

// ---------------------------------------------------------------------------
// Server payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusPayload {
    pub user: String,
    pub status: PresenceStatus,
    pub online_count: usize,
}

/// Names the session that took or released the voice channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerPayload {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyPayload {
    pub current_speaker: String,
}

// ---------------------------------------------------------------------------
// Event envelopes
// ---------------------------------------------------------------------------

/// Events a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    UserJoined(String),
    SendMessage(SendMessagePayload),
    SendAudio(SendAudioPayload),
    Typing(TypingPayload),
    StartVoiceTransmission(String),
    StopVoiceTransmission,
}

/// Events the server sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    MessageHistory(Vec<ChatMessage>),
    ReceiveMessage(ChatMessage),
    UserTyping(TypingPayload),
    UserStatus(UserStatusPayload),
    OnlineCount(usize),
    UpdateUsers(Vec<String>),
    VoiceTransmissionStarted(SpeakerPayload),
    VoiceChannelBusy(BusyPayload),
    VoiceTransmissionEnded(SpeakerPayload),
}

impl ClientEvent {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

impl ServerEvent {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// Truncate to at most `max` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(id: &str) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            user: "bob".into(),
            body: MessageBody::Text { text: "hi".into() },
            timestamp: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn client_event_wire_names() {
        let json = ClientEvent::UserJoined("alice".into()).encode().unwrap();
        assert_eq!(json, r#"{"event":"user-joined","data":"alice"}"#);

        let json = ClientEvent::StopVoiceTransmission.encode().unwrap();
        assert_eq!(json, r#"{"event":"stop-voice-transmission"}"#);
    }

    #[test]
    fn decode_send_message_without_id() {
        let ev = ClientEvent::decode(
            r#"{"event":"send-message","data":{"user":"bob","text":"hi"}}"#,
        )
        .unwrap();
        match ev {
            ClientEvent::SendMessage(p) => {
                assert_eq!(p.id, None);
                assert_eq!(p.user, "bob");
                assert_eq!(p.text, "hi");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decode_stop_without_data() {
        let ev = ClientEvent::decode(r#"{"event":"stop-voice-transmission"}"#).unwrap();
        assert_eq!(ev, ClientEvent::StopVoiceTransmission);
    }

    #[test]
    fn decode_typing_uses_camel_case() {
        let ev = ClientEvent::decode(
            r#"{"event":"typing","data":{"user":"bob","isTyping":true}}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            ClientEvent::Typing(TypingPayload {
                user: "bob".into(),
                is_typing: true
            })
        );
    }

    #[test]
    fn unknown_event_is_malformed() {
        let err = ClientEvent::decode(r#"{"event":"launch-rockets","data":1}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn chat_message_text_is_flat_on_the_wire() {
        let value = serde_json::to_value(text_message("m1")).unwrap();
        assert_eq!(value["id"], "m1");
        assert_eq!(value["text"], "hi");
        assert!(value.get("body").is_none());
    }

    #[test]
    fn chat_message_audio_parses() {
        let msg: ChatMessage = serde_json::from_str(
            r#"{"id":"a1","user":"bob","audio":"AAAA","duration":1.5,"timestamp":"t"}"#,
        )
        .unwrap();
        assert!(msg.is_audio());
        assert_eq!(msg.text(), None);
        assert_eq!(
            msg.body,
            MessageBody::Audio {
                audio: "AAAA".into(),
                duration: 1.5
            }
        );
    }

    #[test]
    fn server_event_counts_and_speakers() {
        let json = ServerEvent::OnlineCount(3).encode().unwrap();
        assert_eq!(json, r#"{"event":"online-count","data":3}"#);

        let json = ServerEvent::VoiceChannelBusy(BusyPayload {
            current_speaker: "A".into(),
        })
        .encode()
        .unwrap();
        assert_eq!(
            json,
            r#"{"event":"voice-channel-busy","data":{"currentSpeaker":"A"}}"#
        );
    }

    #[test]
    fn user_status_payload_shape() {
        let json = ServerEvent::UserStatus(UserStatusPayload {
            user: "bob".into(),
            status: PresenceStatus::Offline,
            online_count: 0,
        })
        .encode()
        .unwrap();
        assert!(json.contains(r#""status":"offline""#));
        assert!(json.contains(r#""onlineCount":0"#));
    }

    #[test]
    fn history_decodes_back() {
        let ev = ServerEvent::MessageHistory(vec![text_message("m1"), text_message("m2")]);
        let decoded = ServerEvent::decode(&ev.encode().unwrap()).unwrap();
        assert_eq!(decoded, ev);
    }

    #[test]
    fn audio_payload_validation() {
        let mut payload = SendAudioPayload {
            id: None,
            user: "bob".into(),
            audio: "AAECAw==".into(),
            duration: 0.5,
        };
        assert!(payload.validate().is_ok());

        payload.duration = f64::NAN;
        assert!(matches!(
            payload.validate(),
            Err(ProtocolError::InvalidDuration(_))
        ));

        payload.duration = 1.0;
        payload.audio = "not base64!".into();
        assert!(matches!(
            payload.validate(),
            Err(ProtocolError::InvalidAudio(_))
        ));
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hi", 500), "hi");
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("", 0), "");
    }
}
