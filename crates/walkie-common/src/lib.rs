pub mod audio;
pub mod errors;
pub mod id;
pub mod protocol;

pub use audio::{pcm_from_f32, pcm_to_f32, AudioFrame};
pub use errors::{
    AudioError, ConfigError, ProtocolError, StorageError, TransportError, WalkieError,
};
pub use id::{new_id, now_timestamp, SessionId};
pub use protocol::{
    BusyPayload, ChatMessage, ClientEvent, MessageBody, PresenceStatus, SendAudioPayload, SendMessagePayload,
    ServerEvent, SpeakerPayload, TypingPayload, UserStatusPayload,
};

pub type Result<T> = std::result::Result<T, WalkieError>;

/// Limits shared by the server and the client.
pub mod limits {
    /// Number of messages the server keeps and replays on connect.
    pub const HISTORY_LIMIT: usize = 50;

    /// Text messages are truncated to this many characters.
    pub const MAX_TEXT_CHARS: usize = 500;

    /// Capture and playback rate used by the voice channel.
    pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

    /// Samples per captured block (about 170 ms at 24 kHz).
    pub const DEFAULT_FRAME_SAMPLES: usize = 4096;

    /// Depth of each per-session outbound queue on the server.
    pub const SESSION_QUEUE: usize = 256;
}
