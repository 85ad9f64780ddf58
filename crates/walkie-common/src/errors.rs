use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Problems decoding frames that arrive over the wire.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed event: {0}")]
    Malformed(String),

    #[error("audio frame too short: {0} bytes")]
    ShortFrame(usize),

    #[error("audio frame has zero sample rate")]
    InvalidSampleRate,

    #[error("invalid audio payload: {0}")]
    InvalidAudio(String),

    #[error("invalid audio duration: {0}")]
    InvalidDuration(f64),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    Closed,

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("connection timed out after {0}s")]
    Timeout(u64),

    #[error("http error: {0}")]
    Http(String),

    #[error("send queue full")]
    QueueFull,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("storage path unavailable: {0}")]
    PathUnavailable(String),
}

/// Microphone and speaker failures. These disable voice, never chat.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("no audio device available")]
    NoDevice,

    #[error("audio stream error: {0}")]
    Stream(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WalkieError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ValidationError("server.ws_port = 0".into());
        assert_eq!(
            err.to_string(),
            "config validation error: server.ws_port = 0"
        );
    }

    #[test]
    fn protocol_error_display() {
        let err = ProtocolError::ShortFrame(3);
        assert_eq!(err.to_string(), "audio frame too short: 3 bytes");

        let err = ProtocolError::InvalidDuration(-1.0);
        assert_eq!(err.to_string(), "invalid audio duration: -1");
    }

    #[test]
    fn walkie_error_from_transport() {
        let err: WalkieError = TransportError::NotConnected.into();
        assert!(matches!(err, WalkieError::Transport(_)));
        assert_eq!(err.to_string(), "not connected");
    }

    #[test]
    fn storage_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "outbox missing");
        let err: StorageError = io_err.into();
        assert!(matches!(err, StorageError::Io(_)));
        let walkie: WalkieError = err.into();
        assert!(walkie.to_string().contains("outbox missing"));
    }

    #[test]
    fn audio_error_display() {
        let err = AudioError::PermissionDenied("insecure context".into());
        assert_eq!(
            err.to_string(),
            "microphone permission denied: insecure context"
        );
        assert_eq!(AudioError::NoDevice.to_string(), "no audio device available");
    }
}
