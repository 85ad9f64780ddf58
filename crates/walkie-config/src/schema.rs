//! Configuration schema types for walkie.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the defaults below.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use walkie_common::limits;

// =============================================================================
// Server Config
// =============================================================================

/// Listener addresses and chat log limits for `walkie-server`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind both listeners on.
    pub bind: String,
    /// WebSocket port for the chat and voice socket.
    pub ws_port: u16,
    /// HTTP port for the message fallback endpoint.
    pub http_port: u16,
    /// Messages kept in the log and replayed on connect.
    pub history_limit: u32,
    /// Text messages are cut to this many characters.
    pub max_text_chars: u32,
    /// Outbound frames buffered per session before frames are dropped.
    pub session_queue: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            ws_port: 3000,
            http_port: 3001,
            history_limit: limits::HISTORY_LIMIT as u32,
            max_text_chars: limits::MAX_TEXT_CHARS as u32,
            session_queue: limits::SESSION_QUEUE as u32,
        }
    }
}

impl ServerConfig {
    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.bind, self.ws_port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.bind, self.http_port)
    }
}

// =============================================================================
// Client Config
// =============================================================================

/// Connection, reconnect and outbox settings for the `walkie` client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the server.
    pub server_url: String,
    /// Base URL of the HTTP fallback.
    pub http_url: String,
    /// Name announced on join. Prompted for when absent.
    pub display_name: Option<String>,
    /// First reconnect delay; doubles on each failure.
    pub reconnect_delay_secs: u64,
    /// Upper bound for the reconnect delay.
    pub max_reconnect_delay_secs: u64,
    pub connect_timeout_secs: u64,
    /// Where queued messages are kept while offline.
    pub outbox_path: Option<PathBuf>,
    /// Deliver queued text through the HTTP fallback while the socket is down.
    pub background_sync: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:3000".into(),
            http_url: "http://127.0.0.1:3001".into(),
            display_name: None,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            connect_timeout_secs: 15,
            outbox_path: None,
            background_sync: true,
        }
    }
}

// =============================================================================
// Voice Config
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub sample_rate: u32,
    /// Samples per captured block.
    pub frame_samples: u32,
    /// How long the "channel busy" indicator stays up.
    pub busy_indicator_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            sample_rate: limits::DEFAULT_SAMPLE_RATE,
            frame_samples: limits::DEFAULT_FRAME_SAMPLES as u32,
            busy_indicator_ms: 2000,
        }
    }
}

// =============================================================================
// Logging Config
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

// =============================================================================
// Root
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkieConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub voice: VoiceConfig,
    pub logging: LoggingConfig,
}
