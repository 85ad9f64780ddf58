//! Optional features the host can or cannot provide.
//!
//! Decided once at startup. A missing capability turns off only its own
//! feature; chat keeps working without any of them.

use std::io::IsTerminal;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub audio_capture: bool,
    pub audio_playback: bool,
    pub notifications: bool,
    pub background_sync: bool,
}

/// What the host reported when probed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Probe {
    pub has_capture_device: bool,
    pub has_playback_device: bool,
    pub interactive_terminal: bool,
    pub sync_enabled: bool,
    pub http_endpoint: bool,
}

impl Probe {
    /// Probe the current process. Audio devices are supplied by the caller.
    pub fn detect(
        has_capture_device: bool,
        has_playback_device: bool,
        sync_enabled: bool,
        http_url: &str,
    ) -> Self {
        Self {
            has_capture_device,
            has_playback_device,
            interactive_terminal: std::io::stdout().is_terminal(),
            sync_enabled,
            http_endpoint: http_url.starts_with("http://") || http_url.starts_with("https://"),
        }
    }
}

impl Capabilities {
    pub fn negotiate(probe: &Probe) -> Self {
        let caps = Self {
            audio_capture: probe.has_capture_device,
            audio_playback: probe.has_playback_device,
            notifications: probe.interactive_terminal,
            background_sync: probe.sync_enabled && probe.http_endpoint,
        };
        tracing::info!(
            capture = caps.audio_capture,
            playback = caps.audio_playback,
            notifications = caps.notifications,
            background_sync = caps.background_sync,
            "Capabilities negotiated"
        );
        caps
    }

    /// Nothing optional: plain text chat.
    pub fn none() -> Self {
        Self::default()
    }
}
