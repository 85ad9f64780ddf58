//! Locating, reading and first-run creation of `config.toml`.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkie_common::ConfigError;

use crate::schema::WalkieConfig;

/// Read `path`, or the platform default when `None`.
///
/// An explicit path must exist. The default file is created from a
/// commented template on first run. Missing fields take serde defaults;
/// validation is left to the caller, after any CLI overrides.
pub fn load(path: Option<&Path>) -> Result<WalkieConfig, ConfigError> {
    let path = match path {
        Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path.into())),
        Some(path) => path.to_path_buf(),
        None => {
            let path = default_config_path()?;
            if !path.exists() {
                write_template(&path)?;
                return Ok(WalkieConfig::default());
            }
            path
        }
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;
    let config = toml::from_str(&content).map_err(|e| {
        ConfigError::ParseError(format!("{}: {e}", path.display()))
    })?;
    debug!(path = %path.display(), "Config loaded");
    Ok(config)
}

/// `<config_dir>/walkie/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    walkie_dir(dirs::config_dir(), "config").map(|dir| dir.join("config.toml"))
}

/// `<data_dir>/walkie/outbox.json`, where the client keeps unsent messages.
pub fn default_outbox_path() -> Result<PathBuf, ConfigError> {
    walkie_dir(dirs::data_dir(), "data").map(|dir| dir.join("outbox.json"))
}

fn walkie_dir(base: Option<PathBuf>, kind: &str) -> Result<PathBuf, ConfigError> {
    base.map(|dir| dir.join("walkie"))
        .ok_or_else(|| ConfigError::ParseError(format!("could not determine {kind} directory")))
}

fn write_template(path: &Path) -> Result<(), ConfigError> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, TEMPLATE)
    };
    write().map_err(|e| {
        ConfigError::ParseError(format!("failed to write {}: {e}", path.display()))
    })?;
    info!(path = %path.display(), "Wrote default config");
    Ok(())
}

const TEMPLATE: &str = r##"# walkie configuration
# Only override what you want to change -- missing fields use defaults.

[server]
# bind = "0.0.0.0"
# ws_port = 3000
# http_port = 3001
# history_limit = 50       # 1-1000
# max_text_chars = 500     # 1-10000
# session_queue = 256      # 16-65536

[client]
# server_url = "ws://127.0.0.1:3000"
# http_url = "http://127.0.0.1:3001"
# display_name = "bob"
# reconnect_delay_secs = 1        # 1-60
# max_reconnect_delay_secs = 30   # 1-600
# connect_timeout_secs = 15
# outbox_path = "/path/to/outbox.json"
# background_sync = true

[voice]
# sample_rate = 24000      # 8000-48000
# frame_samples = 4096     # 256-16384
# busy_indicator_ms = 2000

[logging]
# level = "info"           # trace, debug, info, warn, error
"##;

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn missing_explicit_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            load(Some(&path)),
            Err(ConfigError::FileNotFound(p)) if p == path
        ));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[server]\nws_port = 4000\n\n[client]\ndisplay_name = \"alice\"\n");

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.server.ws_port, 4000);
        assert_eq!(config.client.display_name.as_deref(), Some("alice"));
        assert_eq!(config.server.http_port, 3001);
        assert_eq!(config.voice.sample_rate, 24_000);
    }

    #[test]
    fn broken_toml_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[server\nws_port = ");

        match load(Some(&path)) {
            Err(ConfigError::ParseError(msg)) => assert!(msg.contains("config.toml")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn template_is_all_defaults() {
        let config: WalkieConfig = toml::from_str(TEMPLATE).unwrap();
        assert_eq!(config.server.ws_port, 3000);
        assert_eq!(config.client.reconnect_delay_secs, 1);
        assert!(config.client.background_sync);
    }

    #[test]
    fn template_is_written_with_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        write_template(&path).unwrap();
        assert!(load(Some(&path)).is_ok());
    }

    #[test]
    fn default_paths_live_under_walkie() {
        if let Ok(path) = default_config_path() {
            assert!(path.parent().unwrap().ends_with("walkie"));
        }
        if let Ok(path) = default_outbox_path() {
            assert_eq!(path.file_name().unwrap(), "outbox.json");
        }
    }
}
