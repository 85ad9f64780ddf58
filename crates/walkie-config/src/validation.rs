//! Full configuration validation.
//!
//! Validates numeric ranges, URL schemes, and the reconnect backoff bounds.

use crate::schema::WalkieConfig;
use walkie_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &WalkieConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    // Server
    validate_range(&mut errors, "server.ws_port", config.server.ws_port.into(), 1, 65535);
    validate_range(&mut errors, "server.http_port", config.server.http_port.into(), 1, 65535);
    if config.server.ws_port == config.server.http_port {
        errors.push(format!(
            "server.ws_port and server.http_port must differ (both {})",
            config.server.ws_port
        ));
    }
    validate_range(
        &mut errors,
        "server.history_limit",
        config.server.history_limit.into(),
        1,
        1000,
    );
    validate_range(
        &mut errors,
        "server.max_text_chars",
        config.server.max_text_chars.into(),
        1,
        10_000,
    );
    validate_range(
        &mut errors,
        "server.session_queue",
        config.server.session_queue.into(),
        16,
        65_536,
    );

    // Client
    validate_scheme(&mut errors, "client.server_url", &config.client.server_url, &["ws://", "wss://"]);
    validate_scheme(&mut errors, "client.http_url", &config.client.http_url, &["http://", "https://"]);
    validate_range(
        &mut errors,
        "client.reconnect_delay_secs",
        config.client.reconnect_delay_secs,
        1,
        60,
    );
    validate_range(
        &mut errors,
        "client.max_reconnect_delay_secs",
        config.client.max_reconnect_delay_secs,
        1,
        600,
    );
    if config.client.max_reconnect_delay_secs < config.client.reconnect_delay_secs {
        errors.push(format!(
            "client.max_reconnect_delay_secs = {} is below client.reconnect_delay_secs = {}",
            config.client.max_reconnect_delay_secs, config.client.reconnect_delay_secs
        ));
    }
    validate_range(
        &mut errors,
        "client.connect_timeout_secs",
        config.client.connect_timeout_secs,
        1,
        120,
    );
    if let Some(name) = &config.client.display_name {
        if name.trim().is_empty() {
            errors.push("client.display_name must not be blank".into());
        }
    }

    // Voice
    validate_range(
        &mut errors,
        "voice.sample_rate",
        config.voice.sample_rate.into(),
        8000,
        48_000,
    );
    validate_range(
        &mut errors,
        "voice.frame_samples",
        config.voice.frame_samples.into(),
        256,
        16_384,
    );
    validate_range(
        &mut errors,
        "voice.busy_indicator_ms",
        config.voice.busy_indicator_ms,
        0,
        60_000,
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_range(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(format!(
            "{name} = {value} is out of range [{min}, {max}]"
        ));
    }
}

fn validate_scheme(errors: &mut Vec<String>, name: &str, value: &str, schemes: &[&str]) {
    if !schemes.iter().any(|s| value.starts_with(s)) {
        errors.push(format!(
            "{name} = {value:?} must start with one of {}",
            schemes.join(", ")
        ));
    }
}
