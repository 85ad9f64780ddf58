//! walkie configuration system.
//!
//! TOML-based configuration shared by the server and the terminal client.
//! All sections use defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use walkie_config::load_config;
//!
//! let config = load_config(None).expect("failed to load config");
//! println!("{}", config.server.ws_addr());
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    ClientConfig, LogLevel, LoggingConfig, ServerConfig, VoiceConfig, WalkieConfig,
};
pub use toml_loader::{default_config_path, default_outbox_path};

use std::path::Path;

use walkie_common::ConfigError;

/// Load config from `path`, or from the platform default when `None`.
///
/// Call [`validation::validate`] once command-line overrides are applied.
pub fn load_config(path: Option<&Path>) -> Result<WalkieConfig, ConfigError> {
    toml_loader::load(path)
}
