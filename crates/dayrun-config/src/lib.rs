//! Configuration parsing and validation for dayrun
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Global defaults for duration, do-not-disturb and notifications
//! - Named session templates (open targets, commands, panes, audio)
//! - Resolution of templates plus command-line overrides into a `SessionSpec`

mod config;
mod resolve;
mod schema;
mod validation;

pub use config::*;
pub use resolve::*;
pub use schema::*;
pub use validation::*;

use dayrun_util::DayrunError;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<ConfigError> for DayrunError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ValidationFailed { errors } => DayrunError::config(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            other => DayrunError::config(other.to_string()),
        }
    }
}

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load the config, writing the default one first if the file is missing
pub fn load_or_init(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();
    if !path.exists() {
        let config = Config::default();
        save_config(path, &config)?;
        info!(path = %path.display(), "Wrote default configuration");
        return Ok(config);
    }
    load_config(path)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Config::from_raw(raw))
}

/// Write the configuration back to disk, creating parent directories
pub fn save_config(path: impl AsRef<Path>, config: &Config) -> ConfigResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(&config.to_raw())?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;
