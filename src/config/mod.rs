//! Configuration module - environment variable parsing

use std::env;

/// Application configuration loaded from environment variables.
/// Everything has a sane default; the core runs with an empty environment.
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Allowed drift between client intent timestamps and server time (ms).
    /// Wide enough to absorb clock skew without admitting stale commands.
    pub input_tolerance_ms: u64,

    /// Playfield dimensions in world units
    pub world_width: f32,
    pub world_height: f32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            input_tolerance_ms: parse_var("INPUT_TOLERANCE_MS", 5000)?,
            world_width: parse_var("WORLD_WIDTH", 1920.0)?,
            world_height: parse_var("WORLD_HEIGHT", 1080.0)?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            input_tolerance_ms: 5000,
            world_width: 1920.0,
            world_height: 1080.0,
        }
    }
}
