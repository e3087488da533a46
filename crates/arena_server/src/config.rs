//! Server configuration.

use crate::game_registry::SweepPolicy;
use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Settings for a [`GameServer`](crate::GameServer).
///
/// Every field has a default, so an empty TOML file is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[setters(prefix = "with_")]
pub struct ServerConfig {
    /// Interface to listen on.
    #[serde(default = "default_host")]
    #[setters(into)]
    host: String,

    /// TCP port. `0` picks a free port.
    #[serde(default = "default_port")]
    port: u16,

    /// Usernames allowed to log in.
    #[serde(default = "default_users")]
    users: Vec<String>,

    /// Seconds between sweeps of finished and stale matches.
    #[serde(default = "default_sweep_interval_secs")]
    sweep_interval_secs: u64,

    /// Matches older than this are swept regardless of status.
    #[serde(default = "default_max_match_age_secs")]
    max_match_age_secs: u64,

    /// How long a completed match is kept after it ends.
    #[serde(default = "default_completed_grace_secs")]
    completed_grace_secs: u64,

    /// How long an abandoned match is kept after it ends.
    #[serde(default = "default_abandoned_grace_secs")]
    abandoned_grace_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_users() -> Vec<String> {
    vec!["narik".to_string(), "santo".to_string()]
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_max_match_age_secs() -> u64 {
    3600
}

fn default_completed_grace_secs() -> u64 {
    300
}

fn default_abandoned_grace_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            users: default_users(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_match_age_secs: default_max_match_age_secs(),
            completed_grace_secs: default_completed_grace_secs(),
            abandoned_grace_secs: default_abandoned_grace_secs(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;

        info!(host = %config.host, port = config.port, users = config.users.len(), "Config loaded");
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            info!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.users.iter().any(|u| u.trim().is_empty()) {
            return Err(ConfigError::new("users must not contain blank names".to_string()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::new("sweep_interval_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Period of the background sweep.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Retention rules for the match sweep.
    pub fn sweep_policy(&self) -> SweepPolicy {
        SweepPolicy::new(
            secs(self.max_match_age_secs),
            secs(self.completed_grace_secs),
            secs(self.abandoned_grace_secs),
        )
    }
}

fn secs(n: u64) -> chrono::Duration {
    i64::try_from(n)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
