//! # Bridge Configuration
//!
//! One TOML file with a table per concern. Every table and every field has a default,
//! so an empty file (or no file at all) yields a bridge that talks to a local broker.
//!
//! ## Lookup Order
//! 1. Path given as first command line argument
//! 2. `KEYPAD_BRIDGE_CONFIG` environment variable
//! 3. `<config dir>/keypad-bridge/config.toml`
//!
//! A missing file falls back to defaults with a warning. A file that exists but does not
//! parse is a startup error.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::broadcast::BroadcastSettings;
use crate::correlator::CorrelatorSettings;
use crate::mqtt::MqttConfig;

pub const CONFIG_ENV: &str = "KEYPAD_BRIDGE_CONFIG";
const CONFIG_DIR: &str = "keypad-bridge";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub http: HttpConfig,
    pub command: CommandConfig,
    pub broadcast: BroadcastConfig,
    pub home_assistant: HomeAssistantConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub listen_addr: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// How long a command waits for the panel before it settles as a timeout
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Notices buffered per observer before it is dropped as too slow
    pub observer_queue: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeAssistantConfig {
    pub base_url: String,
    /// Long-lived access token
    pub token: String,
    /// Entity ids listed by the sensor endpoint
    pub sensors: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { observer_queue: 32 }
    }
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8123".to_string(),
            token: String::new(),
            sensors: Vec::new(),
        }
    }
}

impl Config {
    /// Picks the config path from the CLI argument, the environment, or the user's
    /// config directory, in that order.
    pub fn resolve_path(cli_arg: Option<String>) -> Option<PathBuf> {
        if let Some(arg) = cli_arg {
            return Some(PathBuf::from(arg));
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        dirs::config_dir().map(|mut dir| {
            dir.push(CONFIG_DIR);
            dir.push(CONFIG_FILE);
            dir
        })
    }

    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            warn!("No config directory available, using defaults");
            return Ok(Self::default());
        };

        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if !exists {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;

        info!("Loaded config from {}", path.display());
        debug!("Broker {}, listening on {}", config.mqtt, config.http.listen_addr);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.command.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "command.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.broadcast.observer_queue == 0 {
            return Err(ConfigError::Invalid(
                "broadcast.observer_queue must be greater than zero".to_string(),
            ));
        }
        for (name, topic) in [
            ("command_topic", &self.mqtt.command_topic),
            ("event_topic", &self.mqtt.event_topic),
            ("state_topic", &self.mqtt.state_topic),
        ] {
            if topic.is_empty() {
                return Err(ConfigError::Invalid(format!("mqtt.{} must not be empty", name)));
            }
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command.timeout_ms)
    }

    pub fn correlator_settings(&self) -> CorrelatorSettings {
        CorrelatorSettings {
            topics: self.mqtt.topics(),
            default_timeout: self.command_timeout(),
        }
    }

    pub fn broadcast_settings(&self) -> BroadcastSettings {
        BroadcastSettings {
            state_topic: self.mqtt.state_topic.clone(),
            observer_queue: self.broadcast.observer_queue,
            ..BroadcastSettings::default()
        }
    }
}
