use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Broker connection settings plus the three topics the alarm panel uses.
///
/// ## Serialization
/// Read from the `[mqtt]` table of the configuration file. Every field has a default
/// so a partial table is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host name or address
    pub host: String,
    /// Broker TCP port
    pub port: u16,
    /// Client id presented to the broker
    pub client_id: String,
    /// Username for MQTT authentication, empty for anonymous
    pub user: String,
    /// Password for MQTT authentication
    pub pw: String,
    pub keep_alive_secs: u64,
    /// Pause between a connection error and the next reconnect attempt
    pub reconnect_delay_ms: u64,
    /// Capacity of the inbound message fan-out
    pub inbound_capacity: usize,
    pub command_topic: String,
    pub event_topic: String,
    pub state_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "keypad-bridge".to_string(),
            user: String::new(),
            pw: String::new(),
            keep_alive_secs: 5,
            reconnect_delay_ms: 2000,
            inbound_capacity: 256,
            command_topic: "home/alarm/set".to_string(),
            event_topic: "home/alarm/event".to_string(),
            state_topic: "home/alarm".to_string(),
        }
    }
}

/// Topic names used by the correlator and the broadcaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub command: String,
    pub event: String,
    pub state: String,
}

impl MqttConfig {
    pub fn topics(&self) -> Topics {
        Topics {
            command: self.command_topic.clone(),
            event: self.event_topic.clone(),
            state: self.state_topic.clone(),
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn has_credentials(&self) -> bool {
        !self.user.is_empty()
    }
}

impl fmt::Display for MqttConfig {
    /// Formats as "user@host:port"; the password is never shown.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.has_credentials() {
            write!(f, "{}@{}:{}", self.user, self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_hides_password() {
        let config = MqttConfig {
            user: "panel".to_string(),
            pw: "secret".to_string(),
            ..MqttConfig::default()
        };
        let shown = config.to_string();
        assert_eq!(shown, "panel@localhost:1883");
        assert!(!shown.contains("secret"));
    }

    #[test]
    fn topics_follow_config() {
        let config = MqttConfig {
            state_topic: "alarm/state".to_string(),
            ..MqttConfig::default()
        };
        let topics = config.topics();
        assert_eq!(topics.state, "alarm/state");
        assert_eq!(topics.command, "home/alarm/set");
    }
}
