//! # MQTT Bus Gateway
//!
//! Sole connection between the bridge and the alarm panel's broker. Everything else in
//! the crate talks to the panel through the [`BusGateway`] trait and never touches
//! `rumqttc` directly.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker address, credentials and topic names
//! ├── message_manager.rs  - Inbound message representation and per-topic streams
//! └── mqtt_handler.rs     - Connection state machine and protocol handling
//! ```
//!
//! ## Delivery Model
//!
//! `publish` is fire-and-forget: it fails fast with [`BusError::Disconnected`] when the
//! broker is not reachable and otherwise returns as soon as the request is queued.
//! `subscribe` hands out a live stream for a single topic. Streams preserve broker
//! order per connection; messages that arrive while the connection is down are lost,
//! and reconnection is the handler's concern alone.

pub mod config;
#[cfg(test)]
pub mod memory_bus;
pub mod message_manager;
pub mod mqtt_handler;

pub use config::{MqttConfig, Topics};
pub use message_manager::{BusMessage, TopicSubscription};
pub use mqtt_handler::{BusStatus, ConnectionState, MqttHandle};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Broker not reachable (connection state: {0})")]
    Disconnected(ConnectionState),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Publish/subscribe access to the panel's topics.
#[async_trait]
pub trait BusGateway: Send + Sync {
    /// Queues `payload` for delivery on `topic`.
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError>;

    /// Opens a live stream of every message arriving on `topic` from now on.
    fn subscribe(&self, topic: &str) -> TopicSubscription;
}
