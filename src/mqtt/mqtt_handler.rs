//! MQTT connection handling on top of `rumqttc`.
//!
//! [`MqttHandle::spawn`] creates the client and moves the event loop into its own
//! task. The task is the only place that touches the connection: it tracks the
//! [`ConnectionState`], re-subscribes after every ConnAck and forwards inbound
//! publishes to every [`TopicSubscription`].
//!
//! # Connection Lifecycle
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► Reconnecting ──► Connected
//!                      │                             ▲
//!                      └──────► Failed ──────────────┘
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::config::MqttConfig;
use super::message_manager::{BusMessage, TopicSubscription};
use super::{BusError, BusGateway};

/// Capacity of the request queue between the client and the event loop.
const REQUEST_CAPACITY: usize = 100;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
            ConnectionState::Reconnecting => "reconnecting",
        };
        write!(f, "{}", name)
    }
}

/// Connection health as seen by the event loop.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BusStatus {
    pub connection_state: ConnectionState,
    pub last_error: Option<String>,
    pub messages_received: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Cloneable front end of the MQTT connection.
#[derive(Clone)]
pub struct MqttHandle {
    client: AsyncClient,
    inbound: broadcast::Sender<BusMessage>,
    status: watch::Receiver<BusStatus>,
}

struct MqttHandler {
    client: AsyncClient,
    eventloop: EventLoop,
    config: MqttConfig,
    inbound: broadcast::Sender<BusMessage>,
    status: watch::Sender<BusStatus>,
}

impl MqttHandle {
    /// Creates the client and spawns the event loop task.
    ///
    /// The task runs until `shutdown` is cancelled. Nothing is sent to the broker
    /// before the task's first poll, so subscriptions opened right after this call
    /// see every message from the first connection on.
    pub fn spawn(config: &MqttConfig, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        info!("Spawning MQTT connection to {}", config);

        let (handler, handle) = MqttHandler::new(config);
        let task = tokio::spawn(handler.run(shutdown));
        (handle, task)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.status.borrow().connection_state
    }

    pub fn status(&self) -> watch::Receiver<BusStatus> {
        self.status.clone()
    }
}

#[async_trait]
impl BusGateway for MqttHandle {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        let state = self.connection_state();
        if state != ConnectionState::Connected {
            return Err(BusError::Disconnected(state));
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.into_bytes())
            .await?;
        debug!("Queued publish on {}", topic);
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> TopicSubscription {
        TopicSubscription::new(topic, self.inbound.subscribe())
    }
}

impl MqttHandler {
    fn new(config: &MqttConfig) -> (Self, MqttHandle) {
        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        mqtt_options.set_keep_alive(config.keep_alive());
        if config.has_credentials() {
            mqtt_options.set_credentials(config.user.clone(), config.pw.clone());
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);
        let (inbound, _) = broadcast::channel(config.inbound_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(BusStatus::default());

        let handler = MqttHandler {
            client: client.clone(),
            eventloop,
            config: config.clone(),
            inbound: inbound.clone(),
            status: status_tx,
        };
        let handle = MqttHandle {
            client,
            inbound,
            status: status_rx,
        };
        (handler, handle)
    }

    async fn run(mut self, shutdown: CancellationToken) {
        self.set_state(ConnectionState::Connecting);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutting down MQTT connection");
                    if let Err(e) = self.client.try_disconnect() {
                        debug!("Disconnect request not delivered: {}", e);
                    }
                    self.set_state(ConnectionState::Disconnected);
                    break;
                }
                polled = self.eventloop.poll() => match polled {
                    Ok(event) => self.handle_event(event),
                    Err(e) => {
                        error!("MQTT connection error: {}", e);
                        self.record_error(e.to_string());
                        let delay = self.config.reconnect_delay();
                        if !Self::backoff(delay, &shutdown).await {
                            self.set_state(ConnectionState::Disconnected);
                            break;
                        }
                    }
                },
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Connected to MQTT broker {}", self.config);
                    self.set_state(ConnectionState::Connected);
                    self.subscribe_topics();
                } else {
                    warn!("Broker refused connection: {:?}", ack.code);
                    self.record_error(format!("connection refused: {:?}", ack.code));
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                let content = String::from_utf8_lossy(&publish.payload).into_owned();
                let msg = BusMessage::from_topic(publish.topic, content);
                trace!("Received {}", msg);
                self.status.send_modify(|status| {
                    status.messages_received += 1;
                    status.last_activity = Some(msg.timestamp());
                });
                // No subscribers is fine, the message is simply not needed.
                let _ = self.inbound.send(msg);
            }
            Event::Incoming(Packet::Disconnect) => {
                warn!("Broker closed the connection");
                self.set_state(ConnectionState::Reconnecting);
            }
            other => trace!("MQTT event: {:?}", other),
        }
    }

    /// Clean sessions drop subscriptions, so they are renewed on every ConnAck.
    fn subscribe_topics(&self) {
        for topic in [&self.config.event_topic, &self.config.state_topic] {
            match self.client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                Ok(()) => debug!("Subscribed to {}", topic),
                Err(e) => error!("Failed to subscribe to {}: {}", topic, e),
            }
        }
    }

    /// Waits out the reconnect delay. Returns `false` when shutdown interrupted it.
    ///
    /// Must not borrow the handler: the event loop is not `Sync` and the task has to
    /// stay `Send`.
    async fn backoff(delay: Duration, shutdown: &CancellationToken) -> bool {
        debug!("Retrying MQTT connection in {:?}", delay);
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn record_error(&self, message: String) {
        self.status.send_modify(|status| {
            status.connection_state = match status.connection_state {
                ConnectionState::Connected | ConnectionState::Reconnecting => {
                    ConnectionState::Reconnecting
                }
                _ => ConnectionState::Failed,
            };
            status.last_error = Some(message);
        });
    }

    fn set_state(&self, state: ConnectionState) {
        self.status.send_modify(|status| status.connection_state = state);
    }
}
