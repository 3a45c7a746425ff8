//! Broker-less [`BusGateway`] used by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use super::message_manager::{BusMessage, TopicSubscription};
use super::{BusError, BusGateway, ConnectionState};

pub struct InMemoryBus {
    inbound: broadcast::Sender<BusMessage>,
    published: Mutex<Vec<(String, String)>>,
    publish_count: watch::Sender<usize>,
    connected: AtomicBool,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (inbound, _) = broadcast::channel(64);
        let (publish_count, _) = watch::channel(0);
        Self {
            inbound,
            published: Mutex::new(Vec::new()),
            publish_count,
            connected: AtomicBool::new(true),
        }
    }

    /// Delivers a message as if it came from the broker.
    pub fn inject(&self, topic: &str, content: &str) {
        let _ = self.inbound.send(BusMessage::from_topic(topic, content));
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn published_to(&self, topic: &str) -> usize {
        self.published().iter().filter(|(t, _)| t == topic).count()
    }

    /// Resolves once at least `count` publishes have been accepted.
    pub async fn wait_for_publishes(&self, count: usize) {
        let mut rx = self.publish_count.subscribe();
        let _ = rx.wait_for(|n| *n >= count).await;
    }

    pub fn subscriber_count(&self) -> usize {
        self.inbound.receiver_count()
    }
}

#[async_trait]
impl BusGateway for InMemoryBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BusError::Disconnected(ConnectionState::Disconnected));
        }
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.to_string(), payload));
        self.publish_count.send_modify(|n| *n += 1);
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> TopicSubscription {
        TopicSubscription::new(topic, self.inbound.subscribe())
    }
}
