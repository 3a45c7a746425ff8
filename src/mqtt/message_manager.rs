use chrono::{DateTime, Utc};
use std::fmt;
use tokio::sync::broadcast;
use tracing::warn;

/// One message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    topic: String,
    content: String,
    timestamp: DateTime<Utc>,
}

impl fmt::Display for BusMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let preview: String = self.content.chars().take(32).collect();
        write!(f, "{} - {}: {}", self.timestamp, self.topic, preview)
    }
}

impl BusMessage {
    pub fn from_topic(topic: impl Into<String>, content: impl Into<String>) -> Self {
        BusMessage {
            topic: topic.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Live stream of the messages arriving on a single topic.
///
/// Sits on top of the gateway's inbound broadcast channel and skips every message for
/// other topics. Dropping it is the only way to unsubscribe.
pub struct TopicSubscription {
    topic: String,
    receiver: broadcast::Receiver<BusMessage>,
}

impl TopicSubscription {
    pub fn new(topic: impl Into<String>, receiver: broadcast::Receiver<BusMessage>) -> Self {
        Self {
            topic: topic.into(),
            receiver,
        }
    }

    /// Waits for the next message on this topic.
    ///
    /// Returns `None` once the gateway has shut down. A subscriber that falls behind
    /// loses the overflowed messages and keeps going.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) if msg.topic == self.topic => return Some(msg),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "Topic subscription lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}
