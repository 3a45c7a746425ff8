use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::alarm::{ArmMode, SystemState};

/// The cached panel state together with the time it was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub state: SystemState,
    pub timestamp: DateTime<Utc>,
}

/// What an observer receives over its push channel.
///
/// Serialized without a tag: state notices are `{topic, state, timestamp}`, command
/// failures add the command, event code and message instead of a state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Notice {
    State {
        topic: String,
        state: SystemState,
        timestamp: DateTime<Utc>,
    },
    CommandFailed {
        topic: String,
        command: ArmMode,
        event: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl Notice {
    pub fn state(topic: impl Into<String>, snapshot: StateSnapshot) -> Self {
        Notice::State {
            topic: topic.into(),
            state: snapshot.state,
            timestamp: snapshot.timestamp,
        }
    }

    pub fn command_failed(
        topic: impl Into<String>,
        command: ArmMode,
        event: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Notice::CommandFailed {
            topic: topic.into(),
            command,
            event: event.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
