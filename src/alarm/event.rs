//! Controller event codes published on the event topic.
//!
//! The panel answers commands with `{"event": "<CODE>"}`. Each known code maps to
//! exactly one [`EventVerdict`]; the mapping is a plain `match`, so adding a code to
//! [`ControllerEvent`] will not compile until it is given a verdict.

use super::state::SystemState;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerEvent {
    ArmAway,
    ArmHome,
    ArmNight,
    ArmVacation,
    ArmCustomBypass,
    Trigger,
    FailedToArm,
    CommandNotAllowed,
    InvalidCodeProvided,
    NoCodeProvided,
}

/// What an event means for the command waiting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventVerdict {
    /// The panel accepted the command and moved to this state.
    Accepted(SystemState),
    /// The panel refused the command.
    Rejected { message: &'static str },
}

/// Result of decoding a well-formed event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    Known(ControllerEvent),
    /// Valid envelope, but the code is not one the bridge knows about.
    Unrecognized(String),
}

#[derive(Debug, Error)]
#[error("Malformed event payload: {0}")]
pub struct EventParseError(#[from] serde_json::Error);

#[derive(Deserialize)]
struct EventEnvelope {
    event: String,
}

impl ControllerEvent {
    pub const ALL: [ControllerEvent; 10] = [
        ControllerEvent::ArmAway,
        ControllerEvent::ArmHome,
        ControllerEvent::ArmNight,
        ControllerEvent::ArmVacation,
        ControllerEvent::ArmCustomBypass,
        ControllerEvent::Trigger,
        ControllerEvent::FailedToArm,
        ControllerEvent::CommandNotAllowed,
        ControllerEvent::InvalidCodeProvided,
        ControllerEvent::NoCodeProvided,
    ];

    pub const fn code(&self) -> &'static str {
        match self {
            ControllerEvent::ArmAway => "ARM_AWAY",
            ControllerEvent::ArmHome => "ARM_HOME",
            ControllerEvent::ArmNight => "ARM_NIGHT",
            ControllerEvent::ArmVacation => "ARM_VACATION",
            ControllerEvent::ArmCustomBypass => "ARM_CUSTOM_BYPASS",
            ControllerEvent::Trigger => "TRIGGER",
            ControllerEvent::FailedToArm => "FAILED_TO_ARM",
            ControllerEvent::CommandNotAllowed => "COMMAND_NOT_ALLOWED",
            ControllerEvent::InvalidCodeProvided => "INVALID_CODE_PROVIDED",
            ControllerEvent::NoCodeProvided => "NO_CODE_PROVIDED",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.code() == code)
    }

    pub const fn verdict(&self) -> EventVerdict {
        match self {
            ControllerEvent::ArmAway => EventVerdict::Accepted(SystemState::ArmedAway),
            ControllerEvent::ArmHome => EventVerdict::Accepted(SystemState::ArmedHome),
            ControllerEvent::ArmNight => EventVerdict::Accepted(SystemState::ArmedNight),
            ControllerEvent::ArmVacation => EventVerdict::Accepted(SystemState::ArmedVacation),
            ControllerEvent::ArmCustomBypass => {
                EventVerdict::Accepted(SystemState::ArmedCustomBypass)
            }
            ControllerEvent::Trigger => EventVerdict::Accepted(SystemState::Triggered),
            ControllerEvent::FailedToArm => EventVerdict::Rejected {
                message: "Failed to arm: one or more sensors are open",
            },
            ControllerEvent::CommandNotAllowed => EventVerdict::Rejected {
                message: "Command not allowed in the current alarm state",
            },
            ControllerEvent::InvalidCodeProvided => EventVerdict::Rejected {
                message: "Invalid code",
            },
            ControllerEvent::NoCodeProvided => EventVerdict::Rejected {
                message: "No code provided",
            },
        }
    }
}

impl fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Decodes an event-topic payload.
///
/// Fails only when the payload is not a JSON object with a string `event` field; an
/// unknown code inside a valid envelope is [`DecodedEvent::Unrecognized`].
pub fn decode(payload: &str) -> Result<DecodedEvent, EventParseError> {
    let envelope: EventEnvelope = serde_json::from_str(payload)?;
    Ok(match ControllerEvent::from_code(&envelope.event) {
        Some(event) => DecodedEvent::Known(event),
        None => DecodedEvent::Unrecognized(envelope.event),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_round_trips_through_from_code() {
        for event in ControllerEvent::ALL {
            assert_eq!(ControllerEvent::from_code(event.code()), Some(event));
        }
    }

    #[test]
    fn arm_events_map_to_their_state() {
        assert_eq!(
            ControllerEvent::ArmAway.verdict(),
            EventVerdict::Accepted(SystemState::ArmedAway)
        );
        assert_eq!(
            ControllerEvent::ArmCustomBypass.verdict(),
            EventVerdict::Accepted(SystemState::ArmedCustomBypass)
        );
        assert_eq!(
            ControllerEvent::Trigger.verdict(),
            EventVerdict::Accepted(SystemState::Triggered)
        );
    }

    #[test]
    fn rejection_events_carry_distinct_messages() {
        let messages: Vec<&str> = ControllerEvent::ALL
            .iter()
            .filter_map(|event| match event.verdict() {
                EventVerdict::Rejected { message } => Some(message),
                EventVerdict::Accepted(_) => None,
            })
            .collect();
        assert_eq!(messages.len(), 4);
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn decode_known_and_unknown_codes() {
        assert_eq!(
            decode(r#"{"event":"INVALID_CODE_PROVIDED"}"#).unwrap(),
            DecodedEvent::Known(ControllerEvent::InvalidCodeProvided)
        );
        assert_eq!(
            decode(r#"{"event":"DISARM"}"#).unwrap(),
            DecodedEvent::Unrecognized("DISARM".to_string())
        );
    }

    #[test]
    fn decode_rejects_malformed_payloads() {
        assert!(decode("ARM_AWAY").is_err());
        assert!(decode(r#"{"state":"armed_away"}"#).is_err());
        assert!(decode(r#"{"event":5}"#).is_err());
    }
}
