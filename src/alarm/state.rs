use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// State of the alarm panel as published on the state topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    Disarmed,
    ArmedHome,
    ArmedAway,
    ArmedNight,
    ArmedVacation,
    ArmedCustomBypass,
    Pending,
    Arming,
    Triggered,
    Unknown,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown alarm state: {0}")]
pub struct UnknownState(pub String);

impl SystemState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SystemState::Disarmed => "disarmed",
            SystemState::ArmedHome => "armed_home",
            SystemState::ArmedAway => "armed_away",
            SystemState::ArmedNight => "armed_night",
            SystemState::ArmedVacation => "armed_vacation",
            SystemState::ArmedCustomBypass => "armed_custom_bypass",
            SystemState::Pending => "pending",
            SystemState::Arming => "arming",
            SystemState::Triggered => "triggered",
            SystemState::Unknown => "unknown",
        }
    }

    /// Decodes a raw state-topic payload.
    ///
    /// The panel publishes the bare state name. Anything that does not name a known
    /// state is reported as [`SystemState::Unknown`] instead of being dropped, so the
    /// cache always reflects the most recent message.
    pub fn from_payload(payload: &str) -> Self {
        payload.trim().parse().unwrap_or(SystemState::Unknown)
    }

    pub fn is_armed(&self) -> bool {
        matches!(
            self,
            SystemState::ArmedHome
                | SystemState::ArmedAway
                | SystemState::ArmedNight
                | SystemState::ArmedVacation
                | SystemState::ArmedCustomBypass
        )
    }
}

impl FromStr for SystemState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disarmed" => Ok(SystemState::Disarmed),
            "armed_home" => Ok(SystemState::ArmedHome),
            "armed_away" => Ok(SystemState::ArmedAway),
            "armed_night" => Ok(SystemState::ArmedNight),
            "armed_vacation" => Ok(SystemState::ArmedVacation),
            "armed_custom_bypass" => Ok(SystemState::ArmedCustomBypass),
            "pending" => Ok(SystemState::Pending),
            "arming" => Ok(SystemState::Arming),
            "triggered" => Ok(SystemState::Triggered),
            "unknown" => Ok(SystemState::Unknown),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
