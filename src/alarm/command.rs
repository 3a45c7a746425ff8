use serde::{Deserialize, Serialize};
use std::fmt;

use super::state::SystemState;

/// Command accepted by the alarm panel on the command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmMode {
    ArmHome,
    ArmAway,
    ArmNight,
    ArmVacation,
    Disarm,
}

impl ArmMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ArmMode::ArmHome => "arm_home",
            ArmMode::ArmAway => "arm_away",
            ArmMode::ArmNight => "arm_night",
            ArmMode::ArmVacation => "arm_vacation",
            ArmMode::Disarm => "disarm",
        }
    }

    pub fn is_disarm(&self) -> bool {
        matches!(self, ArmMode::Disarm)
    }

    /// State the panel reports once this command has taken effect.
    pub const fn target_state(&self) -> SystemState {
        match self {
            ArmMode::ArmHome => SystemState::ArmedHome,
            ArmMode::ArmAway => SystemState::ArmedAway,
            ArmMode::ArmNight => SystemState::ArmedNight,
            ArmMode::ArmVacation => SystemState::ArmedVacation,
            ArmMode::Disarm => SystemState::Disarmed,
        }
    }
}

impl fmt::Display for ArmMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single keypad request. The credential is forwarded to the panel untouched and
/// never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandRequest {
    mode: ArmMode,
    credential: String,
}

#[derive(Serialize)]
struct CommandPayload<'a> {
    command: ArmMode,
    code: &'a str,
}

impl CommandRequest {
    pub fn new(mode: ArmMode, credential: impl Into<String>) -> Self {
        Self {
            mode,
            credential: credential.into(),
        }
    }

    pub fn mode(&self) -> ArmMode {
        self.mode
    }

    pub fn has_credential(&self) -> bool {
        !self.credential.is_empty()
    }

    /// Renders the command-topic payload: `{"command": "<mode>", "code": "<credential>"}`.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&CommandPayload {
            command: self.mode,
            code: &self.credential,
        })
    }
}

impl fmt::Debug for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CommandRequest")
            .field("mode", &self.mode)
            .field("credential", &"<redacted>")
            .finish()
    }
}
