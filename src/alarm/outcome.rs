use super::event::ControllerEvent;
use super::state::SystemState;

/// Event label reported for a disarm confirmed through the state topic.
pub const DISARM_EVENT: &str = "DISARM";
/// Event label reported for a command that ran out of time.
pub const TIMEOUT_EVENT: &str = "TIMEOUT";

pub const TIMEOUT_MESSAGE: &str = "No response from the alarm panel";

/// Final result of one command. Produced exactly once per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { event: String, state: SystemState },
    DomainError { kind: ErrorKind, message: String },
    Timeout,
}

/// Why a command did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No credential was entered; nothing was published.
    MissingCredential,
    /// The bus refused the publish.
    PublishFailed,
    /// The panel answered with a rejection event.
    Rejected(ControllerEvent),
    /// The event payload could not be parsed.
    ParseError,
    /// The event payload parsed but carried a code the bridge does not know.
    Unrecognized(String),
}

/// Coarse error taxonomy used for logging and for deciding who hears about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Connectivity,
    DomainRejection,
    Parse,
    Timeout,
}

impl ErrorKind {
    /// The wire code for this kind.
    pub fn code(&self) -> &str {
        match self {
            ErrorKind::MissingCredential => ControllerEvent::NoCodeProvided.code(),
            ErrorKind::PublishFailed => "PUBLISH_FAILED",
            ErrorKind::Rejected(event) => event.code(),
            ErrorKind::ParseError => "PARSE_ERROR",
            ErrorKind::Unrecognized(_) => "UNRECOGNIZED",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ErrorKind::MissingCredential => ErrorClass::Validation,
            ErrorKind::PublishFailed => ErrorClass::Connectivity,
            ErrorKind::Rejected(_) => ErrorClass::DomainRejection,
            ErrorKind::ParseError | ErrorKind::Unrecognized(_) => ErrorClass::Parse,
        }
    }

    /// The controller event to report back to the keypad, if the failure has one.
    ///
    /// Transport and parse failures have no event of their own.
    pub fn event(&self) -> Option<&str> {
        match self {
            ErrorKind::MissingCredential => Some(ControllerEvent::NoCodeProvided.code()),
            ErrorKind::Rejected(event) => Some(event.code()),
            ErrorKind::Unrecognized(raw) => Some(raw.as_str()),
            ErrorKind::PublishFailed | ErrorKind::ParseError => None,
        }
    }
}

impl Outcome {
    pub fn success(event: impl Into<String>, state: SystemState) -> Self {
        Outcome::Success {
            event: event.into(),
            state,
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Outcome::DomainError {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn error_class(&self) -> Option<ErrorClass> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::DomainError { kind, .. } => Some(kind.class()),
            Outcome::Timeout => Some(ErrorClass::Timeout),
        }
    }

    /// Failures other keypads should hear about: timeouts and panel rejections.
    pub fn is_shared_failure(&self) -> bool {
        matches!(
            self.error_class(),
            Some(ErrorClass::Timeout) | Some(ErrorClass::DomainRejection)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_validation_reuses_the_panel_code() {
        let kind = ErrorKind::MissingCredential;
        assert_eq!(kind.code(), "NO_CODE_PROVIDED");
        assert_eq!(kind.class(), ErrorClass::Validation);
        assert_eq!(
            ErrorKind::Rejected(ControllerEvent::NoCodeProvided).class(),
            ErrorClass::DomainRejection
        );
    }

    #[test]
    fn transport_failures_have_no_event() {
        assert_eq!(ErrorKind::PublishFailed.event(), None);
        assert_eq!(ErrorKind::ParseError.event(), None);
        assert_eq!(
            ErrorKind::Unrecognized("BOOM".to_string()).event(),
            Some("BOOM")
        );
    }

    #[test]
    fn only_timeouts_and_rejections_are_shared() {
        assert!(Outcome::Timeout.is_shared_failure());
        assert!(Outcome::error(
            ErrorKind::Rejected(ControllerEvent::InvalidCodeProvided),
            "Invalid code"
        )
        .is_shared_failure());
        assert!(!Outcome::error(ErrorKind::MissingCredential, "No code provided")
            .is_shared_failure());
        assert!(!Outcome::error(ErrorKind::PublishFailed, "offline").is_shared_failure());
        assert!(!Outcome::success("ARM_AWAY", SystemState::ArmedAway).is_shared_failure());
    }
}
