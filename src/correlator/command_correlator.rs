use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::matcher::{MatchedReply, MatcherRegistry};
use super::pending::PendingCommand;
use crate::alarm::event::{DecodedEvent, EventVerdict};
use crate::alarm::outcome::{DISARM_EVENT, TIMEOUT_EVENT, TIMEOUT_MESSAGE};
use crate::alarm::{ArmMode, CommandRequest, ErrorKind, Outcome};
use crate::broadcast::{BroadcasterHandle, Notice};
use crate::mqtt::{BusGateway, Topics};

/// Default wait for the panel's answer.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Clone, Debug)]
pub struct CorrelatorSettings {
    pub topics: Topics,
    pub default_timeout: Duration,
}

/// Turns a fire-and-forget publish into a bounded, settled command result.
///
/// ## Command Lane
///
/// Replies carry no request id, so two commands in flight against the same panel
/// could each claim the other's answer. Commands therefore take turns: a command
/// holds the lane from publish to settlement and the next one waits. The deadline is
/// fixed at creation, so the wait for the lane and the wait for the reply share one
/// timeout.
pub struct CommandCorrelator {
    bus: Arc<dyn BusGateway>,
    broadcaster: BroadcasterHandle,
    matchers: Arc<MatcherRegistry>,
    lane: Mutex<()>,
    settings: CorrelatorSettings,
}

impl CommandCorrelator {
    pub fn new(
        bus: Arc<dyn BusGateway>,
        broadcaster: BroadcasterHandle,
        settings: CorrelatorSettings,
    ) -> Self {
        Self {
            bus,
            broadcaster,
            matchers: MatcherRegistry::new(),
            lane: Mutex::new(()),
            settings,
        }
    }

    /// Sends `request` with the configured default timeout.
    pub async fn issue_command(&self, request: CommandRequest) -> Outcome {
        self.issue_command_with_timeout(request, self.settings.default_timeout)
            .await
    }

    /// Sends `request` and waits at most `timeout` for the panel to answer.
    ///
    /// Always settles exactly once. Timeouts and panel rejections are also pushed to
    /// every observer so other keypads learn about the failed attempt.
    pub async fn issue_command_with_timeout(
        &self,
        request: CommandRequest,
        timeout: Duration,
    ) -> Outcome {
        let mode = request.mode();
        let pending = PendingCommand::create(request, timeout);
        info!("Issuing {} (timeout {:?})", mode, timeout);

        if !pending.request().has_credential() {
            debug!("Rejecting {} locally: no code entered", mode);
            return pending
                .abandon(Outcome::error(ErrorKind::MissingCredential, "No code provided"));
        }

        let _lane = match tokio::time::timeout_at(pending.deadline(), self.lane.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!("{} timed out waiting for the previous command", mode);
                let outcome = pending.abandon(Outcome::Timeout);
                self.share_failure(mode, &outcome).await;
                return outcome;
            }
        };

        let mut matcher = self.matchers.register(
            mode,
            self.bus.subscribe(&self.settings.topics.event),
            self.bus.subscribe(&self.settings.topics.state),
        );

        let payload = match pending.request().to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                return pending
                    .abandon(Outcome::error(
                        ErrorKind::PublishFailed,
                        format!("Failed to encode command: {}", e),
                    ));
            }
        };

        if let Err(e) = self.bus.publish(&self.settings.topics.command, payload).await {
            warn!("Publishing {} failed: {}", mode, e);
            return pending
                .abandon(Outcome::error(
                    ErrorKind::PublishFailed,
                    format!("Failed to publish command: {}", e),
                ));
        }
        let pending = pending.published();

        let outcome = tokio::select! {
            _ = tokio::time::sleep_until(pending.deadline()) => {
                warn!("{} timed out after {:?}", mode, timeout);
                pending.settle(Outcome::Timeout)
            }
            reply = matcher.next_match() => {
                let outcome = resolve_reply(mode, reply);
                pending.settle(outcome)
            }
        };
        drop(matcher);

        match &outcome {
            Outcome::Success { event, state } if *state != mode.target_state() => {
                warn!(
                    "{} settled by {} reporting {}; the reply may answer an earlier command",
                    mode, event, state
                )
            }
            Outcome::Success { event, state } => {
                info!("{} confirmed by {} ({})", mode, event, state)
            }
            Outcome::DomainError { kind, message } => {
                warn!("{} failed with {}: {}", mode, kind.code(), message)
            }
            Outcome::Timeout => {}
        }
        self.share_failure(mode, &outcome).await;
        outcome
    }

    /// Matchers that have not been released yet.
    pub fn active_matchers(&self) -> usize {
        self.matchers.active()
    }

    async fn share_failure(&self, mode: ArmMode, outcome: &Outcome) {
        if !outcome.is_shared_failure() {
            return;
        }
        let notice = match outcome {
            Outcome::Timeout => Notice::command_failed(
                &self.settings.topics.event,
                mode,
                TIMEOUT_EVENT,
                TIMEOUT_MESSAGE,
            ),
            Outcome::DomainError { kind, message } => Notice::command_failed(
                &self.settings.topics.event,
                mode,
                kind.code(),
                message.as_str(),
            ),
            Outcome::Success { .. } => return,
        };
        if let Err(e) = self.broadcaster.notify(notice).await {
            warn!("Could not share failed {} with observers: {}", mode, e);
        }
    }
}

/// Maps the reply that settled a command to its outcome.
pub fn resolve_reply(mode: ArmMode, reply: MatchedReply) -> Outcome {
    match reply {
        MatchedReply::Event(DecodedEvent::Known(event)) => match event.verdict() {
            EventVerdict::Accepted(state) => Outcome::success(event.code(), state),
            EventVerdict::Rejected { message } => {
                Outcome::error(ErrorKind::Rejected(event), message)
            }
        },
        MatchedReply::Event(DecodedEvent::Unrecognized(raw)) => {
            let message = format!("Unrecognized event from the alarm panel: {}", raw);
            Outcome::error(ErrorKind::Unrecognized(raw), message)
        }
        MatchedReply::Malformed(e) => Outcome::error(ErrorKind::ParseError, e.to_string()),
        MatchedReply::StateConfirmed(state) => {
            debug!("{} confirmed through state topic", mode);
            Outcome::success(DISARM_EVENT, state)
        }
    }
}
