//! Pending command with statum state machine for settlement safety
//!
//! A command is settled by consuming its [`PendingCommand`]; once it reaches
//! [`Settled`] there is no method that leads anywhere else, so a second settlement
//! cannot be written.
//!
//! The deadline is fixed when the command is created. It bounds the wait for the
//! command lane and the wait for the reply together.
//!
//! # State Machine
//!
//! ```text
//! Created ──► Published ──► Settled(Outcome)
//!    │                          ▲
//!    └──────────────────────────┘
//!      (no credential, publish failed, lane wait expired)
//! ```

use statum::{machine, state};
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::alarm::{ArmMode, CommandRequest, Outcome};

#[state]
#[derive(Debug, Clone)]
pub enum CommandPhase {
    Created,
    Published,
    Settled(Outcome),
}

#[machine]
#[derive(Debug)]
pub struct PendingCommand<S: CommandPhase> {
    request: CommandRequest,
    created_at: Instant,
    deadline: Instant,
}

impl<S: CommandPhase> PendingCommand<S> {
    pub fn request(&self) -> &CommandRequest {
        &self.request
    }

    pub fn mode(&self) -> ArmMode {
        self.request.mode()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Point in time after which the command settles as a timeout.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl PendingCommand<Created> {
    pub fn create(request: CommandRequest, timeout: Duration) -> Self {
        let created_at = Instant::now();
        Self::new(request, created_at, created_at + timeout)
    }

    /// Marks the command as handed to the bus. The deadline is kept.
    pub fn published(self) -> PendingCommand<Published> {
        self.transition()
    }

    /// Settles a command that never reached the bus.
    pub fn abandon(self, outcome: Outcome) -> Outcome {
        finish(self.transition_with(outcome.clone()), outcome)
    }
}

impl PendingCommand<Published> {
    pub fn settle(self, outcome: Outcome) -> Outcome {
        finish(self.transition_with(outcome.clone()), outcome)
    }
}

fn finish(settled: PendingCommand<Settled>, outcome: Outcome) -> Outcome {
    debug!(
        "{} settled after {:?}",
        settled.mode(),
        settled.created_at().elapsed()
    );
    outcome
}
