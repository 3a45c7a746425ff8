//! Content-based reply matching.
//!
//! The panel's protocol has no correlation token, so a reply is recognised by what it
//! says. A [`ReplyMatcher`] listens to the event topic and the state topic on behalf
//! of one command and is registered in a [`MatcherRegistry`] for exactly as long as
//! it exists.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use crate::alarm::event::{decode, DecodedEvent, EventParseError};
use crate::alarm::{ArmMode, SystemState};
use crate::mqtt::TopicSubscription;

pub type MatcherId = u64;

/// Bookkeeping of the matchers currently listening for replies.
#[derive(Debug, Default)]
pub struct MatcherRegistry {
    next_id: AtomicU64,
    active: Mutex<HashMap<MatcherId, ArmMode>>,
}

/// A message that settles the command it was matched for.
#[derive(Debug)]
pub enum MatchedReply {
    Event(DecodedEvent),
    Malformed(EventParseError),
    /// The state topic confirmed the command; only used for disarm.
    StateConfirmed(SystemState),
}

pub struct ReplyMatcher {
    id: MatcherId,
    mode: ArmMode,
    events: TopicSubscription,
    states: TopicSubscription,
    registry: Arc<MatcherRegistry>,
}

impl MatcherRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a matcher for `mode` over the given subscriptions.
    ///
    /// The subscriptions must be opened before the command is published, otherwise a
    /// fast reply can slip past.
    pub fn register(
        self: &Arc<Self>,
        mode: ArmMode,
        events: TopicSubscription,
        states: TopicSubscription,
    ) -> ReplyMatcher {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, mode);
        debug!("Registered reply matcher {} for {}", id, mode);
        ReplyMatcher {
            id,
            mode,
            events,
            states,
            registry: Arc::clone(self),
        }
    }

    fn deregister(&self, id: MatcherId) {
        if self.lock().remove(&id).is_some() {
            debug!("Deregistered reply matcher {}", id);
        }
    }

    /// Number of matchers still listening.
    pub fn active(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn active_modes(&self) -> Vec<ArmMode> {
        self.lock().values().copied().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<MatcherId, ArmMode>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReplyMatcher {
    pub fn id(&self) -> MatcherId {
        self.id
    }

    /// Waits for the first message that settles this matcher's command.
    ///
    /// Every event-topic message settles the command. State-topic messages only do so
    /// when they report `disarmed` for a disarm command. If both streams close the
    /// future never resolves and the command's deadline decides.
    pub async fn next_match(&mut self) -> MatchedReply {
        let mut events_open = true;
        let mut states_open = true;

        loop {
            if !events_open && !states_open {
                debug!("Matcher {} lost both subscriptions", self.id);
                return std::future::pending().await;
            }

            tokio::select! {
                biased;
                msg = self.events.recv(), if events_open => match msg {
                    Some(msg) => {
                        trace!("Matcher {} got event payload {:?}", self.id, msg.content());
                        return match decode(msg.content()) {
                            Ok(event) => MatchedReply::Event(event),
                            Err(e) => MatchedReply::Malformed(e),
                        };
                    }
                    None => events_open = false,
                },
                msg = self.states.recv(), if states_open => match msg {
                    Some(msg) => {
                        let state = SystemState::from_payload(msg.content());
                        if self.mode.is_disarm() && state == SystemState::Disarmed {
                            return MatchedReply::StateConfirmed(state);
                        }
                        trace!("Matcher {} ignoring state {}", self.id, state);
                    }
                    None => states_open = false,
                },
            }
        }
    }
}

impl Drop for ReplyMatcher {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}
