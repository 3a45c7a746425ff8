//! State Broadcaster - single owner of the panel state cache and the observer list
//!
//! One task holds the cache, the [`ObserverRegistry`] and the state-topic
//! subscription. Everything that reads or changes them goes through the task's
//! action queue, so a state update and its notification pass finish before the task
//! looks at the next message.
//!
//! ```text
//! state topic ──┐
//!               ├──► StateBroadcaster ──► cache (watch) ──► current_state()
//! actions ──────┘           │
//!  (register, unregister,   └──► ObserverRegistry ──► observer queues
//!   notify)
//! ```

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::notice::{Notice, StateSnapshot};
use super::registry::{ObserverId, ObserverRegistry};
use super::BroadcastError;
use crate::alarm::SystemState;
use crate::mqtt::{BusMessage, TopicSubscription};

#[derive(Clone, Debug)]
pub struct BroadcastSettings {
    /// Topic name copied into every state notice
    pub state_topic: String,
    /// Per-observer queue length before the observer is considered too slow
    pub observer_queue: usize,
    pub action_queue: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            state_topic: "home/alarm".to_string(),
            observer_queue: 32,
            action_queue: 64,
        }
    }
}

enum BroadcasterAction {
    Register {
        respond_to: oneshot::Sender<(ObserverId, mpsc::Receiver<Notice>)>,
    },
    Unregister(ObserverId),
    Notify(Notice),
}

/// A registered observer's end of the push channel.
///
/// Dropping it unregisters the observer.
pub struct Observer {
    id: ObserverId,
    receiver: mpsc::Receiver<Notice>,
    actions: mpsc::Sender<BroadcasterAction>,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Next notice, or `None` once the broadcaster dropped this observer.
    pub async fn recv(&mut self) -> Option<Notice> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Notice, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        if self
            .actions
            .try_send(BroadcasterAction::Unregister(self.id))
            .is_err()
        {
            debug!("Observer {} dropped after broadcaster shutdown", self.id);
        }
    }
}

/// Cloneable access to the broadcaster task.
#[derive(Clone)]
pub struct BroadcasterHandle {
    actions: mpsc::Sender<BroadcasterAction>,
    cache: watch::Receiver<Option<StateSnapshot>>,
}

struct StateBroadcaster {
    states: TopicSubscription,
    actions: mpsc::Receiver<BroadcasterAction>,
    registry: ObserverRegistry,
    cache: watch::Sender<Option<StateSnapshot>>,
    settings: BroadcastSettings,
}

impl BroadcasterHandle {
    /// Spawns the broadcaster on an already-open state-topic subscription.
    pub fn spawn(
        states: TopicSubscription,
        settings: BroadcastSettings,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        info!(
            "Starting state broadcaster on {} (observer queue {})",
            states.topic(),
            settings.observer_queue
        );
        let (action_tx, action_rx) = mpsc::channel(settings.action_queue.max(1));
        let (cache_tx, cache_rx) = watch::channel(None);

        let broadcaster = StateBroadcaster {
            states,
            actions: action_rx,
            registry: ObserverRegistry::new(),
            cache: cache_tx,
            settings,
        };
        let task = tokio::spawn(broadcaster.run(shutdown));

        (
            Self {
                actions: action_tx,
                cache: cache_rx,
            },
            task,
        )
    }

    /// Joins the fan-out. The current state, if any, is the first notice delivered.
    pub async fn register(&self) -> Result<Observer, BroadcastError> {
        let (respond_to, response) = oneshot::channel();
        self.actions
            .send(BroadcasterAction::Register { respond_to })
            .await
            .map_err(|_| BroadcastError::Closed)?;
        let (id, receiver) = response.await.map_err(|_| BroadcastError::Closed)?;
        Ok(Observer {
            id,
            receiver,
            actions: self.actions.clone(),
        })
    }

    pub async fn unregister(&self, id: ObserverId) -> Result<(), BroadcastError> {
        self.actions
            .send(BroadcasterAction::Unregister(id))
            .await
            .map_err(|_| BroadcastError::Closed)
    }

    /// Fans a notice out to every observer without touching the state cache.
    pub async fn notify(&self, notice: Notice) -> Result<(), BroadcastError> {
        self.actions
            .send(BroadcasterAction::Notify(notice))
            .await
            .map_err(|_| BroadcastError::Closed)
    }

    pub fn current_state(&self) -> Option<StateSnapshot> {
        *self.cache.borrow()
    }

    /// Watch on the cache; changes once per state-topic message.
    pub fn subscribe(&self) -> watch::Receiver<Option<StateSnapshot>> {
        self.cache.clone()
    }
}

impl StateBroadcaster {
    async fn run(mut self, shutdown: CancellationToken) {
        let mut states_open = true;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(
                        "State broadcaster shutting down with {} observer(s)",
                        self.registry.len()
                    );
                    break;
                }
                msg = self.states.recv(), if states_open => match msg {
                    Some(msg) => self.apply_state(msg),
                    None => {
                        warn!("State subscription closed, keeping last known state");
                        states_open = false;
                    }
                },
                action = self.actions.recv() => match action {
                    Some(action) => self.handle_action(action),
                    None => break,
                },
            }
        }
    }

    fn apply_state(&mut self, msg: BusMessage) {
        let state = SystemState::from_payload(msg.content());
        if state == SystemState::Unknown && msg.content().trim() != "unknown" {
            warn!("Unrecognised state payload {:?}, caching as unknown", msg.content());
        }
        let snapshot = StateSnapshot {
            state,
            timestamp: Utc::now(),
        };
        self.cache.send_replace(Some(snapshot));

        let delivered = self
            .registry
            .notify_all(&Notice::state(&self.settings.state_topic, snapshot));
        info!("Alarm state is now {} ({} observer(s) notified)", state, delivered);
    }

    fn handle_action(&mut self, action: BroadcasterAction) {
        match action {
            BroadcasterAction::Register { respond_to } => {
                let (tx, rx) = mpsc::channel(self.settings.observer_queue.max(1));
                let id = self.registry.register(tx);
                let cached = *self.cache.borrow();
                if let Some(snapshot) = cached {
                    self.registry
                        .send_to(id, Notice::state(&self.settings.state_topic, snapshot));
                }
                if respond_to.send((id, rx)).is_err() {
                    debug!("Observer {} gave up before registration finished", id);
                    self.registry.unregister(id);
                }
            }
            BroadcasterAction::Unregister(id) => {
                self.registry.unregister(id);
            }
            BroadcasterAction::Notify(notice) => {
                let delivered = self.registry.notify_all(&notice);
                debug!("Notice delivered to {} observer(s)", delivered);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::memory_bus::InMemoryBus;
    use crate::mqtt::BusGateway;
    use std::time::Duration;

    const STATE_TOPIC: &str = "home/alarm";

    fn spawn(bus: &InMemoryBus) -> (BroadcasterHandle, CancellationToken) {
        let shutdown = CancellationToken::new();
        let settings = BroadcastSettings {
            state_topic: STATE_TOPIC.to_string(),
            ..BroadcastSettings::default()
        };
        let (handle, _task) =
            BroadcasterHandle::spawn(bus.subscribe(STATE_TOPIC), settings, shutdown.clone());
        (handle, shutdown)
    }

    async fn wait_for_state(handle: &BroadcasterHandle, state: SystemState) {
        let mut cache = handle.subscribe();
        cache
            .wait_for(|snapshot| snapshot.map(|s| s.state) == Some(state))
            .await
            .unwrap();
    }

    fn state_of(notice: Notice) -> SystemState {
        match notice {
            Notice::State { state, .. } => state,
            other => panic!("expected a state notice, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_cache_replays_nothing() {
        let bus = InMemoryBus::new();
        let (handle, _shutdown) = spawn(&bus);

        let mut observer = handle.register().await.unwrap();
        assert!(handle.current_state().is_none());
        assert!(observer.try_recv().is_err());
    }

    #[tokio::test]
    async fn state_update_reaches_every_observer() {
        let bus = InMemoryBus::new();
        let (handle, _shutdown) = spawn(&bus);
        let mut first = handle.register().await.unwrap();
        let mut second = handle.register().await.unwrap();

        bus.inject(STATE_TOPIC, "armed_away");

        assert_eq!(state_of(first.recv().await.unwrap()), SystemState::ArmedAway);
        assert_eq!(state_of(second.recv().await.unwrap()), SystemState::ArmedAway);
        assert_eq!(
            handle.current_state().map(|s| s.state),
            Some(SystemState::ArmedAway)
        );
    }

    #[tokio::test]
    async fn late_joiner_gets_exactly_one_replay() {
        let bus = InMemoryBus::new();
        let (handle, _shutdown) = spawn(&bus);
        let mut early = handle.register().await.unwrap();

        bus.inject(STATE_TOPIC, "armed_home");
        wait_for_state(&handle, SystemState::ArmedHome).await;
        assert_eq!(state_of(early.recv().await.unwrap()), SystemState::ArmedHome);

        let mut late = handle.register().await.unwrap();
        assert_eq!(state_of(late.recv().await.unwrap()), SystemState::ArmedHome);

        // A round trip through the task guarantees the replay pass is over.
        let _probe = handle.register().await.unwrap();
        assert!(late.try_recv().is_err());
        assert!(early.try_recv().is_err());
    }

    #[tokio::test]
    async fn updates_are_delivered_in_order() {
        let bus = InMemoryBus::new();
        let (handle, _shutdown) = spawn(&bus);
        let mut observer = handle.register().await.unwrap();

        for payload in ["arming", "armed_night", "triggered", "disarmed"] {
            bus.inject(STATE_TOPIC, payload);
        }

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(state_of(observer.recv().await.unwrap()));
        }
        assert_eq!(
            seen,
            vec![
                SystemState::Arming,
                SystemState::ArmedNight,
                SystemState::Triggered,
                SystemState::Disarmed
            ]
        );
    }

    #[tokio::test]
    async fn garbage_state_is_cached_as_unknown() {
        let bus = InMemoryBus::new();
        let (handle, _shutdown) = spawn(&bus);

        bus.inject(STATE_TOPIC, "on fire");
        wait_for_state(&handle, SystemState::Unknown).await;
    }

    #[tokio::test]
    async fn slow_observer_does_not_block_others() {
        let bus = InMemoryBus::new();
        let shutdown = CancellationToken::new();
        let settings = BroadcastSettings {
            state_topic: STATE_TOPIC.to_string(),
            observer_queue: 1,
            ..BroadcastSettings::default()
        };
        let (handle, _task) =
            BroadcasterHandle::spawn(bus.subscribe(STATE_TOPIC), settings, shutdown);
        let mut slow = handle.register().await.unwrap();
        let mut fast = handle.register().await.unwrap();

        bus.inject(STATE_TOPIC, "arming");
        assert_eq!(state_of(fast.recv().await.unwrap()), SystemState::Arming);
        bus.inject(STATE_TOPIC, "armed_away");
        assert_eq!(state_of(fast.recv().await.unwrap()), SystemState::ArmedAway);

        // The slow observer kept its first notice and was then cut off.
        assert_eq!(state_of(slow.recv().await.unwrap()), SystemState::Arming);
        assert!(slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn notify_does_not_touch_cache() {
        let bus = InMemoryBus::new();
        let (handle, _shutdown) = spawn(&bus);
        let mut observer = handle.register().await.unwrap();

        handle
            .notify(Notice::command_failed(
                "home/alarm/event",
                crate::alarm::ArmMode::ArmAway,
                "TIMEOUT",
                "late",
            ))
            .await
            .unwrap();

        assert!(matches!(
            observer.recv().await.unwrap(),
            Notice::CommandFailed { .. }
        ));
        assert!(handle.current_state().is_none());
    }

    #[tokio::test]
    async fn dropped_observer_is_unregistered() {
        let bus = InMemoryBus::new();
        let (handle, _shutdown) = spawn(&bus);
        let observer = handle.register().await.unwrap();
        let id = observer.id();
        drop(observer);

        let mut other = handle.register().await.unwrap();
        assert_ne!(other.id(), id);
        bus.inject(STATE_TOPIC, "pending");
        assert_eq!(state_of(other.recv().await.unwrap()), SystemState::Pending);
    }

    #[tokio::test]
    async fn register_fails_after_shutdown() {
        let bus = InMemoryBus::new();
        let shutdown = CancellationToken::new();
        let (handle, task) = BroadcasterHandle::spawn(
            bus.subscribe(STATE_TOPIC),
            BroadcastSettings::default(),
            shutdown.clone(),
        );
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(handle.register().await, Err(BroadcastError::Closed)));
    }
}
