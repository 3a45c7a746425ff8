use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::notice::Notice;

pub type ObserverId = u64;

/// Live observers and their delivery queues.
///
/// Owned by the broadcaster task, which serializes every join, leave and notification
/// pass. Delivery never waits: an observer whose queue is full or whose receiver is
/// gone is removed on the spot and not retried.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    next_id: ObserverId,
    observers: HashMap<ObserverId, mpsc::Sender<Notice>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: mpsc::Sender<Notice>) -> ObserverId {
        let id = self.next_id;
        self.next_id += 1;
        self.observers.insert(id, observer);
        debug!("Registered observer {} ({} live)", id, self.observers.len());
        id
    }

    pub fn unregister(&mut self, id: ObserverId) -> bool {
        let removed = self.observers.remove(&id).is_some();
        if removed {
            debug!("Unregistered observer {} ({} live)", id, self.observers.len());
        }
        removed
    }

    /// Delivers `notice` to one observer. Returns `false` if the observer was dropped.
    pub fn send_to(&mut self, id: ObserverId, notice: Notice) -> bool {
        let Some(observer) = self.observers.get(&id) else {
            return false;
        };
        if let Err(e) = observer.try_send(notice) {
            warn!("Dropping observer {}: {}", id, e);
            self.observers.remove(&id);
            return false;
        }
        true
    }

    /// Delivers `notice` to every observer and returns how many received it.
    pub fn notify_all(&mut self, notice: &Notice) -> usize {
        let before = self.observers.len();
        self.observers.retain(|id, observer| match observer.try_send(notice.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping observer {}: {}", id, e);
                false
            }
        });
        let delivered = self.observers.len();
        if delivered < before {
            debug!("{} observer(s) dropped during notify", before - delivered);
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
