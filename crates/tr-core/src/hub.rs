use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tr_events::{HubMessage, TraceEvent};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obs-{}", self.0)
    }
}

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub evicted: usize,
}

/// Registry of live observers and the fan-out over them.
///
/// Every observer owns a bounded queue. Delivery never waits: an observer
/// whose queue is closed or full is dropped from the registry, which ends
/// its connection. It gets a fresh snapshot when it reconnects.
pub struct BroadcastHub {
    observers: BTreeMap<ObserverId, mpsc::Sender<Arc<HubMessage>>>,
    next_id: u64,
    buffer: usize,
}

impl BroadcastHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            observers: BTreeMap::new(),
            next_id: 0,
            buffer: buffer.max(1),
        }
    }

    /// Registers an observer whose first queued message is `history`.
    pub fn register(
        &mut self,
        history: Vec<TraceEvent>,
    ) -> (ObserverId, mpsc::Receiver<Arc<HubMessage>>) {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        let (sender, receiver) = mpsc::channel(self.buffer);
        // A fresh channel has room for at least one message.
        let _ = sender.try_send(Arc::new(HubMessage::InitialTraces(history)));
        self.observers.insert(id, sender);
        (id, receiver)
    }

    /// Removes an observer. Returns false if it was already gone.
    pub fn deregister(&mut self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    pub fn notify_new_event(&mut self, record: &TraceEvent) -> Delivery {
        self.broadcast(HubMessage::NewTrace(record.clone()))
    }

    pub fn notify_cleared(&mut self) -> Delivery {
        self.broadcast(HubMessage::TracesCleared)
    }

    /// Drops every observer queue, ending all live connections.
    pub fn close_all(&mut self) -> usize {
        let closed = self.observers.len();
        self.observers.clear();
        closed
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    fn broadcast(&mut self, message: HubMessage) -> Delivery {
        let message = Arc::new(message);
        let mut delivery = Delivery::default();
        let mut evicted = Vec::new();
        for (id, sender) in &self.observers {
            match sender.try_send(Arc::clone(&message)) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(observer = %id, event = message.name(), "observer queue full, evicting");
                    evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(observer = %id, "observer queue closed");
                    evicted.push(*id);
                }
            }
        }
        for id in evicted {
            self.observers.remove(&id);
            delivery.evicted += 1;
        }
        delivery
    }
}
