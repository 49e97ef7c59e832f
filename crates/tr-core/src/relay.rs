use crate::config::RelayConfig;
use crate::hub::{BroadcastHub, ObserverId};
use chrono::{DateTime, Utc};
use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tr_events::{HubMessage, RetentionStore, TraceEvent, TraceInput, TraceSource};
use tracing::{debug, info};
use ulid::Ulid;

/// Owns the retention store and the observer registry.
///
/// Both live behind one lock so that every mutation and its broadcast form a
/// single critical section: observers see notifications in exactly the
/// order the store accepted them, and a new observer's snapshot lines up
/// with the first notification it receives. Cloning is cheap and shares
/// the same state.
#[derive(Clone)]
pub struct TraceRelay {
    inner: Arc<RwLock<RelayState>>,
}

struct RelayState {
    store: RetentionStore,
    hub: BroadcastHub,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    Accepted(TraceEvent),
    /// The same `(id, status)` is already retained, typically because the
    /// producer reported it through both the log file and the push API.
    Duplicate { id: String },
}

impl Ingested {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayHealth {
    pub connected_clients: usize,
    pub total_traces: usize,
}

impl TraceRelay {
    pub fn new(store: RetentionStore, hub: BroadcastHub) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RelayState { store, hub })),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            RetentionStore::new(config.max_retained, config.max_age_delta()),
            BroadcastHub::new(config.observer_buffer),
        )
    }

    pub fn ingest(&self, input: TraceInput, source: TraceSource) -> Ingested {
        self.ingest_at(input, source, Utc::now())
    }

    /// Stamps, appends and broadcasts one validated payload.
    pub fn ingest_at(
        &self,
        input: TraceInput,
        source: TraceSource,
        now: DateTime<Utc>,
    ) -> Ingested {
        let mut state = self.write();
        let id = input
            .id
            .clone()
            .unwrap_or_else(|| format!("trc_{}", Ulid::new()));
        if state.store.contains(&id, input.status) {
            debug!(id = %id, status = input.status.as_str(), "duplicate trace dropped");
            return Ingested::Duplicate { id };
        }
        // received_at never goes backwards, even if the wall clock does.
        let received_at = state
            .store
            .last_received_at()
            .map_or(now, |last| last.max(now));
        let record = TraceEvent::from_input(input, id, source, received_at);
        let accepted = state.store.append(record);
        let delivery = state.hub.notify_new_event(&accepted);
        debug!(
            id = %accepted.id,
            command = %accepted.command,
            status = accepted.status.as_str(),
            delivered = delivery.delivered,
            "trace accepted"
        );
        Ingested::Accepted(accepted)
    }

    /// Empties the store and tells every observer to drop its history.
    pub fn clear(&self) -> usize {
        let mut state = self.write();
        let dropped = state.store.clear();
        let delivery = state.hub.notify_cleared();
        info!(dropped, notified = delivery.delivered, "traces cleared");
        dropped
    }

    pub fn snapshot(&self) -> Vec<TraceEvent> {
        self.read().store.snapshot()
    }

    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        self.write().store.sweep_expired(now)
    }

    /// Registers an observer; its first message is the history as of now.
    pub fn connect(&self) -> Subscription {
        let mut state = self.write();
        let history = state.store.snapshot();
        let (id, receiver) = state.hub.register(history);
        let observers = state.hub.len();
        drop(state);
        info!(observer = %id, observers, "observer connected");
        Subscription {
            id,
            receiver,
            relay: self.clone(),
        }
    }

    pub fn disconnect(&self, id: ObserverId) -> bool {
        let removed = self.write().hub.deregister(id);
        if removed {
            info!(observer = %id, "observer disconnected");
        }
        removed
    }

    /// Ends every live observer connection.
    pub fn close_observers(&self) -> usize {
        self.write().hub.close_all()
    }

    pub fn health(&self) -> RelayHealth {
        let state = self.read();
        RelayHealth {
            connected_clients: state.hub.len(),
            total_traces: state.store.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.read().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().store.is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, RelayState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RelayState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live observer. Dropping it deregisters the observer.
pub struct Subscription {
    id: ObserverId,
    receiver: mpsc::Receiver<Arc<HubMessage>>,
    relay: TraceRelay,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Next message, or `None` once the hub has dropped this observer.
    pub async fn recv(&mut self) -> Option<Arc<HubMessage>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<HubMessage>> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Arc<HubMessage>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.relay.disconnect(self.id);
    }
}
