use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Registry of per-room SSE hubs carved out from [`super::AppState`].
///
/// Each room gets its own hub lazily, created the first time a client
/// subscribes; the caller learns whether it was the one creating it so the
/// room's change-feed translator can be spawned exactly once.
pub struct SseState {
    hubs: DashMap<String, Arc<SseHub>>,
    capacity: usize,
}

impl SseState {
    /// Build the SSE registry with a per-hub channel capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            hubs: DashMap::new(),
            capacity,
        }
    }

    /// Hub for the given room, plus whether this call created it.
    pub fn room_hub(&self, code: &str) -> (Arc<SseHub>, bool) {
        match self.hubs.entry(code.to_string()) {
            dashmap::Entry::Occupied(entry) => (entry.get().clone(), false),
            dashmap::Entry::Vacant(slot) => {
                let hub = Arc::new(SseHub::new(self.capacity));
                slot.insert(hub.clone());
                (hub, true)
            }
        }
    }
}

/// Simple broadcast hub wrapper used by the SSE services.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}
