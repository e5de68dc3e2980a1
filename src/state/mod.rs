pub mod room;
mod sse;
pub mod state_machine;

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::{config::AppConfig, dao::room_store::RoomStore};

pub use self::sse::{SseHub, SseState};
pub use self::state_machine::{InvalidTransition, RoomLifecycleEvent, RoomStatus};

/// Shared handle to the application state, cheap to clone.
pub type SharedState = Arc<AppState>;

const SSE_HUB_CAPACITY: usize = 32;

/// Central application state: the injected room store, configuration, the
/// per-room SSE hubs, and the armed disconnect hooks.
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn RoomStore>,
    sse: SseState,
    disconnect_hooks: DashMap<(String, String), u64>,
    hook_seq: AtomicU64,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The room store is an explicit dependency rather than a module-level
    /// singleton, so tests can hand in their own instance.
    pub fn new(config: AppConfig, store: Arc<dyn RoomStore>) -> SharedState {
        Arc::new(Self {
            config,
            store,
            sse: SseState::new(SSE_HUB_CAPACITY),
            disconnect_hooks: DashMap::new(),
            hook_seq: AtomicU64::new(0),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Handle to the room store.
    pub fn store(&self) -> Arc<dyn RoomStore> {
        self.store.clone()
    }

    /// Per-room SSE hub registry.
    pub fn sse(&self) -> &SseState {
        &self.sse
    }

    /// Arm the abrupt-disconnect cleanup for a participant's event stream.
    ///
    /// Returns a token identifying this stream. Re-arming for the same
    /// participant (an `EventSource` reconnect) supersedes the previous
    /// stream's token, so only the latest stream's teardown cleans up.
    pub fn arm_disconnect_hook(&self, code: &str, peer_id: &str) -> u64 {
        let token = self.hook_seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.disconnect_hooks
            .insert((code.to_string(), peer_id.to_string()), token);
        token
    }

    /// Disarm the hook no matter which stream armed it (intentional leave,
    /// or the staleness sweep). Returns whether it was still armed.
    pub fn disarm_disconnect_hook(&self, code: &str, peer_id: &str) -> bool {
        self.disconnect_hooks
            .remove(&(code.to_string(), peer_id.to_string()))
            .is_some()
    }

    /// Disarm the hook only when `token` is still the armed one. A stale
    /// token belongs to a superseded stream whose teardown must not fire.
    pub fn disarm_disconnect_hook_token(&self, code: &str, peer_id: &str, token: u64) -> bool {
        self.disconnect_hooks
            .remove_if(&(code.to_string(), peer_id.to_string()), |_, armed| {
                *armed == token
            })
            .is_some()
    }
}
