//! External media-state listeners.
//!
//! Hosts register [`MediaStateListener`]s to mirror playback in their own UI.
//! Callbacks run on the bridge task, outside the registry lock, so a listener
//! may register or remove listeners from inside a callback.

use bridge_traits::media::Track;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receives playback transitions. Every method defaults to a no-op.
pub trait MediaStateListener: Send + Sync {
    fn on_change_track(&self, _track: &Track) {}

    /// `position_ms` is `None` for live content. Extrapolate with
    /// `position + (now - anchor_ms) * speed`.
    fn on_play_track(&self, _track_id: &str, _position_ms: Option<i64>, _anchor_ms: i64, _speed: f32) {
    }

    /// `None` once the session is torn down.
    fn on_pause_track(&self, _track_id: Option<&str>) {}

    /// A controller moved the playhead; `position_ms` is where it landed.
    fn on_seek_track(&self, _track_id: &str, _position_ms: i64) {}

    fn on_favorite_track(&self, _track_id: &str, _is_favorite: bool) {}

    fn on_playback_error(&self, _message: &str) {}
}

/// Token returned by [`ListenerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn MediaStateListener>)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn MediaStateListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Returns false when `id` was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Call `f` on every listener registered at the time of the call.
    pub fn notify(&self, f: impl Fn(&dyn MediaStateListener)) {
        let listeners: Vec<Arc<dyn MediaStateListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            f(listener.as_ref());
        }
    }

    pub fn playback_error(&self, message: &str) {
        self.notify(|listener| listener.on_playback_error(message));
    }
}
