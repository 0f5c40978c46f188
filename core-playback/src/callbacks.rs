//! Observer contract between a backend and the UI layer.

use crate::track::Track;
use crate::types::{RepeatMode, TransportState};
use parking_lot::Mutex;
use std::sync::Arc;

/// Receiver of backend state changes.
///
/// Calls may arrive on any thread, including host engine threads. Every
/// method defaults to a no-op so observers only implement what they show.
pub trait PlaybackCallbacks: Send + Sync {
    fn on_song_changed(&self, _track: Option<Track>) {}

    fn on_is_playing_changed(&self, _playing: bool) {}

    fn on_shuffle_mode_changed(&self, _enabled: bool) {}

    fn on_repeat_mode_changed(&self, _mode: RepeatMode) {}

    fn on_position_changed(&self, _position_ms: u64) {}

    fn on_duration_changed(&self, _duration_ms: u64) {}

    /// Queue in play order.
    fn on_queue_changed(&self, _queue: Vec<Track>) {}

    /// The whole queue played to its end.
    fn on_completion(&self) {}

    fn on_status_changed(&self, _state: TransportState) {}
}

/// Holder for a backend's callback sink.
///
/// The sink is cloned out of the lock before it is invoked, so observers can
/// call back into the backend.
#[derive(Default)]
pub struct CallbackSlot {
    inner: Mutex<Option<Arc<dyn PlaybackCallbacks>>>,
}

impl CallbackSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, callbacks: Option<Arc<dyn PlaybackCallbacks>>) {
        *self.inner.lock() = callbacks;
    }

    /// Remove and return the sink. Nothing is emitted afterwards.
    pub fn take(&self) -> Option<Arc<dyn PlaybackCallbacks>> {
        self.inner.lock().take()
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn emit(&self, f: impl FnOnce(&dyn PlaybackCallbacks)) {
        let callbacks = self.inner.lock().clone();
        if let Some(callbacks) = callbacks {
            f(callbacks.as_ref());
        }
    }
}

impl std::fmt::Debug for CallbackSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        completions: AtomicUsize,
    }

    impl PlaybackCallbacks for Counting {
        fn on_completion(&self) {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn take_stops_emission() {
        let counting = Arc::new(Counting::default());
        let slot = CallbackSlot::new();
        slot.set(Some(counting.clone()));

        slot.emit(|cb| cb.on_completion());
        let taken = slot.take();
        slot.emit(|cb| cb.on_completion());

        assert!(taken.is_some());
        assert!(!slot.is_set());
        assert_eq!(counting.completions.load(Ordering::SeqCst), 1);
    }
}
