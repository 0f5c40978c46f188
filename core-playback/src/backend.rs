//! # Playback Backend Contract
//!
//! One interface over "where audio is rendered". The switcher talks to the
//! active backend only through this trait and moves the UI's
//! [`PlaybackCallbacks`] sink between backends during a hand-off.
//!
//! Commands never fail loudly. A load that cannot happen (no locator, no
//! media server, renderer gone) is reported through the callbacks as status
//! [`TransportState::Error`] and song `None`.
//!
//! [`TransportState::Error`]: crate::types::TransportState::Error

use crate::callbacks::PlaybackCallbacks;
use crate::track::Track;
use crate::types::{BackendKind, RepeatMode};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait PlaybackBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn is_playing(&self) -> bool;

    fn current_track(&self) -> Option<Track>;

    /// Queue in play order.
    fn current_queue(&self) -> Vec<Track>;

    fn repeat_mode(&self) -> RepeatMode;

    fn is_shuffle_enabled(&self) -> bool;

    /// Replace the queue and start playing at `start_track` (first track when
    /// absent or not in `tracks`).
    async fn play_queue(&self, tracks: Vec<Track>, start_track: Option<Track>);

    /// Resume playback. Always `true` for the shipped backends.
    async fn start(&self) -> bool;

    /// Always `true` for the shipped backends.
    async fn pause(&self) -> bool;

    async fn stop(&self);

    /// Best effort; clamping is left to the engine.
    async fn seek(&self, position_ms: u64);

    async fn next(&self);

    async fn previous(&self);

    async fn toggle_shuffle(&self);

    async fn cycle_repeat_mode(&self);

    /// Duration of the current track in ms, 0 if unknown.
    fn duration(&self) -> u64;

    /// Position in ms, 0 if unknown.
    fn position(&self) -> u64;

    /// Free engines, listeners and timers. Idempotent.
    async fn release(&self);

    fn set_callbacks(&self, callbacks: Option<Arc<dyn PlaybackCallbacks>>);

    /// Detach the sink. The backend never invokes it again.
    fn take_callbacks(&self) -> Option<Arc<dyn PlaybackCallbacks>>;

    /// State needed to resume playback elsewhere.
    fn snapshot(&self) -> BackendSnapshot {
        BackendSnapshot {
            queue: self.current_queue(),
            current: self.current_track(),
            position_ms: self.position(),
            was_playing: self.is_playing(),
        }
    }
}

/// What a hand-off carries from one backend to the next.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BackendSnapshot {
    pub queue: Vec<Track>,
    pub current: Option<Track>,
    pub position_ms: u64,
    pub was_playing: bool,
}

impl BackendSnapshot {
    /// Only a non-empty queue with a current track is replayed.
    pub fn is_resumable(&self) -> bool {
        !self.queue.is_empty() && self.current.is_some()
    }
}
