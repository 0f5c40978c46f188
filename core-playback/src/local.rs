//! # Local Dual-Engine Backend
//!
//! Plays the queue on the device through two host render pipelines:
//!
//! - **primary**: the engine the UI follows. Its position, duration and state
//!   are what the callbacks report.
//! - **staging**: holds the completion successor, loaded and prepared, so a
//!   crossfade can start it at any moment.
//!
//! ## Transitions
//!
//! [`LocalBackend::perform_transition`] ramps primary out and staging in (see
//! [`transition::ramp`](crate::transition::ramp)), then swaps identities:
//! primary loads the track staging was playing, seeks to staging's position
//! and takes over at full volume while staging is cleared and re-staged.
//! When automatic transitions are configured, the position task fires one per
//! track once the remaining time drops to the transition length.
//!
//! ## Threading
//!
//! Engine events arrive on host threads. They are translated into callbacks
//! directly; anything that drives the engines again (advancing the queue) is
//! spawned onto the runtime captured at construction.

use crate::backend::PlaybackBackend;
use crate::callbacks::{CallbackSlot, PlaybackCallbacks};
use crate::error::{PlaybackError, Result};
use crate::queue::PlayQueue;
use crate::track::Track;
use crate::transition::{ramp, RampOutcome, TransitionRunner, TransitionSettings};
use crate::types::{BackendKind, RepeatMode, TransportState};
use async_trait::async_trait;
use bridge_traits::{EngineState, MediaItem, RenderEvent, RenderListener, RenderPipeline};
use core_runtime::config::PlaybackTimings;
use core_runtime::logging::redact_locator;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Backend rendering on the device. Clones share the same engines.
#[derive(Clone)]
pub struct LocalBackend {
    inner: Arc<LocalInner>,
}

struct LocalInner {
    primary: Arc<dyn RenderPipeline>,
    staging: Arc<dyn RenderPipeline>,
    state: Mutex<LocalState>,
    callbacks: CallbackSlot,
    transitions: TransitionRunner,
    progress: Mutex<Option<CancellationToken>>,
    position_interval: Duration,
    transition_tick: Duration,
    runtime: Handle,
    released: AtomicBool,
}

#[derive(Default)]
struct LocalState {
    queue: PlayQueue,
    /// Track currently loaded into the staging engine.
    staged_id: Option<String>,
    auto_transition: Option<TransitionSettings>,
    /// Track for which the automatic transition already fired.
    auto_fired_for: Option<String>,
}

fn media_item(track: &Track) -> MediaItem {
    MediaItem::new(track.id.clone(), track.content_uri.clone())
}

impl LocalBackend {
    /// Take ownership of both engines.
    ///
    /// Must be called from within a Tokio runtime; the backend keeps a handle
    /// to it for work triggered by engine events.
    pub fn new(
        primary: Arc<dyn RenderPipeline>,
        staging: Arc<dyn RenderPipeline>,
        timings: &PlaybackTimings,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            PlaybackError::Internal("LocalBackend must be created inside a Tokio runtime".into())
        })?;

        let inner = Arc::new(LocalInner {
            primary,
            staging,
            state: Mutex::new(LocalState::default()),
            callbacks: CallbackSlot::new(),
            transitions: TransitionRunner::new(),
            progress: Mutex::new(None),
            position_interval: timings.position_interval,
            transition_tick: timings.transition_tick,
            runtime,
            released: AtomicBool::new(false),
        });

        inner.primary.set_listener(Some(Arc::new(PrimaryListener {
            inner: Arc::downgrade(&inner),
        })));
        inner.staging.set_listener(Some(Arc::new(StagingListener)));

        Ok(Self { inner })
    }

    /// Crossfade automatically near the end of every track. `None` or an
    /// inactive setting turns it off.
    pub fn set_auto_transition(&self, settings: Option<TransitionSettings>) {
        let mut state = self.inner.state.lock();
        state.auto_transition = settings.filter(TransitionSettings::is_active);
        state.auto_fired_for = None;
    }

    pub fn auto_transition(&self) -> Option<TransitionSettings> {
        self.inner.state.lock().auto_transition
    }

    /// Load `track` into the staging engine, or clear it with `None`.
    pub fn prepare_next(&self, track: Option<&Track>) {
        if self.inner.is_released() {
            return;
        }
        self.inner.stage(track);
    }

    /// Run a transition to the staged track and wait for it to finish.
    ///
    /// A transition already running is cancelled and superseded.
    pub async fn perform_transition(&self, settings: TransitionSettings) {
        Arc::clone(&self.inner).run_transition(settings).await;
    }

    /// Same as [`perform_transition`](Self::perform_transition), on a task.
    pub fn spawn_transition(&self, settings: TransitionSettings) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .runtime
            .spawn(async move { inner.run_transition(settings).await })
    }

    /// Adopt repeat and shuffle modes chosen elsewhere, reporting changes.
    pub fn apply_modes(&self, repeat: RepeatMode, shuffle: bool) {
        let inner = &self.inner;
        if inner.is_released() {
            return;
        }
        let (repeat_changed, shuffle_changed, queue) = {
            let mut state = inner.state.lock();
            let repeat_changed = state.queue.repeat_mode() != repeat;
            let shuffle_changed = state.queue.is_shuffled() != shuffle;
            state.queue.set_repeat_mode(repeat);
            state.queue.set_shuffle(shuffle);
            (
                repeat_changed,
                shuffle_changed,
                state.queue.tracks_in_play_order(),
            )
        };
        if !repeat_changed && !shuffle_changed {
            return;
        }
        debug!(?repeat, shuffle, "Playback modes adopted");
        inner.callbacks.emit(|cb| {
            if repeat_changed {
                cb.on_repeat_mode_changed(repeat);
            }
            if shuffle_changed {
                cb.on_shuffle_mode_changed(shuffle);
                cb.on_queue_changed(queue);
            }
        });
        inner.stage_successor();
    }

    pub fn is_transition_active(&self) -> bool {
        self.inner.transitions.is_active()
    }

    /// Id of the track waiting in the staging engine.
    pub fn staged_track_id(&self) -> Option<String> {
        self.inner.state.lock().staged_id.clone()
    }
}

impl LocalInner {
    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Load `track` into the primary engine. Returns `false` when the track
    /// has nothing to load.
    fn load_primary(self: &Arc<Self>, track: &Track, autoplay: bool) -> bool {
        self.state.lock().auto_fired_for = None;

        if !track.has_content() {
            warn!(track_id = %track.id, "Track has no content locator, not loading");
            self.primary.stop();
            self.primary.clear();
            self.stop_progress();
            self.callbacks.emit(|cb| {
                cb.on_status_changed(TransportState::Idle);
                cb.on_song_changed(None);
            });
            return false;
        }

        debug!(
            track_id = %track.id,
            locator = %redact_locator(&track.content_uri),
            autoplay,
            "Loading track into primary engine"
        );
        self.primary.load(media_item(track));
        self.primary.set_volume(1.0);
        self.primary.prepare();
        if autoplay {
            self.primary.play();
            self.ensure_progress();
        }

        let duration = track.duration_ms;
        self.callbacks.emit(|cb| {
            cb.on_song_changed(Some(track.clone()));
            if duration > 0 {
                cb.on_duration_changed(duration);
            }
        });
        true
    }

    /// Replace whatever the staging engine holds.
    fn stage(&self, track: Option<&Track>) {
        if self.staging.has_item() {
            self.staging.stop();
            self.staging.clear();
        }

        let staged = match track {
            Some(track) if track.has_content() => {
                debug!(track_id = %track.id, "Staging next track");
                self.staging.load(media_item(track));
                self.staging.prepare();
                self.staging.pause();
                Some(track.id.clone())
            }
            _ => None,
        };
        self.state.lock().staged_id = staged;
    }

    /// Stage what completion would move to. Left alone while a transition
    /// owns the staging engine.
    fn stage_successor(&self) {
        if self.transitions.is_active() {
            return;
        }
        let next = self.state.lock().queue.peek_next().cloned();
        self.stage(next.as_ref());
    }

    fn handle_primary_event(self: &Arc<Self>, event: RenderEvent) {
        if self.is_released() {
            return;
        }

        match event {
            RenderEvent::StateChanged(EngineState::Ended) => {
                let inner = Arc::clone(self);
                self.runtime.spawn(async move { inner.on_primary_ended() });
            }
            RenderEvent::StateChanged(EngineState::Idle) => {
                self.callbacks
                    .emit(|cb| cb.on_status_changed(TransportState::Idle));
            }
            RenderEvent::StateChanged(EngineState::Buffering) => {
                self.callbacks
                    .emit(|cb| cb.on_status_changed(TransportState::Loading));
            }
            RenderEvent::StateChanged(EngineState::Ready) => {
                self.callbacks
                    .emit(|cb| cb.on_status_changed(TransportState::Playing));
            }
            RenderEvent::IsPlayingChanged(playing) => {
                if playing {
                    self.ensure_progress();
                } else {
                    self.stop_progress();
                }
                self.callbacks.emit(|cb| cb.on_is_playing_changed(playing));
            }
            RenderEvent::DurationKnown(duration) => {
                self.callbacks.emit(|cb| cb.on_duration_changed(duration));
            }
            RenderEvent::Error { message } => {
                error!(%message, "Primary engine error");
                self.stop_progress();
                self.callbacks
                    .emit(|cb| cb.on_status_changed(TransportState::Error));
            }
        }
    }

    fn on_primary_ended(self: &Arc<Self>) {
        if self.is_released() {
            return;
        }
        if self.transitions.is_active() {
            debug!("End of track during a transition, left to the transition");
            return;
        }

        let next = self.state.lock().queue.advance_on_completion().cloned();
        match next {
            Some(track) => {
                debug!(track_id = %track.id, "Advancing to next track");
                if self.load_primary(&track, true) {
                    self.stage_successor();
                }
            }
            None => self.finish_queue(),
        }
    }

    fn finish_queue(&self) {
        info!("Queue finished");
        self.stop_progress();
        self.callbacks.emit(|cb| {
            cb.on_is_playing_changed(false);
            cb.on_status_changed(TransportState::Ended);
            cb.on_completion();
        });
    }

    async fn run_transition(self: Arc<Self>, settings: TransitionSettings) {
        if self.is_released() || !settings.is_active() {
            return;
        }

        let ticket = self.transitions.begin();
        info!(
            mode = ?settings.mode,
            duration_ms = settings.duration_ms,
            "Starting transition"
        );

        let outcome = ramp(
            &self.primary,
            &self.staging,
            &settings,
            self.transition_tick,
            ticket.token(),
        )
        .await;

        let completed = outcome == RampOutcome::Completed && !ticket.token().is_cancelled();
        if completed {
            self.swap_after_transition();
        } else {
            debug!(?outcome, "Transition did not complete");
        }

        self.transitions.finish(&ticket);
        if completed {
            self.stage_successor();
        }
    }

    /// Hand the staged track back to the primary engine.
    fn swap_after_transition(self: &Arc<Self>) {
        let next = self.state.lock().queue.advance_on_completion().cloned();
        let position = self.staging.position_ms();

        match next.filter(Track::has_content) {
            Some(track) => {
                debug!(track_id = %track.id, position_ms = position, "Swapping engines");
                self.primary.load(media_item(&track));
                self.primary.prepare();
                self.primary.seek(position);
                self.primary.set_volume(1.0);
                self.primary.play();
                self.ensure_progress();

                let duration = track.duration_ms;
                self.callbacks.emit(|cb| {
                    cb.on_song_changed(Some(track.clone()));
                    if duration > 0 {
                        cb.on_duration_changed(duration);
                    }
                });
            }
            None => self.finish_queue(),
        }

        self.staging.stop();
        self.staging.clear();
        let mut state = self.state.lock();
        state.staged_id = None;
        state.auto_fired_for = None;
    }

    fn ensure_progress(self: &Arc<Self>) {
        let token = {
            let mut slot = self.progress.lock();
            if slot.as_ref().is_some_and(|token| !token.is_cancelled()) {
                return;
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };

        let weak = Arc::downgrade(self);
        let interval = self.position_interval;
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.report_progress();
            }
        });
    }

    fn stop_progress(&self) {
        if let Some(token) = self.progress.lock().take() {
            token.cancel();
        }
    }

    fn report_progress(self: &Arc<Self>) {
        let position = self.primary.position_ms();
        self.callbacks.emit(|cb| cb.on_position_changed(position));
        self.maybe_auto_transition(position);
    }

    fn maybe_auto_transition(self: &Arc<Self>, position: u64) {
        if self.transitions.is_active() || !self.staging.has_item() {
            return;
        }
        let Some(duration) = self.primary.duration_ms() else {
            return;
        };

        let settings = {
            let mut state = self.state.lock();
            let Some(settings) = state.auto_transition else {
                return;
            };
            let Some(current) = state.queue.current().map(|track| track.id.clone()) else {
                return;
            };
            if state.staged_id.is_none()
                || state.auto_fired_for.as_deref() == Some(current.as_str())
            {
                return;
            }
            if position == 0 || duration.saturating_sub(position) > settings.duration_ms {
                return;
            }
            state.auto_fired_for = Some(current);
            settings
        };

        debug!(position_ms = position, duration_ms = duration, "Automatic transition due");
        let inner = Arc::clone(self);
        self.runtime
            .spawn(async move { inner.run_transition(settings).await });
    }
}

struct PrimaryListener {
    inner: Weak<LocalInner>,
}

impl RenderListener for PrimaryListener {
    fn on_render_event(&self, event: RenderEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_primary_event(event);
        }
    }
}

struct StagingListener;

impl RenderListener for StagingListener {
    fn on_render_event(&self, event: RenderEvent) {
        if let RenderEvent::Error { message } = event {
            warn!(%message, "Staging engine error");
        }
    }
}

#[async_trait]
impl PlaybackBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn is_playing(&self) -> bool {
        self.inner.primary.is_playing()
    }

    fn current_track(&self) -> Option<Track> {
        self.inner.state.lock().queue.current().cloned()
    }

    fn current_queue(&self) -> Vec<Track> {
        self.inner.state.lock().queue.tracks_in_play_order()
    }

    fn repeat_mode(&self) -> RepeatMode {
        self.inner.state.lock().queue.repeat_mode()
    }

    fn is_shuffle_enabled(&self) -> bool {
        self.inner.state.lock().queue.is_shuffled()
    }

    async fn play_queue(&self, tracks: Vec<Track>, start_track: Option<Track>) {
        let inner = &self.inner;
        if inner.is_released() {
            return;
        }
        inner.transitions.cancel();

        let (current, queue) = {
            let mut state = inner.state.lock();
            let start_id = start_track.as_ref().map(|track| track.id.as_str());
            let current = state.queue.replace(tracks, start_id).cloned();
            (current, state.queue.tracks_in_play_order())
        };
        info!(
            tracks = queue.len(),
            start = ?current.as_ref().map(|track| track.id.as_str()),
            "Playing queue locally"
        );
        inner.callbacks.emit(|cb| cb.on_queue_changed(queue));

        match current {
            Some(track) => {
                inner
                    .callbacks
                    .emit(|cb| cb.on_status_changed(TransportState::Loading));
                if inner.load_primary(&track, true) {
                    inner.stage_successor();
                } else {
                    inner.stage(None);
                }
            }
            None => {
                inner.primary.stop();
                inner.primary.clear();
                inner.stage(None);
                inner.stop_progress();
                inner.callbacks.emit(|cb| {
                    cb.on_song_changed(None);
                    cb.on_status_changed(TransportState::Idle);
                });
            }
        }
    }

    async fn start(&self) -> bool {
        let inner = &self.inner;
        if inner.is_released() {
            return false;
        }
        if inner.primary.has_item() && inner.primary.state() == EngineState::Idle {
            inner.primary.prepare();
        }
        inner.primary.play();
        inner.ensure_progress();
        true
    }

    async fn pause(&self) -> bool {
        let inner = &self.inner;
        if inner.is_released() {
            return false;
        }
        inner.primary.pause();
        inner.stop_progress();
        true
    }

    async fn stop(&self) {
        let inner = &self.inner;
        if inner.is_released() {
            return;
        }
        inner.transitions.cancel();
        inner.primary.stop();
        inner.primary.set_volume(1.0);
        inner.staging.pause();
        inner.stop_progress();
        inner.callbacks.emit(|cb| {
            cb.on_is_playing_changed(false);
            cb.on_status_changed(TransportState::Idle);
        });
    }

    async fn seek(&self, position_ms: u64) {
        let inner = &self.inner;
        if inner.is_released() {
            return;
        }
        inner.primary.seek(position_ms);
        inner.state.lock().auto_fired_for = None;
        inner
            .callbacks
            .emit(|cb| cb.on_position_changed(position_ms));
    }

    async fn next(&self) {
        self.skip(true);
    }

    async fn previous(&self) {
        self.skip(false);
    }

    async fn toggle_shuffle(&self) {
        let inner = &self.inner;
        let (enabled, queue) = {
            let mut state = inner.state.lock();
            let enabled = !state.queue.is_shuffled();
            state.queue.set_shuffle(enabled);
            (enabled, state.queue.tracks_in_play_order())
        };
        debug!(enabled, "Shuffle toggled");
        inner.callbacks.emit(|cb| {
            cb.on_shuffle_mode_changed(enabled);
            cb.on_queue_changed(queue);
        });
        inner.stage_successor();
    }

    async fn cycle_repeat_mode(&self) {
        let inner = &self.inner;
        let mode = {
            let mut state = inner.state.lock();
            let mode = state.queue.repeat_mode().cycled();
            state.queue.set_repeat_mode(mode);
            mode
        };
        debug!(?mode, "Repeat mode cycled");
        inner.callbacks.emit(|cb| cb.on_repeat_mode_changed(mode));
        inner.stage_successor();
    }

    fn duration(&self) -> u64 {
        self.inner.primary.duration_ms().unwrap_or(0)
    }

    fn position(&self) -> u64 {
        self.inner.primary.position_ms()
    }

    async fn release(&self) {
        let inner = &self.inner;
        if inner.released.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Releasing local backend");
        inner.transitions.cancel();
        inner.stop_progress();
        inner.primary.set_listener(None);
        inner.staging.set_listener(None);
        inner.callbacks.take();
        inner.primary.release();
        inner.staging.release();
    }

    fn set_callbacks(&self, callbacks: Option<Arc<dyn PlaybackCallbacks>>) {
        self.inner.callbacks.set(callbacks);
    }

    fn take_callbacks(&self) -> Option<Arc<dyn PlaybackCallbacks>> {
        self.inner.callbacks.take()
    }
}

impl LocalBackend {
    fn skip(&self, forward: bool) {
        let inner = &self.inner;
        if inner.is_released() {
            return;
        }

        let (before, after) = {
            let mut state = inner.state.lock();
            let before = state.queue.current().map(|track| track.id.clone());
            let after = if forward {
                state.queue.next().cloned()
            } else {
                state.queue.previous().cloned()
            };
            (before, after)
        };

        let Some(track) = after else {
            return;
        };
        if before.as_deref() == Some(track.id.as_str()) {
            debug!(forward, "Already at the edge of the queue");
            return;
        }

        inner.transitions.cancel();
        let autoplay = inner.primary.is_playing();
        if inner.load_primary(&track, autoplay) {
            inner.stage_successor();
        }
    }
}
