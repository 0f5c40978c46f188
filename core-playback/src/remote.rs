//! # Remote Renderer Backend
//!
//! Drives a cast session's media client. Audio is streamed by the renderer
//! itself from the local media server, so every queue item carries an HTTP
//! URL built from the published [`ServerAddress`].
//!
//! ## Status translation
//!
//! The renderer pushes coarse status notifications. Each one is reduced to the
//! callback vocabulary and only differences are forwarded:
//!
//! | Renderer                   | Reported                 |
//! |----------------------------|--------------------------|
//! | Idle + `Finished`          | `Ended` (+ completion)   |
//! | Idle + `Error`             | `Error`                  |
//! | other Idle, Unknown        | `Idle`                   |
//! | Loading, Buffering         | `Loading`                |
//! | Playing / Paused           | `Playing` / `Paused`     |
//!
//! Completion is reported once per finished queue. The renderer's item id is
//! mapped back to a [`Track`] through the `trackId` custom data attached at
//! load time, falling back to the item's position in the queue.
//!
//! ## Repeat and shuffle
//!
//! The protocol only knows one combined mode, so shuffle is expressed as
//! [`RemoteRepeatMode::AllAndShuffle`]. Toggling shuffle off always lands on
//! repeat `Off`.

use crate::backend::PlaybackBackend;
use crate::callbacks::{CallbackSlot, PlaybackCallbacks};
use crate::error::{PlaybackError, Result};
use crate::track::Track;
use crate::types::{BackendKind, RepeatMode, TransportState};
use async_trait::async_trait;
use bridge_traits::{
    IdleReason, ListenerId, MediaEndpoints, MediaStatus, QueueLoadRequest, RemoteMediaClient,
    RemoteMediaInfo, RemoteMediaListener, RemotePlayerState, RemoteQueueItem, RemoteRepeatMode,
    RemoteSession, ResumeState, ServerAddress,
};
use core_runtime::config::PlaybackTimings;
use core_runtime::logging::redact_address;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key of the track id inside each queue item's custom data.
const TRACK_ID_KEY: &str = "trackId";

/// Backend rendering on a cast session.
#[derive(Clone)]
pub struct RemoteBackend {
    inner: Arc<RemoteInner>,
}

struct RemoteInner {
    session_id: String,
    client: Arc<dyn RemoteMediaClient>,
    server_address: ServerAddress,
    load_timeout: Duration,
    state: Mutex<RemoteState>,
    callbacks: CallbackSlot,
    listener_id: Mutex<Option<ListenerId>>,
    released: AtomicBool,
}

#[derive(Default)]
struct RemoteState {
    /// Queue as sent to the renderer.
    tracks: Vec<Track>,
    current: Option<Track>,
    last_transport: Option<TransportState>,
    last_playing: Option<bool>,
    last_duration: Option<u64>,
    repeat: RemoteRepeatMode,
    completion_reported: bool,
}

/// Local repeat mode and shuffle flag for a renderer mode.
pub fn local_modes(mode: RemoteRepeatMode) -> (RepeatMode, bool) {
    match mode {
        RemoteRepeatMode::Off => (RepeatMode::Off, false),
        RemoteRepeatMode::All => (RepeatMode::All, false),
        RemoteRepeatMode::Single => (RepeatMode::One, false),
        RemoteRepeatMode::AllAndShuffle => (RepeatMode::All, true),
    }
}

/// Renderer mode for a local repeat mode and shuffle flag.
///
/// Shuffle wins: it can only be expressed together with repeat-all.
pub fn remote_mode(repeat: RepeatMode, shuffle: bool) -> RemoteRepeatMode {
    match (repeat, shuffle) {
        (_, true) => RemoteRepeatMode::AllAndShuffle,
        (RepeatMode::Off, false) => RemoteRepeatMode::Off,
        (RepeatMode::All, false) => RemoteRepeatMode::All,
        (RepeatMode::One, false) => RemoteRepeatMode::Single,
    }
}

/// MIME type announced to the renderer for a file extension.
pub fn content_type_for(extension: Option<&str>) -> &'static str {
    match extension {
        Some("flac") => "audio/flac",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("ogg") | Some("oga") | Some("opus") => "audio/ogg",
        Some("wav") => "audio/wav",
        _ => "audio/mpeg",
    }
}

fn transport_for(status: &MediaStatus) -> TransportState {
    match status.player_state {
        RemotePlayerState::Idle => match status.idle_reason {
            Some(IdleReason::Finished) => TransportState::Ended,
            Some(IdleReason::Error) => TransportState::Error,
            _ => TransportState::Idle,
        },
        RemotePlayerState::Unknown => TransportState::Idle,
        RemotePlayerState::Loading | RemotePlayerState::Buffering => TransportState::Loading,
        RemotePlayerState::Playing => TransportState::Playing,
        RemotePlayerState::Paused => TransportState::Paused,
    }
}

fn queue_item(track: &Track, endpoints: &MediaEndpoints) -> RemoteQueueItem {
    let extension = track.extension();
    RemoteQueueItem {
        media: RemoteMediaInfo {
            content_url: endpoints.song_url(&track.id),
            content_type: content_type_for(extension.as_deref()).to_string(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            artwork_url: track
                .artwork_uri
                .as_ref()
                .map(|_| endpoints.art_url(&track.id)),
            duration_ms: track.duration_ms,
        },
        custom_data: Some(json!({ TRACK_ID_KEY: track.id })),
    }
}

/// Track the renderer is on.
///
/// `None` when the status names no current item. `Some(None)` when the item
/// cannot be mapped back to the queue.
fn resolve_current(tracks: &[Track], status: &MediaStatus) -> Option<Option<Track>> {
    let item_id = status.current_item_id?;
    let index = status.index_of(item_id);

    let by_custom_data = index
        .and_then(|index| status.items.get(index))
        .and_then(|entry| entry.custom_data.as_ref())
        .and_then(|data| data.get(TRACK_ID_KEY))
        .and_then(|id| id.as_str())
        .and_then(|id| tracks.iter().find(|track| track.id == id));

    let resolved = by_custom_data.or_else(|| index.and_then(|index| tracks.get(index)));
    if resolved.is_none() {
        warn!(item_id, "Remote item does not match any queued track");
    }
    Some(resolved.cloned())
}

impl RemoteBackend {
    /// Attach to `session`. Fails when the session has no media channel.
    pub fn new(
        session: Arc<dyn RemoteSession>,
        server_address: ServerAddress,
        timings: &PlaybackTimings,
    ) -> Result<Self> {
        let session_id = session.session_id();
        let client = session
            .media_client()
            .ok_or_else(|| PlaybackError::SessionUnavailable(session_id.clone()))?;

        let inner = Arc::new(RemoteInner {
            session_id,
            client,
            server_address,
            load_timeout: timings.remote_load_timeout,
            state: Mutex::new(RemoteState::default()),
            callbacks: CallbackSlot::new(),
            listener_id: Mutex::new(None),
            released: AtomicBool::new(false),
        });

        let listener = Arc::new(StatusListener {
            inner: Arc::downgrade(&inner),
        });
        let id = inner
            .client
            .register_listener(listener, timings.remote_progress_interval);
        *inner.listener_id.lock() = Some(id);

        debug!(session_id = %inner.session_id, "Remote backend attached");
        Ok(Self { inner })
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Mode used for the next queue load, without contacting the renderer.
    pub fn set_initial_modes(&self, repeat: RepeatMode, shuffle: bool) {
        self.inner.state.lock().repeat = remote_mode(repeat, shuffle);
    }

    /// Load `tracks` on the renderer.
    ///
    /// Starts at `start_track` (first track when absent or unknown) and
    /// `start_position_ms`. Waits for the renderer's acknowledgement, at most
    /// the configured load timeout. Failures are also reported through the
    /// callbacks as status `Error` and song `None`.
    pub async fn load_queue(
        &self,
        tracks: Vec<Track>,
        start_track: Option<&Track>,
        start_position_ms: u64,
        autoplay: bool,
    ) -> Result<()> {
        let inner = &self.inner;
        if inner.released.load(Ordering::SeqCst) {
            return Err(PlaybackError::Released);
        }

        let start_index = start_track
            .and_then(|start| tracks.iter().position(|track| track.id == start.id))
            .unwrap_or(0);
        let repeat_mode = {
            let mut state = inner.state.lock();
            state.tracks = tracks.clone();
            state.current = None;
            state.last_transport = None;
            state.last_playing = None;
            state.last_duration = None;
            state.completion_reported = false;
            state.repeat
        };
        inner.callbacks.emit(|cb| cb.on_queue_changed(tracks.clone()));

        if tracks.is_empty() {
            inner.callbacks.emit(|cb| {
                cb.on_song_changed(None);
                cb.on_status_changed(TransportState::Idle);
            });
            return Ok(());
        }

        let Some(endpoints) = inner.server_address.endpoints() else {
            warn!("Media server address not published, cannot load remote queue");
            inner.report_load_failure();
            return Err(PlaybackError::MissingServerAddress);
        };

        let request = QueueLoadRequest {
            items: tracks
                .iter()
                .map(|track| queue_item(track, &endpoints))
                .collect(),
            start_index,
            start_position_ms,
            repeat_mode,
            autoplay,
        };

        info!(
            session_id = %inner.session_id,
            server = %redact_address(endpoints.base()),
            tracks = tracks.len(),
            start_index,
            start_position_ms,
            "Loading queue on remote renderer"
        );
        inner
            .callbacks
            .emit(|cb| cb.on_status_changed(TransportState::Loading));

        let outcome =
            match tokio::time::timeout(inner.load_timeout, inner.client.queue_load(request)).await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(PlaybackError::from(err)),
                Err(_) => Err(PlaybackError::LoadTimeout(inner.load_timeout)),
            };

        match outcome {
            Ok(()) => {
                let current = tracks.get(start_index).cloned();
                inner.state.lock().current = current.clone();
                inner.callbacks.emit(|cb| cb.on_song_changed(current));
                // The acknowledgement usually comes with a fresh status.
                inner.apply_status();
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Remote queue load failed");
                inner.report_load_failure();
                Err(err)
            }
        }
    }

    async fn apply_repeat(&self, mode: RemoteRepeatMode) {
        let inner = &self.inner;
        if let Err(err) = inner.client.set_repeat_mode(mode).await {
            warn!(error = %err, ?mode, "Failed to change remote repeat mode");
            return;
        }
        inner.update_repeat(mode);
    }
}

impl RemoteInner {
    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn report_load_failure(&self) {
        self.state.lock().current = None;
        self.callbacks.emit(|cb| {
            cb.on_status_changed(TransportState::Error);
            cb.on_song_changed(None);
        });
    }

    /// Record a new renderer mode and report what changed locally.
    fn update_repeat(&self, mode: RemoteRepeatMode) {
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.repeat, mode)
        };
        self.emit_mode_changes(previous, mode);
    }

    fn emit_mode_changes(&self, previous: RemoteRepeatMode, mode: RemoteRepeatMode) {
        let (old_repeat, old_shuffle) = local_modes(previous);
        let (repeat, shuffle) = local_modes(mode);
        self.callbacks.emit(|cb| {
            if repeat != old_repeat {
                cb.on_repeat_mode_changed(repeat);
            }
            if shuffle != old_shuffle {
                cb.on_shuffle_mode_changed(shuffle);
            }
        });
    }

    fn apply_status(&self) {
        if self.is_released() {
            return;
        }
        let Some(status) = self.client.media_status() else {
            return;
        };
        let transport = transport_for(&status);
        let playing = self.client.is_playing();

        let mut song_change = None;
        let mut transport_change = None;
        let mut playing_change = None;
        let mut duration_change = None;
        let mut completed = false;
        let previous_repeat;
        {
            let mut state = self.state.lock();

            if let Some(track) = resolve_current(&state.tracks, &status) {
                let changed = state.current.as_ref().map(|t| &t.id) != track.as_ref().map(|t| &t.id);
                if changed {
                    state.current = track.clone();
                    song_change = Some(track);
                }
            }

            if state.last_transport != Some(transport) {
                state.last_transport = Some(transport);
                transport_change = Some(transport);
            }

            match transport {
                TransportState::Ended if !state.completion_reported => {
                    state.completion_reported = true;
                    completed = true;
                }
                TransportState::Playing | TransportState::Loading => {
                    state.completion_reported = false;
                }
                _ => {}
            }

            if state.last_playing != Some(playing) {
                state.last_playing = Some(playing);
                playing_change = Some(playing);
            }

            if let Some(duration) = status.stream_duration_ms.filter(|d| *d > 0) {
                if state.last_duration != Some(duration) {
                    state.last_duration = Some(duration);
                    duration_change = Some(duration);
                }
            }

            previous_repeat = std::mem::replace(&mut state.repeat, status.repeat_mode);
        }

        self.callbacks.emit(|cb| {
            if let Some(track) = song_change {
                cb.on_song_changed(track);
            }
            if let Some(duration) = duration_change {
                cb.on_duration_changed(duration);
            }
            if let Some(playing) = playing_change {
                cb.on_is_playing_changed(playing);
            }
            if let Some(transport) = transport_change {
                cb.on_status_changed(transport);
            }
            if completed {
                cb.on_completion();
            }
        });
        self.emit_mode_changes(previous_repeat, status.repeat_mode);
    }

    fn apply_progress(&self, progress_ms: u64, duration_ms: u64) {
        if self.is_released() {
            return;
        }
        let duration_change = {
            let mut state = self.state.lock();
            if duration_ms > 0 && state.last_duration != Some(duration_ms) {
                state.last_duration = Some(duration_ms);
                Some(duration_ms)
            } else {
                None
            }
        };
        self.callbacks.emit(|cb| {
            if let Some(duration) = duration_change {
                cb.on_duration_changed(duration);
            }
            cb.on_position_changed(progress_ms);
        });
    }
}

struct StatusListener {
    inner: Weak<RemoteInner>,
}

impl RemoteMediaListener for StatusListener {
    fn on_status_updated(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.apply_status();
        }
    }

    fn on_queue_status_updated(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.apply_status();
        }
    }

    fn on_progress_updated(&self, progress_ms: u64, duration_ms: u64) {
        if let Some(inner) = self.inner.upgrade() {
            inner.apply_progress(progress_ms, duration_ms);
        }
    }
}

#[async_trait]
impl PlaybackBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn is_playing(&self) -> bool {
        self.inner.client.is_playing()
    }

    fn current_track(&self) -> Option<Track> {
        self.inner.state.lock().current.clone()
    }

    fn current_queue(&self) -> Vec<Track> {
        self.inner.state.lock().tracks.clone()
    }

    fn repeat_mode(&self) -> RepeatMode {
        local_modes(self.inner.state.lock().repeat).0
    }

    fn is_shuffle_enabled(&self) -> bool {
        local_modes(self.inner.state.lock().repeat).1
    }

    async fn play_queue(&self, tracks: Vec<Track>, start_track: Option<Track>) {
        // Failures are already reported through the callbacks.
        let _ = self.load_queue(tracks, start_track.as_ref(), 0, true).await;
    }

    async fn start(&self) -> bool {
        if let Err(err) = self.inner.client.play().await {
            warn!(error = %err, "Remote play failed");
        }
        true
    }

    async fn pause(&self) -> bool {
        if let Err(err) = self.inner.client.pause().await {
            warn!(error = %err, "Remote pause failed");
        }
        true
    }

    async fn stop(&self) {
        if let Err(err) = self.inner.client.stop().await {
            warn!(error = %err, "Remote stop failed");
        }
    }

    async fn seek(&self, position_ms: u64) {
        if let Err(err) = self
            .inner
            .client
            .seek(position_ms, ResumeState::Unchanged)
            .await
        {
            warn!(error = %err, position_ms, "Remote seek failed");
        }
    }

    async fn next(&self) {
        if let Err(err) = self.inner.client.queue_next().await {
            warn!(error = %err, "Remote skip forward failed");
        }
    }

    async fn previous(&self) {
        if let Err(err) = self.inner.client.queue_prev().await {
            warn!(error = %err, "Remote skip backward failed");
        }
    }

    async fn toggle_shuffle(&self) {
        let target = match self.inner.state.lock().repeat {
            RemoteRepeatMode::AllAndShuffle => RemoteRepeatMode::Off,
            _ => RemoteRepeatMode::AllAndShuffle,
        };
        self.apply_repeat(target).await;
    }

    async fn cycle_repeat_mode(&self) {
        let target = match self.inner.state.lock().repeat {
            RemoteRepeatMode::Off => RemoteRepeatMode::All,
            RemoteRepeatMode::All => RemoteRepeatMode::Single,
            RemoteRepeatMode::Single => RemoteRepeatMode::Off,
            RemoteRepeatMode::AllAndShuffle => RemoteRepeatMode::Single,
        };
        self.apply_repeat(target).await;
    }

    fn duration(&self) -> u64 {
        self.inner.client.stream_duration_ms().unwrap_or(0)
    }

    fn position(&self) -> u64 {
        self.inner.client.approximate_position_ms()
    }

    async fn release(&self) {
        let inner = &self.inner;
        if inner.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(id) = inner.listener_id.lock().take() {
            inner.client.unregister_listener(id);
        }
        inner.callbacks.take();
        info!(session_id = %inner.session_id, "Remote backend released");
    }

    fn set_callbacks(&self, callbacks: Option<Arc<dyn PlaybackCallbacks>>) {
        self.inner.callbacks.set(callbacks);
    }

    fn take_callbacks(&self) -> Option<Arc<dyn PlaybackCallbacks>> {
        self.inner.callbacks.take()
    }
}
