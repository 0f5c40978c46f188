//! Remote renderer (cast) bridges.
//!
//! These traits model a cast-style session protocol: a session manager that
//! announces renderer sessions, and a per-session media client that accepts
//! queue loads and transport commands and pushes status updates back.
//!
//! Status and progress notifications are delivered on the protocol's own
//! thread. Listeners must not block it.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Combined repeat/shuffle mode of the remote queue.
///
/// The protocol has no separate shuffle flag; shuffle only exists combined
/// with repeat-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteRepeatMode {
    Off,
    All,
    Single,
    AllAndShuffle,
}

impl Default for RemoteRepeatMode {
    fn default() -> Self {
        Self::Off
    }
}

/// Player state reported by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemotePlayerState {
    Unknown,
    Idle,
    Loading,
    Buffering,
    Playing,
    Paused,
}

/// Why the renderer went idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    Finished,
    Cancelled,
    Interrupted,
    Error,
}

/// Play state to apply after a seek completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    Unchanged,
    Play,
    Pause,
}

/// Media description sent to the renderer. All locators are HTTP URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMediaInfo {
    pub content_url: String,
    pub content_type: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork_url: Option<String>,
    pub duration_ms: u64,
}

/// Queue entry sent with a queue load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteQueueItem {
    pub media: RemoteMediaInfo,
    /// Opaque JSON carried by the renderer and echoed back in status updates.
    pub custom_data: Option<serde_json::Value>,
}

/// Queue entry as reported by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteQueueEntry {
    /// Renderer-assigned item id, meaningless outside the session.
    pub item_id: i32,
    pub custom_data: Option<serde_json::Value>,
}

/// Snapshot of the renderer status.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaStatus {
    pub player_state: RemotePlayerState,
    pub idle_reason: Option<IdleReason>,
    pub current_item_id: Option<i32>,
    pub repeat_mode: RemoteRepeatMode,
    pub stream_duration_ms: Option<u64>,
    /// Queue in renderer order.
    pub items: Vec<RemoteQueueEntry>,
}

impl MediaStatus {
    pub fn idle(reason: Option<IdleReason>) -> Self {
        Self {
            player_state: RemotePlayerState::Idle,
            idle_reason: reason,
            current_item_id: None,
            repeat_mode: RemoteRepeatMode::Off,
            stream_duration_ms: None,
            items: Vec::new(),
        }
    }

    /// Position of `item_id` inside [`items`](Self::items).
    pub fn index_of(&self, item_id: i32) -> Option<usize> {
        self.items.iter().position(|entry| entry.item_id == item_id)
    }
}

/// Queue load request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueLoadRequest {
    pub items: Vec<RemoteQueueItem>,
    pub start_index: usize,
    pub start_position_ms: u64,
    pub repeat_mode: RemoteRepeatMode,
    pub autoplay: bool,
}

/// Handle returned by [`RemoteMediaClient::register_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for renderer notifications.
pub trait RemoteMediaListener: Send + Sync {
    /// Player state, current item, or repeat mode changed. Read the new
    /// values through [`RemoteMediaClient::media_status`].
    fn on_status_updated(&self);

    /// Queue contents or order changed.
    fn on_queue_status_updated(&self) {}

    /// Periodic progress at the interval requested on registration.
    fn on_progress_updated(&self, progress_ms: u64, duration_ms: u64);
}

/// Media channel of a remote session.
#[async_trait::async_trait]
pub trait RemoteMediaClient: Send + Sync {
    /// Load a queue. Resolves once the renderer accepted or rejected it.
    async fn queue_load(&self, request: QueueLoadRequest) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn seek(&self, position_ms: u64, resume: ResumeState) -> Result<()>;

    async fn queue_next(&self) -> Result<()>;

    async fn queue_prev(&self) -> Result<()>;

    async fn set_repeat_mode(&self, mode: RemoteRepeatMode) -> Result<()>;

    /// Last status received from the renderer.
    fn media_status(&self) -> Option<MediaStatus>;

    fn is_playing(&self) -> bool;

    /// Position extrapolated from the last status.
    fn approximate_position_ms(&self) -> u64;

    fn stream_duration_ms(&self) -> Option<u64>;

    fn register_listener(
        &self,
        listener: Arc<dyn RemoteMediaListener>,
        progress_interval: Duration,
    ) -> ListenerId;

    fn unregister_listener(&self, id: ListenerId);
}

/// A connected renderer session.
pub trait RemoteSession: Send + Sync {
    fn session_id(&self) -> String;

    /// Media channel, `None` when the session is not (or no longer) connected.
    fn media_client(&self) -> Option<Arc<dyn RemoteMediaClient>>;
}

/// Receiver for session lifecycle notifications.
pub trait SessionLifecycleListener: Send + Sync {
    fn on_session_started(&self, session: Arc<dyn RemoteSession>);
    fn on_session_resumed(&self, session: Arc<dyn RemoteSession>);
    fn on_session_ended(&self, session: Arc<dyn RemoteSession>);
    fn on_session_suspended(&self, session: Arc<dyn RemoteSession>);
}

/// Host session manager.
pub trait SessionManager: Send + Sync {
    fn add_listener(&self, listener: Arc<dyn SessionLifecycleListener>) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);

    /// Session currently connected, if any.
    fn current_session(&self) -> Option<Arc<dyn RemoteSession>>;
}
