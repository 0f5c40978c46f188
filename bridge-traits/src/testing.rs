//! In-memory bridges for tests.
//!
//! None of these fakes emit notifications on their own. Tests drive events
//! explicitly (`emit`, `finish`, `notify_status`...) so that assertions never
//! race a background thread.

use crate::cast::{
    IdleReason, ListenerId, MediaStatus, QueueLoadRequest, RemoteMediaClient, RemoteMediaListener,
    RemotePlayerState, RemoteQueueEntry, RemoteRepeatMode, RemoteSession, ResumeState,
    SessionLifecycleListener, SessionManager,
};
use crate::error::{BridgeError, Result};
use crate::media_server::{MediaServerControl, ServerAddress};
use crate::render::{EngineState, MediaItem, RenderEvent, RenderListener, RenderPipeline};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Render pipeline
// ============================================================================

/// Command received by a [`FakePipeline`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineCommand {
    Load(String),
    Prepare,
    Play,
    Pause,
    Stop,
    Clear,
    Seek(u64),
    Release,
}

struct PipelineState {
    item: Option<MediaItem>,
    engine_state: EngineState,
    playing: bool,
    volume: f32,
    position_ms: u64,
    duration_ms: Option<u64>,
    volume_log: Vec<(Instant, f32)>,
    commands: Vec<PipelineCommand>,
    released: bool,
}

/// Render pipeline that only records what it is told.
pub struct FakePipeline {
    name: String,
    state: Mutex<PipelineState>,
    listener: Mutex<Option<Arc<dyn RenderListener>>>,
}

impl FakePipeline {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(PipelineState {
                item: None,
                engine_state: EngineState::Idle,
                playing: false,
                volume: 1.0,
                position_ms: 0,
                duration_ms: None,
                volume_log: Vec::new(),
                commands: Vec::new(),
                released: false,
            }),
            listener: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver an event to the installed listener, as the engine thread would.
    pub fn emit(&self, event: RenderEvent) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener.on_render_event(event);
        }
    }

    /// Play the loaded item to its end and report it.
    pub fn finish(&self) {
        {
            let mut state = self.state.lock();
            state.engine_state = EngineState::Ended;
            state.playing = false;
            if let Some(duration) = state.duration_ms {
                state.position_ms = duration;
            }
        }
        self.emit(RenderEvent::IsPlayingChanged(false));
        self.emit(RenderEvent::StateChanged(EngineState::Ended));
    }

    pub fn set_position(&self, position_ms: u64) {
        self.state.lock().position_ms = position_ms;
    }

    pub fn set_duration(&self, duration_ms: Option<u64>) {
        self.state.lock().duration_ms = duration_ms;
    }

    pub fn loaded_id(&self) -> Option<String> {
        self.state.lock().item.as_ref().map(|item| item.media_id.clone())
    }

    pub fn loaded_item(&self) -> Option<MediaItem> {
        self.state.lock().item.clone()
    }

    pub fn commands(&self) -> Vec<PipelineCommand> {
        self.state.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Every volume set, with the (tokio) instant it was applied.
    pub fn volume_history(&self) -> Vec<(Instant, f32)> {
        self.state.lock().volume_log.clone()
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }
}

impl RenderPipeline for FakePipeline {
    fn load(&self, item: MediaItem) {
        let mut state = self.state.lock();
        state.commands.push(PipelineCommand::Load(item.media_id.clone()));
        state.item = Some(item);
        state.engine_state = EngineState::Idle;
        state.playing = false;
        state.position_ms = 0;
    }

    fn prepare(&self) {
        let mut state = self.state.lock();
        state.commands.push(PipelineCommand::Prepare);
        if state.item.is_some() {
            state.engine_state = EngineState::Ready;
        }
    }

    fn play(&self) {
        let mut state = self.state.lock();
        state.commands.push(PipelineCommand::Play);
        if state.item.is_some() {
            state.playing = true;
        }
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        state.commands.push(PipelineCommand::Pause);
        state.playing = false;
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.commands.push(PipelineCommand::Stop);
        state.playing = false;
        state.engine_state = EngineState::Idle;
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.commands.push(PipelineCommand::Clear);
        state.item = None;
        state.playing = false;
        state.engine_state = EngineState::Idle;
        state.position_ms = 0;
    }

    fn seek(&self, position_ms: u64) {
        let mut state = self.state.lock();
        state.commands.push(PipelineCommand::Seek(position_ms));
        state.position_ms = match state.duration_ms {
            Some(duration) => position_ms.min(duration),
            None => position_ms,
        };
    }

    fn set_volume(&self, volume: f32) {
        let mut state = self.state.lock();
        state.volume = volume;
        state.volume_log.push((Instant::now(), volume));
    }

    fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    fn has_item(&self) -> bool {
        self.state.lock().item.is_some()
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn position_ms(&self) -> u64 {
        self.state.lock().position_ms
    }

    fn duration_ms(&self) -> Option<u64> {
        self.state.lock().duration_ms
    }

    fn state(&self) -> EngineState {
        self.state.lock().engine_state
    }

    fn set_listener(&self, listener: Option<Arc<dyn RenderListener>>) {
        *self.listener.lock() = listener;
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.commands.push(PipelineCommand::Release);
        state.released = true;
        state.playing = false;
        state.item = None;
    }
}

// ============================================================================
// Remote media client
// ============================================================================

/// Command received by a [`FakeMediaClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCommand {
    Play,
    Pause,
    Stop,
    Seek(u64, ResumeState),
    Next,
    Previous,
    SetRepeatMode(RemoteRepeatMode),
}

/// How a [`FakeMediaClient`] answers `queue_load`.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadBehavior {
    Accept,
    /// Accept, but start playing from 0 whatever the request asked for.
    AcceptFromStart,
    Reject { code: i32, message: String },
    /// Never answer.
    Hang,
}

/// Item ids handed out by the fake renderer start here.
pub const FIRST_ITEM_ID: i32 = 1000;

struct ClientState {
    status: Option<MediaStatus>,
    playing: bool,
    position_ms: u64,
    loads: Vec<QueueLoadRequest>,
    commands: Vec<RemoteCommand>,
    listeners: HashMap<ListenerId, Arc<dyn RemoteMediaListener>>,
    progress_interval: Option<Duration>,
    load_behavior: LoadBehavior,
}

/// Remote renderer that accepts queue loads in memory.
pub struct FakeMediaClient {
    state: Mutex<ClientState>,
    registrations: AtomicUsize,
}

impl FakeMediaClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ClientState {
                status: None,
                playing: false,
                position_ms: 0,
                loads: Vec::new(),
                commands: Vec::new(),
                listeners: HashMap::new(),
                progress_interval: None,
                load_behavior: LoadBehavior::Accept,
            }),
            registrations: AtomicUsize::new(0),
        })
    }

    pub fn set_load_behavior(&self, behavior: LoadBehavior) {
        self.state.lock().load_behavior = behavior;
    }

    pub fn set_status(&self, status: Option<MediaStatus>) {
        self.state.lock().status = status;
    }

    pub fn set_position(&self, position_ms: u64) {
        self.state.lock().position_ms = position_ms;
    }

    /// Move the renderer to `item_id` without notifying.
    pub fn set_current_item(&self, item_id: i32) {
        if let Some(status) = self.state.lock().status.as_mut() {
            status.current_item_id = Some(item_id);
        }
    }

    /// Report the end of the queue: idle with reason `Finished`.
    pub fn finish_queue(&self) {
        {
            let mut state = self.state.lock();
            state.playing = false;
            if let Some(status) = state.status.as_mut() {
                status.player_state = RemotePlayerState::Idle;
                status.idle_reason = Some(IdleReason::Finished);
            }
        }
        self.notify_status();
    }

    pub fn notify_status(&self) {
        for listener in self.listeners() {
            listener.on_status_updated();
        }
    }

    pub fn notify_queue_status(&self) {
        for listener in self.listeners() {
            listener.on_queue_status_updated();
        }
    }

    pub fn emit_progress(&self, progress_ms: u64, duration_ms: u64) {
        self.state.lock().position_ms = progress_ms;
        for listener in self.listeners() {
            listener.on_progress_updated(progress_ms, duration_ms);
        }
    }

    pub fn loads(&self) -> Vec<QueueLoadRequest> {
        self.state.lock().loads.clone()
    }

    pub fn commands(&self) -> Vec<RemoteCommand> {
        self.state.lock().commands.clone()
    }

    /// Listeners currently registered.
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Total `register_listener` calls over the client's lifetime.
    pub fn registration_count(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn progress_interval(&self) -> Option<Duration> {
        self.state.lock().progress_interval
    }

    fn listeners(&self) -> Vec<Arc<dyn RemoteMediaListener>> {
        self.state.lock().listeners.values().cloned().collect()
    }

    fn step_item(&self, forward: bool) {
        let mut state = self.state.lock();
        if let Some(status) = state.status.as_mut() {
            let Some(index) = status.current_item_id.and_then(|id| status.index_of(id)) else {
                return;
            };
            let next = if forward {
                index + 1
            } else {
                index.saturating_sub(1)
            };
            if let Some(entry) = status.items.get(next) {
                status.current_item_id = Some(entry.item_id);
            }
        }
        state.position_ms = 0;
    }
}

#[async_trait::async_trait]
impl RemoteMediaClient for FakeMediaClient {
    async fn queue_load(&self, request: QueueLoadRequest) -> Result<()> {
        let behavior = {
            let mut state = self.state.lock();
            state.loads.push(request.clone());
            state.load_behavior.clone()
        };

        match behavior {
            LoadBehavior::Accept | LoadBehavior::AcceptFromStart => {
                let (autoplay, position_ms) = if behavior == LoadBehavior::Accept {
                    (request.autoplay, request.start_position_ms)
                } else {
                    (true, 0)
                };
                let items: Vec<RemoteQueueEntry> = request
                    .items
                    .iter()
                    .enumerate()
                    .map(|(offset, item)| RemoteQueueEntry {
                        item_id: FIRST_ITEM_ID + offset as i32,
                        custom_data: item.custom_data.clone(),
                    })
                    .collect();
                let current = items.get(request.start_index).map(|entry| entry.item_id);
                let duration = request
                    .items
                    .get(request.start_index)
                    .map(|item| item.media.duration_ms);

                let mut state = self.state.lock();
                state.playing = autoplay;
                state.position_ms = position_ms;
                state.status = Some(MediaStatus {
                    player_state: if autoplay {
                        RemotePlayerState::Playing
                    } else {
                        RemotePlayerState::Paused
                    },
                    idle_reason: None,
                    current_item_id: current,
                    repeat_mode: request.repeat_mode,
                    stream_duration_ms: duration,
                    items,
                });
                Ok(())
            }
            LoadBehavior::Reject { code, message } => {
                Err(BridgeError::RequestRejected { code, message })
            }
            LoadBehavior::Hang => std::future::pending().await,
        }
    }

    async fn play(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.commands.push(RemoteCommand::Play);
        state.playing = true;
        if let Some(status) = state.status.as_mut() {
            status.player_state = RemotePlayerState::Playing;
            status.idle_reason = None;
        }
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.commands.push(RemoteCommand::Pause);
        state.playing = false;
        if let Some(status) = state.status.as_mut() {
            status.player_state = RemotePlayerState::Paused;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.commands.push(RemoteCommand::Stop);
        state.playing = false;
        if let Some(status) = state.status.as_mut() {
            status.player_state = RemotePlayerState::Idle;
            status.idle_reason = Some(IdleReason::Cancelled);
        }
        Ok(())
    }

    async fn seek(&self, position_ms: u64, resume: ResumeState) -> Result<()> {
        let mut state = self.state.lock();
        state.commands.push(RemoteCommand::Seek(position_ms, resume));
        state.position_ms = position_ms;
        match resume {
            ResumeState::Play => state.playing = true,
            ResumeState::Pause => state.playing = false,
            ResumeState::Unchanged => {}
        }
        Ok(())
    }

    async fn queue_next(&self) -> Result<()> {
        self.state.lock().commands.push(RemoteCommand::Next);
        self.step_item(true);
        Ok(())
    }

    async fn queue_prev(&self) -> Result<()> {
        self.state.lock().commands.push(RemoteCommand::Previous);
        self.step_item(false);
        Ok(())
    }

    async fn set_repeat_mode(&self, mode: RemoteRepeatMode) -> Result<()> {
        let mut state = self.state.lock();
        state.commands.push(RemoteCommand::SetRepeatMode(mode));
        if let Some(status) = state.status.as_mut() {
            status.repeat_mode = mode;
        }
        Ok(())
    }

    fn media_status(&self) -> Option<MediaStatus> {
        self.state.lock().status.clone()
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn approximate_position_ms(&self) -> u64 {
        self.state.lock().position_ms
    }

    fn stream_duration_ms(&self) -> Option<u64> {
        self.state
            .lock()
            .status
            .as_ref()
            .and_then(|status| status.stream_duration_ms)
    }

    fn register_listener(
        &self,
        listener: Arc<dyn RemoteMediaListener>,
        progress_interval: Duration,
    ) -> ListenerId {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        let id = ListenerId::new();
        let mut state = self.state.lock();
        state.listeners.insert(id, listener);
        state.progress_interval = Some(progress_interval);
        id
    }

    fn unregister_listener(&self, id: ListenerId) {
        self.state.lock().listeners.remove(&id);
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Remote session wrapping a [`FakeMediaClient`].
pub struct FakeSession {
    id: String,
    client: Arc<FakeMediaClient>,
    connected: Mutex<bool>,
}

impl FakeSession {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Self::with_client(id, FakeMediaClient::new())
    }

    pub fn with_client(id: impl Into<String>, client: Arc<FakeMediaClient>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            client,
            connected: Mutex::new(true),
        })
    }

    pub fn client(&self) -> Arc<FakeMediaClient> {
        Arc::clone(&self.client)
    }

    /// Drop the media channel; `media_client` returns `None` afterwards.
    pub fn disconnect(&self) {
        *self.connected.lock() = false;
    }
}

impl RemoteSession for FakeSession {
    fn session_id(&self) -> String {
        self.id.clone()
    }

    fn media_client(&self) -> Option<Arc<dyn RemoteMediaClient>> {
        if *self.connected.lock() {
            Some(self.client.clone() as Arc<dyn RemoteMediaClient>)
        } else {
            None
        }
    }
}

/// Session manager whose lifecycle is driven by the test.
pub struct FakeSessionManager {
    listeners: Mutex<HashMap<ListenerId, Arc<dyn SessionLifecycleListener>>>,
    current: Mutex<Option<Arc<FakeSession>>>,
}

impl FakeSessionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
        })
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn start_session(&self, session: Arc<FakeSession>) {
        *self.current.lock() = Some(Arc::clone(&session));
        for listener in self.snapshot() {
            listener.on_session_started(session.clone() as Arc<dyn RemoteSession>);
        }
    }

    pub fn resume_session(&self, session: Arc<FakeSession>) {
        *self.current.lock() = Some(Arc::clone(&session));
        for listener in self.snapshot() {
            listener.on_session_resumed(session.clone() as Arc<dyn RemoteSession>);
        }
    }

    /// End the current session, if any.
    pub fn end_session(&self) {
        let Some(session) = self.current.lock().take() else {
            return;
        };
        for listener in self.snapshot() {
            listener.on_session_ended(session.clone() as Arc<dyn RemoteSession>);
        }
    }

    pub fn suspend_session(&self) {
        let Some(session) = self.current.lock().clone() else {
            return;
        };
        for listener in self.snapshot() {
            listener.on_session_suspended(session.clone() as Arc<dyn RemoteSession>);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn SessionLifecycleListener>> {
        self.listeners.lock().values().cloned().collect()
    }
}

impl SessionManager for FakeSessionManager {
    fn add_listener(&self, listener: Arc<dyn SessionLifecycleListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.lock().insert(id, listener);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().remove(&id);
    }

    fn current_session(&self) -> Option<Arc<dyn RemoteSession>> {
        self.current
            .lock()
            .clone()
            .map(|session| session as Arc<dyn RemoteSession>)
    }
}

// ============================================================================
// Media server
// ============================================================================

/// Media server that publishes a fixed address when asked to start.
pub struct FakeMediaServer {
    address: ServerAddress,
    publish_on_start: Option<String>,
    start_requests: AtomicUsize,
}

impl FakeMediaServer {
    /// Server that publishes `base` on the first start request.
    pub fn publishing(address: ServerAddress, base: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            address,
            publish_on_start: Some(base.into()),
            start_requests: AtomicUsize::new(0),
        })
    }

    /// Server that never becomes ready.
    pub fn silent(address: ServerAddress) -> Arc<Self> {
        Arc::new(Self {
            address,
            publish_on_start: None,
            start_requests: AtomicUsize::new(0),
        })
    }

    pub fn start_requests(&self) -> usize {
        self.start_requests.load(Ordering::SeqCst)
    }
}

impl MediaServerControl for FakeMediaServer {
    fn request_start(&self) {
        self.start_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(base) = &self.publish_on_start {
            self.address.publish(base.clone());
        }
    }
}
