//! # Backend Switch Coordinator
//!
//! Decides where audio renders and moves playback between the device and a
//! cast renderer as sessions come and go.
//!
//! ## Hand-off
//!
//! Session lifecycle notifications arrive on the host's thread. They are
//! forwarded into an unbounded channel and applied in order by a pump task:
//! started/resumed sessions hand playback to the renderer, ended/suspended
//! sessions hand it back to the local engines.
//!
//! Every switch runs under one async mutex. A switch whose target is already
//! active does nothing, so duplicate notifications build one remote backend.
//! A different session superseding the active one gets playback handed over
//! from the old renderer.
//!
//! A switch carries the queue, the current track, the position and the play
//! state across, and moves the UI's callback sink to the new backend. If a
//! prerequisite fails (the media server never publishes an address, the
//! session has no media channel) the switch is aborted: the previous backend
//! stays active and the event bus reports why.
//!
//! ## Observation
//!
//! The active backend lives in a `watch` channel; hosts
//! [`subscribe`](PlaybackSwitcher::subscribe) to follow it.

use crate::error::{CoreError, HandoffError, Result};
use bridge_traits::{
    ListenerId, MediaServerControl, RemoteSession, ServerAddress, SessionLifecycleListener,
    SessionManager,
};
use core_playback::{
    BackendKind, BackendSnapshot, LocalBackend, PlaybackBackend, PlaybackCallbacks, RemoteBackend,
};
use core_runtime::config::PlaybackTimings;
use core_runtime::events::{
    CoreEvent, EventBus, EventSeverity, HandoffDirection, HandoffEvent, SessionEvent,
};
use core_runtime::logging::redact_address;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, MutexGuard};
use tokio_util::sync::CancellationToken;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Position drift a renderer may show after a load before it is corrected.
const START_TOLERANCE: Duration = Duration::from_secs(2);

/// The backend currently rendering.
#[derive(Clone)]
pub struct ActiveBackend {
    pub kind: BackendKind,
    pub backend: Arc<dyn PlaybackBackend>,
    /// Renderer session, for remote backends.
    pub session_id: Option<String>,
}

impl ActiveBackend {
    fn local(backend: Arc<dyn PlaybackBackend>) -> Self {
        Self {
            kind: BackendKind::Local,
            backend,
            session_id: None,
        }
    }
}

impl fmt::Debug for ActiveBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveBackend")
            .field("kind", &self.kind)
            .field("session_id", &self.session_id)
            .finish()
    }
}

// ============================================================================
// Session notifications
// ============================================================================

enum SessionSignal {
    Started(Arc<dyn RemoteSession>),
    Resumed(Arc<dyn RemoteSession>),
    Ended(Arc<dyn RemoteSession>),
    Suspended(Arc<dyn RemoteSession>),
}

/// Runs on the host's thread; only enqueues.
struct LifecycleForwarder {
    sender: mpsc::UnboundedSender<SessionSignal>,
}

impl LifecycleForwarder {
    fn forward(&self, signal: SessionSignal) {
        if self.sender.send(signal).is_err() {
            debug!("Switcher stopped, session notification dropped");
        }
    }
}

impl SessionLifecycleListener for LifecycleForwarder {
    fn on_session_started(&self, session: Arc<dyn RemoteSession>) {
        self.forward(SessionSignal::Started(session));
    }

    fn on_session_resumed(&self, session: Arc<dyn RemoteSession>) {
        self.forward(SessionSignal::Resumed(session));
    }

    fn on_session_ended(&self, session: Arc<dyn RemoteSession>) {
        self.forward(SessionSignal::Ended(session));
    }

    fn on_session_suspended(&self, session: Arc<dyn RemoteSession>) {
        self.forward(SessionSignal::Suspended(session));
    }
}

async fn pump(
    inner: Weak<SwitcherInner>,
    mut receiver: mpsc::UnboundedReceiver<SessionSignal>,
    shutdown: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            _ = shutdown.cancelled() => break,
            signal = receiver.recv() => match signal {
                Some(signal) => signal,
                None => break,
            },
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.apply(signal).await;
    }
    debug!("Session pump stopped");
}

// ============================================================================
// Switcher
// ============================================================================

/// Owns the active backend and performs hand-offs.
#[derive(Clone)]
pub struct PlaybackSwitcher {
    inner: Arc<SwitcherInner>,
}

struct SwitcherInner {
    local: LocalBackend,
    local_backend: Arc<dyn PlaybackBackend>,
    session_manager: Arc<dyn SessionManager>,
    media_server: Arc<dyn MediaServerControl>,
    server_address: ServerAddress,
    timings: PlaybackTimings,
    events: EventBus,
    active: watch::Sender<ActiveBackend>,
    switch_lock: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    listener_id: Mutex<Option<ListenerId>>,
    shut_down: AtomicBool,
}

impl PlaybackSwitcher {
    /// Start with the local backend active and follow `session_manager`.
    ///
    /// A session that is already connected is picked up as if it had just
    /// resumed. Must be called inside a Tokio runtime.
    pub fn new(
        local: LocalBackend,
        session_manager: Arc<dyn SessionManager>,
        media_server: Arc<dyn MediaServerControl>,
        server_address: ServerAddress,
        timings: PlaybackTimings,
        events: EventBus,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            CoreError::InitializationFailed(
                "PlaybackSwitcher must be started inside a Tokio runtime".into(),
            )
        })?;

        let local_backend: Arc<dyn PlaybackBackend> = Arc::new(local.clone());
        let (active, _) = watch::channel(ActiveBackend::local(Arc::clone(&local_backend)));
        let inner = Arc::new(SwitcherInner {
            local,
            local_backend,
            session_manager,
            media_server,
            server_address,
            timings,
            events,
            active,
            switch_lock: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            listener_id: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        });

        let (sender, receiver) = mpsc::unbounded_channel();
        if let Some(session) = inner.session_manager.current_session() {
            info!(session_id = %session.session_id(), "Renderer session already connected");
            let _ = sender.send(SessionSignal::Resumed(session));
        }
        let id = inner
            .session_manager
            .add_listener(Arc::new(LifecycleForwarder { sender }));
        *inner.listener_id.lock() = Some(id);

        runtime.spawn(pump(
            Arc::downgrade(&inner),
            receiver,
            inner.shutdown.clone(),
        ));

        Ok(Self { inner })
    }

    pub fn active(&self) -> ActiveBackend {
        self.inner.active.borrow().clone()
    }

    pub fn active_kind(&self) -> BackendKind {
        self.inner.active.borrow().kind
    }

    /// The backend commands should go to right now.
    pub fn backend(&self) -> Arc<dyn PlaybackBackend> {
        Arc::clone(&self.inner.active.borrow().backend)
    }

    /// Follow changes of the active backend.
    pub fn subscribe(&self) -> watch::Receiver<ActiveBackend> {
        self.inner.active.subscribe()
    }

    /// The device backend, whether active or not.
    pub fn local(&self) -> &LocalBackend {
        &self.inner.local
    }

    /// Install the UI sink on the active backend. It follows every hand-off.
    pub fn set_callbacks(&self, callbacks: Option<Arc<dyn PlaybackCallbacks>>) {
        self.backend().set_callbacks(callbacks);
    }

    /// Hand playback to `session`. Does nothing when that session's backend
    /// is already active.
    pub async fn switch_to_remote(&self, session: Arc<dyn RemoteSession>) -> Result<()> {
        self.inner.switch_to_remote(session).await
    }

    /// Hand playback back to the device. Does nothing when already local.
    pub async fn switch_to_local(&self) -> Result<()> {
        self.inner.switch_to_local().await
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Stop following sessions, cancel any pending wait and release the
    /// backends. Idempotent.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down playback switcher");
        inner.shutdown.cancel();
        if let Some(id) = inner.listener_id.lock().take() {
            inner.session_manager.remove_listener(id);
        }

        // Wait for an in-flight switch to observe the cancellation.
        let _guard = inner.switch_lock.lock().await;
        let active = inner.active.borrow().clone();
        active.backend.release().await;
        if active.kind != BackendKind::Local {
            inner.local_backend.release().await;
        }
    }
}

impl fmt::Debug for PlaybackSwitcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSwitcher")
            .field("active", &self.active())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl SwitcherInner {
    fn emit(&self, event: CoreEvent) {
        // No subscribers is fine.
        let _ = self.events.emit(event);
    }

    async fn apply(&self, signal: SessionSignal) {
        let (event, session) = match signal {
            SessionSignal::Started(session) => (
                SessionEvent::Started {
                    session_id: session.session_id(),
                },
                session,
            ),
            SessionSignal::Resumed(session) => (
                SessionEvent::Resumed {
                    session_id: session.session_id(),
                },
                session,
            ),
            SessionSignal::Ended(session) => (
                SessionEvent::Ended {
                    session_id: session.session_id(),
                },
                session,
            ),
            SessionSignal::Suspended(session) => (
                SessionEvent::Suspended {
                    session_id: session.session_id(),
                },
                session,
            ),
        };
        debug!(?event, "Session lifecycle");
        let to_remote = matches!(
            event,
            SessionEvent::Started { .. } | SessionEvent::Resumed { .. }
        );
        let session_id = event.session_id().to_string();
        self.emit(CoreEvent::Session(event));

        let result = if to_remote {
            self.switch_to_remote(session).await
        } else {
            let active_session = self.active.borrow().session_id.clone();
            if active_session.is_some_and(|active| active != session_id) {
                debug!(%session_id, "Ignoring end of a session that is not active");
                return;
            }
            self.switch_to_local().await
        };
        if let Err(err) = result {
            debug!(error = %err, "Session-driven switch did not complete");
        }
    }

    async fn lock_switch(&self) -> Result<MutexGuard<'_, ()>> {
        let guard = tokio::select! {
            guard = self.switch_lock.lock() => guard,
            _ = self.shutdown.cancelled() => return Err(HandoffError::Cancelled.into()),
        };
        if self.shutdown.is_cancelled() {
            return Err(HandoffError::Cancelled.into());
        }
        Ok(guard)
    }

    async fn switch_to_remote(&self, session: Arc<dyn RemoteSession>) -> Result<()> {
        let _guard = self.lock_switch().await?;
        let current = self.active.borrow().clone();
        let session_id = session.session_id();
        if current.session_id.as_deref() == Some(session_id.as_str()) {
            debug!(%session_id, "Remote backend already active");
            return Ok(());
        }

        info!(
            %session_id,
            superseded = ?current.session_id,
            "Handing playback off to remote renderer"
        );
        self.emit(CoreEvent::Handoff(HandoffEvent::Started {
            direction: HandoffDirection::ToRemote,
            session_id: Some(session_id.clone()),
        }));

        if let Err(err) = self.ensure_server_ready().await {
            return Err(self.abort(HandoffDirection::ToRemote, err));
        }

        let remote = RemoteBackend::new(session, self.server_address.clone(), &self.timings)
            .map_err(|err| {
                self.abort(
                    HandoffDirection::ToRemote,
                    HandoffError::RemoteUnavailable(err.to_string()),
                )
            })?;
        remote.set_initial_modes(
            current.backend.repeat_mode(),
            current.backend.is_shuffle_enabled(),
        );

        let snapshot = current.backend.snapshot();
        current.backend.stop().await;
        let callbacks = current.backend.take_callbacks();
        if current.kind == BackendKind::Remote {
            current.backend.release().await;
        }
        remote.set_callbacks(callbacks);

        self.active.send_replace(ActiveBackend {
            kind: BackendKind::Remote,
            backend: Arc::new(remote.clone()),
            session_id: Some(session_id),
        });

        self.replay_on_remote(&remote, &snapshot).await?;
        self.complete(HandoffDirection::ToRemote, &snapshot);
        Ok(())
    }

    async fn switch_to_local(&self) -> Result<()> {
        let _guard = self.lock_switch().await?;
        let current = self.active.borrow().clone();
        if current.kind == BackendKind::Local {
            debug!("Local backend already active");
            return Ok(());
        }

        info!(session_id = ?current.session_id, "Handing playback back to local engines");
        self.emit(CoreEvent::Handoff(HandoffEvent::Started {
            direction: HandoffDirection::ToLocal,
            session_id: current.session_id.clone(),
        }));

        let snapshot = current.backend.snapshot();
        let repeat = current.backend.repeat_mode();
        let shuffle = current.backend.is_shuffle_enabled();
        let callbacks = current.backend.take_callbacks();
        current.backend.release().await;

        self.local_backend.set_callbacks(callbacks.clone());
        self.active
            .send_replace(ActiveBackend::local(Arc::clone(&self.local_backend)));
        self.local.apply_modes(repeat, shuffle);

        self.replay_on_local(&snapshot, callbacks.as_deref()).await;
        self.complete(HandoffDirection::ToLocal, &snapshot);
        Ok(())
    }

    /// Ask the media server to start unless it already published an address.
    async fn ensure_server_ready(&self) -> std::result::Result<(), HandoffError> {
        if self.server_address.is_published() {
            return Ok(());
        }

        let timeout = self.timings.http_ready_timeout;
        info!(
            timeout_ms = timeout.as_millis() as u64,
            "Media server not ready, requesting start"
        );
        self.media_server.request_start();

        tokio::select! {
            published = self.server_address.wait_published(timeout) => match published {
                Some(address) => {
                    debug!(server = %redact_address(&address), "Media server ready");
                    Ok(())
                }
                None => Err(HandoffError::ServerNotReady(timeout)),
            },
            _ = self.shutdown.cancelled() => Err(HandoffError::Cancelled),
        }
    }

    /// Load `snapshot` on the renderer at its position and play state.
    ///
    /// After the settle delay, position and play state are corrected for
    /// renderers that ignore the start position or the autoplay flag.
    async fn replay_on_remote(
        &self,
        remote: &RemoteBackend,
        snapshot: &BackendSnapshot,
    ) -> Result<()> {
        if !snapshot.is_resumable() {
            debug!("Nothing queued, nothing to resume on the renderer");
            return Ok(());
        }

        let loaded = remote
            .load_queue(
                snapshot.queue.clone(),
                snapshot.current.as_ref(),
                snapshot.position_ms,
                snapshot.was_playing,
            )
            .await;
        if let Err(err) = loaded {
            // Already reported through the callbacks.
            warn!(error = %err, "Renderer did not take the queue");
            return Ok(());
        }

        let settle = self.timings.handoff_settle_delay;
        if !settle.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(settle) => {}
                _ = self.shutdown.cancelled() => {
                    return Err(
                        self.abort(HandoffDirection::ToRemote, HandoffError::Cancelled)
                    );
                }
            }
        }

        let tolerance_ms = START_TOLERANCE.saturating_add(settle).as_millis() as u64;
        let drift_ms = remote.position().abs_diff(snapshot.position_ms);
        if drift_ms > tolerance_ms {
            debug!(drift_ms, "Renderer ignored the start position, seeking");
            remote.seek(snapshot.position_ms).await;
        }
        match (snapshot.was_playing, remote.is_playing()) {
            (true, false) => {
                remote.start().await;
            }
            (false, true) => {
                remote.pause().await;
            }
            _ => {}
        }
        Ok(())
    }

    /// Resume `snapshot` on the device engines.
    ///
    /// Without a current track the local queue is cleared, so the UI shows
    /// nothing instead of the track playing before the cast.
    async fn replay_on_local(
        &self,
        snapshot: &BackendSnapshot,
        callbacks: Option<&dyn PlaybackCallbacks>,
    ) {
        let local = &self.local_backend;
        if !snapshot.is_resumable() {
            debug!("Renderer had no current track, clearing the local queue");
            local.play_queue(Vec::new(), None).await;
            return;
        }

        local
            .play_queue(snapshot.queue.clone(), snapshot.current.clone())
            .await;
        local.seek(snapshot.position_ms).await;
        if snapshot.was_playing {
            local.start().await;
        } else {
            local.pause().await;
            if let Some(callbacks) = callbacks {
                callbacks.on_position_changed(snapshot.position_ms);
            }
        }
    }

    fn complete(&self, direction: HandoffDirection, snapshot: &BackendSnapshot) {
        let track_id = snapshot.current.as_ref().map(|track| track.id.clone());
        info!(
            ?direction,
            track_id = ?track_id,
            position_ms = snapshot.position_ms,
            was_playing = snapshot.was_playing,
            "Hand-off completed"
        );
        self.emit(CoreEvent::Handoff(HandoffEvent::Completed {
            direction,
            track_id,
            position_ms: snapshot.position_ms,
            was_playing: snapshot.was_playing,
        }));
    }

    fn abort(&self, direction: HandoffDirection, err: HandoffError) -> CoreError {
        warn!(?direction, error = %err, "Hand-off aborted");
        self.emit(CoreEvent::Handoff(HandoffEvent::Aborted {
            direction,
            reason: err.to_string(),
        }));
        let message = match direction {
            HandoffDirection::ToRemote => format!("Could not start casting: {err}"),
            HandoffDirection::ToLocal => format!("Could not resume on this device: {err}"),
        };
        self.emit(CoreEvent::notification(message, EventSeverity::Warning));
        err.into()
    }
}
