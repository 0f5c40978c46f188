//! End-to-end hand-offs between the local engines and a cast renderer.

use bridge_traits::testing::{
    FakeMediaClient, FakeMediaServer, FakePipeline, FakeSession, FakeSessionManager,
    LoadBehavior, RemoteCommand, FIRST_ITEM_ID,
};
use bridge_traits::{
    MediaServerControl, RenderEvent, RenderPipeline, ResumeState, ServerAddress,
};
use core_playback::{BackendKind, PlaybackCallbacks, RepeatMode, Track};
use core_runtime::config::CoreConfig;
use core_runtime::events::{
    CoreEvent, EventSeverity, EventStream, HandoffDirection, HandoffEvent, SessionEvent,
};
use core_service::{CoreService, HandoffError};
use mockall::mock;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const SERVER: &str = "http://10.0.0.5:8080";

mock! {
    Server {}

    impl MediaServerControl for Server {
        fn request_start(&self);
    }
}

#[derive(Default)]
struct Ui {
    songs: Mutex<Vec<Option<String>>>,
    positions: Mutex<Vec<u64>>,
    playing: Mutex<Vec<bool>>,
}

impl Ui {
    fn last_song(&self) -> Option<Option<String>> {
        self.songs.lock().last().cloned()
    }
}

impl PlaybackCallbacks for Ui {
    fn on_song_changed(&self, track: Option<Track>) {
        self.songs.lock().push(track.map(|t| t.id));
    }

    fn on_position_changed(&self, position_ms: u64) {
        self.positions.lock().push(position_ms);
    }

    fn on_is_playing_changed(&self, playing: bool) {
        self.playing.lock().push(playing);
    }
}

struct Harness {
    core: CoreService,
    primary: Arc<FakePipeline>,
    sessions: Arc<FakeSessionManager>,
    ui: Arc<Ui>,
    events: EventStream,
}

fn harness_with(server: Arc<dyn MediaServerControl>, address: ServerAddress) -> Harness {
    let primary = FakePipeline::new("primary");
    let staging = FakePipeline::new("staging");
    let sessions = FakeSessionManager::new();
    let config = CoreConfig::builder()
        .primary_pipeline(primary.clone())
        .staging_pipeline(staging)
        .session_manager(sessions.clone())
        .media_server(server)
        .server_address(address)
        .build()
        .unwrap();

    let core = CoreService::new(config).unwrap();
    let ui = Arc::new(Ui::default());
    core.set_callbacks(Some(ui.clone()));
    let events = core.subscribe_events();
    Harness {
        core,
        primary,
        sessions,
        ui,
        events,
    }
}

/// Media server that publishes on the first start request.
fn harness() -> (Harness, Arc<FakeMediaServer>) {
    let address = ServerAddress::new();
    let server = FakeMediaServer::publishing(address.clone(), SERVER);
    (harness_with(server.clone(), address), server)
}

fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter()
        .map(|id| {
            Track::new(*id, format!("Song {id}"), format!("/music/{id}.mp3"))
                .with_duration_ms(180_000)
        })
        .collect()
}

/// Next hand-off outcome on the bus: `Ok` for completed, `Err` for aborted.
async fn handoff_outcome(events: &mut EventStream) -> Result<HandoffEvent, HandoffEvent> {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(60), events.recv())
            .await
            .expect("no hand-off outcome")
            .expect("event bus closed");
        match event {
            CoreEvent::Handoff(done @ HandoffEvent::Completed { .. }) => return Ok(done),
            CoreEvent::Handoff(aborted @ HandoffEvent::Aborted { .. }) => return Err(aborted),
            _ => continue,
        }
    }
}

async fn start_playing(h: &Harness, position_ms: u64) {
    h.core
        .backend()
        .play_queue(tracks(&["a", "b", "c"]), tracks(&["b"]).pop())
        .await;
    h.core.backend().seek(position_ms).await;
}

#[tokio::test(start_paused = true)]
async fn round_trip_preserves_queue_position_and_play_state() {
    let (mut h, server) = harness();
    start_playing(&h, 42_000).await;
    assert!(h.core.backend().is_playing());

    let session = FakeSession::new("living-room");
    let client = session.client();
    h.sessions.start_session(session.clone());

    let done = handoff_outcome(&mut h.events).await.unwrap();
    assert_eq!(
        done,
        HandoffEvent::Completed {
            direction: HandoffDirection::ToRemote,
            track_id: Some("b".into()),
            position_ms: 42_000,
            was_playing: true,
        }
    );
    assert_eq!(server.start_requests(), 1);

    let active = h.core.switcher().active();
    assert_eq!(active.kind, BackendKind::Remote);
    assert_eq!(active.session_id.as_deref(), Some("living-room"));
    assert!(!h.primary.is_playing(), "local engine stopped");

    let loads = client.loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].start_index, 1);
    assert_eq!(loads[0].start_position_ms, 42_000);
    assert!(loads[0].autoplay);
    assert_eq!(loads[0].items[1].media.content_url, format!("{SERVER}/song/b"));
    assert!(
        client.commands().is_empty(),
        "renderer honoured the load, nothing to correct"
    );
    assert_eq!(h.ui.last_song(), Some(Some("b".into())));

    h.sessions.end_session();
    let done = handoff_outcome(&mut h.events).await.unwrap();
    assert_eq!(
        done,
        HandoffEvent::Completed {
            direction: HandoffDirection::ToLocal,
            track_id: Some("b".into()),
            position_ms: 42_000,
            was_playing: true,
        }
    );

    assert_eq!(h.core.switcher().active_kind(), BackendKind::Local);
    assert_eq!(h.primary.loaded_id().as_deref(), Some("b"));
    assert_eq!(h.primary.position_ms(), 42_000);
    assert!(h.primary.is_playing());
    assert_eq!(client.listener_count(), 0, "remote backend released");
    assert_eq!(
        h.core
            .backend()
            .current_queue()
            .iter()
            .map(|t| t.id.as_str())
            .collect::<Vec<_>>(),
        vec!["a", "b", "c"]
    );
}

#[tokio::test(start_paused = true)]
async fn paused_playback_stays_paused_across_hand_offs() {
    let (mut h, _server) = harness();
    start_playing(&h, 10_000).await;
    h.core.backend().pause().await;

    let session = FakeSession::new("kitchen");
    let client = session.client();
    h.sessions.start_session(session);
    handoff_outcome(&mut h.events).await.unwrap();

    // Loaded paused at the saved position: never audible from 0.
    let loads = client.loads();
    assert!(!loads[0].autoplay);
    assert_eq!(loads[0].start_position_ms, 10_000);
    assert!(!client.commands().contains(&RemoteCommand::Play));
    assert!(!h.core.backend().is_playing());

    h.ui.positions.lock().clear();
    h.sessions.end_session();
    handoff_outcome(&mut h.events).await.unwrap();

    assert!(!h.primary.is_playing());
    assert_eq!(h.primary.position_ms(), 10_000);
    assert!(h.ui.positions.lock().contains(&10_000));
}

#[tokio::test(start_paused = true)]
async fn duplicate_session_notifications_build_one_remote_backend() {
    let (mut h, _server) = harness();
    start_playing(&h, 0).await;

    let session = FakeSession::new("tv");
    let client = session.client();
    h.sessions.start_session(session.clone());
    h.sessions.start_session(session.clone());
    h.sessions.resume_session(session);

    handoff_outcome(&mut h.events).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(client.registration_count(), 1);
    assert_eq!(client.loads().len(), 1);
    assert_eq!(h.core.switcher().active_kind(), BackendKind::Remote);
}

#[tokio::test(start_paused = true)]
async fn server_that_never_starts_aborts_the_hand_off() {
    let mut server = MockServer::new();
    server.expect_request_start().times(1).return_const(());
    let mut h = harness_with(Arc::new(server), ServerAddress::new());
    let mut notifications = h
        .core
        .subscribe_events()
        .filter(|event| matches!(event, CoreEvent::Notification { .. }));
    start_playing(&h, 5_000).await;

    let session = FakeSession::new("tv");
    let client = session.client();
    h.sessions.start_session(session);

    let aborted = handoff_outcome(&mut h.events).await.unwrap_err();
    let HandoffEvent::Aborted { direction, reason } = aborted else {
        unreachable!();
    };
    assert_eq!(direction, HandoffDirection::ToRemote);
    assert_eq!(
        reason,
        HandoffError::ServerNotReady(Duration::from_secs(5)).to_string()
    );

    let notification = notifications.try_recv().unwrap().unwrap();
    assert_eq!(notification.severity(), EventSeverity::Warning);

    // Nothing changed on the device.
    assert_eq!(h.core.switcher().active_kind(), BackendKind::Local);
    assert!(h.primary.is_playing());
    assert_eq!(client.registration_count(), 0);

    // The UI sink is still attached to the local backend.
    h.primary.emit(RenderEvent::IsPlayingChanged(false));
    assert_eq!(h.ui.playing.lock().last(), Some(&false));

    h.core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn session_without_media_channel_aborts() {
    let (mut h, _server) = harness();
    start_playing(&h, 0).await;

    let session = FakeSession::new("broken");
    session.disconnect();
    h.sessions.start_session(session);

    let aborted = handoff_outcome(&mut h.events).await.unwrap_err();
    assert!(matches!(
        aborted,
        HandoffEvent::Aborted {
            direction: HandoffDirection::ToRemote,
            ..
        }
    ));
    assert_eq!(h.core.switcher().active_kind(), BackendKind::Local);
    assert!(h.primary.is_playing());
}

#[tokio::test(start_paused = true)]
async fn commands_reach_only_the_active_backend() {
    let (mut h, _server) = harness();
    start_playing(&h, 0).await;

    let session = FakeSession::new("tv");
    let client = session.client();
    h.sessions.start_session(session);
    handoff_outcome(&mut h.events).await.unwrap();

    h.primary.clear_commands();
    h.core.backend().pause().await;
    h.core.backend().next().await;

    assert!(h.primary.commands().is_empty());
    let commands = client.commands();
    assert_eq!(
        &commands[commands.len() - 2..],
        &[RemoteCommand::Pause, RemoteCommand::Next]
    );
}

#[tokio::test(start_paused = true)]
async fn empty_queue_hands_off_without_loading() {
    let (mut h, _server) = harness();

    let session = FakeSession::new("tv");
    let client = session.client();
    h.sessions.start_session(session);
    let done = handoff_outcome(&mut h.events).await.unwrap();

    assert!(matches!(
        done,
        HandoffEvent::Completed { track_id: None, .. }
    ));
    assert_eq!(h.core.switcher().active_kind(), BackendKind::Remote);
    assert!(client.loads().is_empty());
}

#[tokio::test(start_paused = true)]
async fn session_events_are_published() {
    let (h, _server) = harness();
    let mut sessions = h
        .core
        .subscribe_events()
        .filter(|event| matches!(event, CoreEvent::Session(_)));

    h.sessions.start_session(FakeSession::new("tv"));
    let event = tokio::time::timeout(Duration::from_secs(10), sessions.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        CoreEvent::Session(SessionEvent::Started {
            session_id: "tv".into()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn session_connected_before_startup_is_picked_up() {
    let address = ServerAddress::new();
    address.publish(SERVER);
    let server = FakeMediaServer::silent(address.clone());

    let primary = FakePipeline::new("primary");
    let sessions = FakeSessionManager::new();
    let session = FakeSession::new("already-there");
    sessions.start_session(session.clone());

    let config = CoreConfig::builder()
        .primary_pipeline(primary)
        .staging_pipeline(FakePipeline::new("staging"))
        .session_manager(sessions)
        .media_server(server.clone())
        .server_address(address)
        .build()
        .unwrap();
    let core = CoreService::new(config).unwrap();

    let mut active = core.switcher().subscribe();
    tokio::time::timeout(
        Duration::from_secs(10),
        active.wait_for(|active| active.kind == BackendKind::Remote),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(server.start_requests(), 0, "address was already published");
    assert_eq!(session.client().registration_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_everything_once() {
    let (mut h, _server) = harness();
    start_playing(&h, 0).await;
    let session = FakeSession::new("tv");
    let client = session.client();
    h.sessions.start_session(session.clone());
    handoff_outcome(&mut h.events).await.unwrap();

    h.core.shutdown().await;
    h.core.shutdown().await;

    assert!(h.core.switcher().is_shut_down());
    assert_eq!(h.sessions.listener_count(), 0);
    assert_eq!(client.listener_count(), 0);
    assert!(h.primary.is_released());

    // Later notifications go nowhere.
    h.sessions.end_session();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.core.switcher().active_kind(), BackendKind::Remote);
}

#[tokio::test(start_paused = true)]
async fn renderer_that_ignores_the_start_is_corrected() {
    let (mut h, _server) = harness();
    start_playing(&h, 10_000).await;
    h.core.backend().pause().await;

    let client = FakeMediaClient::new();
    client.set_load_behavior(LoadBehavior::AcceptFromStart);
    h.sessions
        .start_session(FakeSession::with_client("old-tv", client.clone()));
    handoff_outcome(&mut h.events).await.unwrap();

    assert_eq!(
        client.commands(),
        vec![
            RemoteCommand::Seek(10_000, ResumeState::Unchanged),
            RemoteCommand::Pause,
        ]
    );
    assert!(!h.core.backend().is_playing());
}

#[tokio::test(start_paused = true)]
async fn new_session_supersedes_the_active_one() {
    let (mut h, _server) = harness();
    start_playing(&h, 30_000).await;

    let first = FakeSession::new("bedroom");
    let first_client = first.client();
    h.sessions.start_session(first);
    handoff_outcome(&mut h.events).await.unwrap();

    let second = FakeSession::new("office");
    let second_client = second.client();
    h.sessions.start_session(second);
    let done = handoff_outcome(&mut h.events).await.unwrap();
    assert!(matches!(
        done,
        HandoffEvent::Completed {
            direction: HandoffDirection::ToRemote,
            ..
        }
    ));

    let active = h.core.switcher().active();
    assert_eq!(active.kind, BackendKind::Remote);
    assert_eq!(active.session_id.as_deref(), Some("office"));
    assert_eq!(first_client.listener_count(), 0, "old renderer released");
    assert!(first_client.commands().contains(&RemoteCommand::Stop));

    let loads = second_client.loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].start_index, 1);
    assert_eq!(loads[0].start_position_ms, 30_000);
    assert_eq!(h.ui.last_song(), Some(Some("b".into())));

    // The new session ending brings playback home.
    h.sessions.end_session();
    let done = handoff_outcome(&mut h.events).await.unwrap();
    assert!(matches!(
        done,
        HandoffEvent::Completed {
            direction: HandoffDirection::ToLocal,
            ..
        }
    ));
    assert_eq!(h.core.switcher().active_kind(), BackendKind::Local);
    assert_eq!(h.primary.loaded_id().as_deref(), Some("b"));
}

#[tokio::test(start_paused = true)]
async fn unmapped_renderer_item_leaves_no_stale_local_track() {
    let (mut h, _server) = harness();
    h.core
        .backend()
        .play_queue(tracks(&["a", "b"]), None)
        .await;

    let session = FakeSession::new("tv");
    let client = session.client();
    h.sessions.start_session(session);
    handoff_outcome(&mut h.events).await.unwrap();

    client.set_current_item(FIRST_ITEM_ID + 999);
    client.notify_status();
    assert_eq!(h.core.backend().current_track(), None);

    h.sessions.end_session();
    let done = handoff_outcome(&mut h.events).await.unwrap();
    assert!(matches!(
        done,
        HandoffEvent::Completed { track_id: None, .. }
    ));

    let local = h.core.backend();
    assert_eq!(h.core.switcher().active_kind(), BackendKind::Local);
    assert_eq!(local.current_track(), None);
    assert!(local.current_queue().is_empty());
    assert!(!h.primary.is_playing());
    assert_eq!(h.ui.last_song(), Some(None));
}

#[tokio::test(start_paused = true)]
async fn modes_changed_while_casting_come_back_home() {
    let (mut h, _server) = harness();
    start_playing(&h, 0).await;

    h.sessions.start_session(FakeSession::new("tv"));
    handoff_outcome(&mut h.events).await.unwrap();

    // Off -> All, then shuffle on top of it.
    h.core.backend().cycle_repeat_mode().await;
    h.core.backend().toggle_shuffle().await;
    assert!(h.core.backend().is_shuffle_enabled());

    h.sessions.end_session();
    handoff_outcome(&mut h.events).await.unwrap();

    let local = h.core.backend();
    assert_eq!(h.core.switcher().active_kind(), BackendKind::Local);
    assert_eq!(local.repeat_mode(), RepeatMode::All);
    assert!(local.is_shuffle_enabled());
    assert_eq!(local.current_track().map(|t| t.id), Some("b".into()));
}
