//! Shared helpers for backend integration tests.

#![allow(dead_code)]

use core_playback::{PlaybackCallbacks, RepeatMode, Track, TransportState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// One observed callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Song(Option<String>),
    IsPlaying(bool),
    Shuffle(bool),
    Repeat(RepeatMode),
    Position(u64),
    Duration(u64),
    Queue(Vec<String>),
    Completion,
    Status(TransportState),
}

/// Callback sink that remembers everything it was told.
#[derive(Default)]
pub struct RecordingCallbacks {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingCallbacks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn contains(&self, event: &Recorded) -> bool {
        self.events.lock().contains(event)
    }

    pub fn count(&self, event: &Recorded) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    /// Last song reported; outer `None` when no song was ever reported.
    pub fn last_song(&self) -> Option<Option<String>> {
        self.events.lock().iter().rev().find_map(|e| match e {
            Recorded::Song(song) => Some(song.clone()),
            _ => None,
        })
    }

    pub fn statuses(&self) -> Vec<TransportState> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Status(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    pub fn positions(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Position(position) => Some(*position),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Recorded) {
        self.events.lock().push(event);
    }
}

impl PlaybackCallbacks for RecordingCallbacks {
    fn on_song_changed(&self, track: Option<Track>) {
        self.push(Recorded::Song(track.map(|t| t.id)));
    }

    fn on_is_playing_changed(&self, playing: bool) {
        self.push(Recorded::IsPlaying(playing));
    }

    fn on_shuffle_mode_changed(&self, enabled: bool) {
        self.push(Recorded::Shuffle(enabled));
    }

    fn on_repeat_mode_changed(&self, mode: RepeatMode) {
        self.push(Recorded::Repeat(mode));
    }

    fn on_position_changed(&self, position_ms: u64) {
        self.push(Recorded::Position(position_ms));
    }

    fn on_duration_changed(&self, duration_ms: u64) {
        self.push(Recorded::Duration(duration_ms));
    }

    fn on_queue_changed(&self, queue: Vec<Track>) {
        self.push(Recorded::Queue(queue.into_iter().map(|t| t.id).collect()));
    }

    fn on_completion(&self) {
        self.push(Recorded::Completion);
    }

    fn on_status_changed(&self, state: TransportState) {
        self.push(Recorded::Status(state));
    }
}

pub fn track(id: &str) -> Track {
    Track::new(id, format!("Song {id}"), format!("/music/{id}.mp3"))
        .with_artist("Artist")
        .with_album("Album")
        .with_duration_ms(180_000)
}

pub fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter().map(|id| track(id)).collect()
}

pub fn ids(queue: &[Track]) -> Vec<String> {
    queue.iter().map(|t| t.id.clone()).collect()
}

/// Let spawned tasks run. Under paused time this also advances the clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}
