//! Play queue with repeat and shuffle.
//!
//! The queue keeps tracks in their natural order and a separate play order
//! (a permutation of indices). Shuffling permutes the play order only, so
//! turning shuffle off restores the natural order around the current track.

use crate::track::Track;
use crate::types::RepeatMode;
use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, Default)]
pub struct PlayQueue {
    tracks: Vec<Track>,
    /// Indices into `tracks`, in play order.
    order: Vec<usize>,
    /// Position inside `order`.
    cursor: Option<usize>,
    repeat: RepeatMode,
    shuffle: bool,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents and make `start_id` current.
    ///
    /// Falls back to the first track when `start_id` is absent or not found.
    /// Returns the new current track.
    pub fn replace(&mut self, tracks: Vec<Track>, start_id: Option<&str>) -> Option<&Track> {
        let start = start_id
            .and_then(|id| tracks.iter().position(|track| track.id == id))
            .unwrap_or(0);

        self.order = (0..tracks.len()).collect();
        self.tracks = tracks;
        self.cursor = if self.tracks.is_empty() {
            None
        } else {
            Some(start)
        };

        if self.shuffle {
            self.reshuffle(&mut rand::thread_rng());
        }
        self.current()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.order.clear();
        self.cursor = None;
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current(&self) -> Option<&Track> {
        self.cursor
            .and_then(|cursor| self.order.get(cursor))
            .and_then(|&index| self.tracks.get(index))
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat = mode;
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    /// Enable or disable shuffle, keeping the current track current.
    pub fn set_shuffle(&mut self, enabled: bool) {
        self.set_shuffle_with(enabled, &mut rand::thread_rng());
    }

    pub fn set_shuffle_with<R: Rng + ?Sized>(&mut self, enabled: bool, rng: &mut R) {
        if enabled == self.shuffle {
            return;
        }
        self.shuffle = enabled;
        if enabled {
            self.reshuffle(rng);
        } else {
            let current = self.cursor.and_then(|cursor| self.order.get(cursor).copied());
            self.order = (0..self.tracks.len()).collect();
            self.cursor = current;
        }
    }

    /// Tracks in natural order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Tracks in the order they will play.
    pub fn tracks_in_play_order(&self) -> Vec<Track> {
        self.order
            .iter()
            .filter_map(|&index| self.tracks.get(index).cloned())
            .collect()
    }

    /// The track completion would move to, without moving.
    pub fn peek_next(&self) -> Option<&Track> {
        let cursor = self.completion_target()?;
        self.order.get(cursor).and_then(|&index| self.tracks.get(index))
    }

    /// Move on after the current track finished. `None` at the end of the queue.
    pub fn advance_on_completion(&mut self) -> Option<&Track> {
        let target = self.completion_target()?;
        self.cursor = Some(target);
        self.current()
    }

    /// Manual skip forward. Stays put at the end unless repeat-all is on.
    pub fn next(&mut self) -> Option<&Track> {
        let cursor = self.cursor?;
        if cursor + 1 < self.order.len() {
            self.cursor = Some(cursor + 1);
        } else if self.repeat == RepeatMode::All {
            self.cursor = Some(0);
        }
        self.current()
    }

    /// Manual skip backward. Stays put at the start unless repeat-all is on.
    pub fn previous(&mut self) -> Option<&Track> {
        let cursor = self.cursor?;
        if cursor > 0 {
            self.cursor = Some(cursor - 1);
        } else if self.repeat == RepeatMode::All && !self.order.is_empty() {
            self.cursor = Some(self.order.len() - 1);
        }
        self.current()
    }

    fn completion_target(&self) -> Option<usize> {
        let cursor = self.cursor?;
        match self.repeat {
            RepeatMode::One => Some(cursor),
            _ if cursor + 1 < self.order.len() => Some(cursor + 1),
            RepeatMode::All => Some(0),
            RepeatMode::Off => None,
        }
    }

    /// Shuffle the play order and put the current track first.
    fn reshuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let current = self.cursor.and_then(|cursor| self.order.get(cursor).copied());
        self.order = (0..self.tracks.len()).collect();
        self.order.shuffle(rng);
        if let Some(current) = current {
            if let Some(position) = self.order.iter().position(|&index| index == current) {
                self.order.swap(0, position);
            }
            self.cursor = Some(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tracks(ids: &[&str]) -> Vec<Track> {
        ids.iter()
            .map(|id| Track::new(*id, format!("Song {id}"), format!("/music/{id}.mp3")))
            .collect()
    }

    fn current_id(queue: &PlayQueue) -> Option<&str> {
        queue.current().map(|track| track.id.as_str())
    }

    #[test]
    fn replace_starts_at_requested_track() {
        let mut queue = PlayQueue::new();
        queue.replace(tracks(&["a", "b", "c"]), Some("b"));
        assert_eq!(current_id(&queue), Some("b"));
    }

    #[test]
    fn replace_falls_back_to_first_track() {
        let mut queue = PlayQueue::new();
        queue.replace(tracks(&["a", "b"]), Some("zzz"));
        assert_eq!(current_id(&queue), Some("a"));

        queue.replace(Vec::new(), None);
        assert!(queue.current().is_none());
    }

    #[test]
    fn completion_stops_at_end_without_repeat() {
        let mut queue = PlayQueue::new();
        queue.replace(tracks(&["a", "b"]), Some("b"));
        assert!(queue.peek_next().is_none());
        assert!(queue.advance_on_completion().is_none());
        assert_eq!(current_id(&queue), Some("b"));
    }

    #[test]
    fn completion_wraps_with_repeat_all() {
        let mut queue = PlayQueue::new();
        queue.set_repeat_mode(RepeatMode::All);
        queue.replace(tracks(&["a", "b"]), Some("b"));
        assert_eq!(queue.peek_next().map(|t| t.id.as_str()), Some("a"));
        assert_eq!(queue.advance_on_completion().map(|t| t.id.as_str()), Some("a"));
    }

    #[test]
    fn completion_replays_with_repeat_one() {
        let mut queue = PlayQueue::new();
        queue.set_repeat_mode(RepeatMode::One);
        queue.replace(tracks(&["a", "b"]), Some("a"));
        assert_eq!(queue.advance_on_completion().map(|t| t.id.as_str()), Some("a"));

        // Manual skips still move with repeat-one.
        assert_eq!(queue.next().map(|t| t.id.as_str()), Some("b"));
    }

    #[test]
    fn manual_navigation_respects_boundaries() {
        let mut queue = PlayQueue::new();
        queue.replace(tracks(&["a", "b"]), None);
        queue.previous();
        assert_eq!(current_id(&queue), Some("a"));
        queue.next();
        queue.next();
        assert_eq!(current_id(&queue), Some("b"));

        queue.set_repeat_mode(RepeatMode::All);
        queue.next();
        assert_eq!(current_id(&queue), Some("a"));
        queue.previous();
        assert_eq!(current_id(&queue), Some("b"));
    }

    #[test]
    fn shuffle_keeps_current_first_and_restores_order() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut queue = PlayQueue::new();
        queue.replace(tracks(&["a", "b", "c", "d", "e"]), Some("c"));

        queue.set_shuffle_with(true, &mut rng);
        let shuffled = queue.tracks_in_play_order();
        assert_eq!(shuffled[0].id, "c");
        assert_eq!(shuffled.len(), 5);
        let mut ids: Vec<_> = shuffled.iter().map(|t| t.id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);

        queue.set_shuffle_with(false, &mut rng);
        assert_eq!(current_id(&queue), Some("c"));
        assert_eq!(queue.peek_next().map(|t| t.id.as_str()), Some("d"));
    }
}
