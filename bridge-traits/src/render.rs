//! Render pipeline bridge.
//!
//! A render pipeline is one instance of the host's media engine (ExoPlayer,
//! AVPlayer, a desktop sink...). It decodes, buffers and outputs audio for a
//! single item at a time. The core never decodes audio itself; it drives two
//! of these pipelines to implement gapless and crossfaded transitions.
//!
//! Every method is fire-and-forget: the pipeline applies the command on its
//! own thread and reports the outcome through [`RenderListener`].

use std::sync::Arc;

/// Item handed to a render pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    /// Opaque identifier echoed back by the engine (the track id).
    pub media_id: String,
    /// Locator the engine can open (content URI, file path, URL).
    pub uri: String,
}

impl MediaItem {
    pub fn new(media_id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            uri: uri.into(),
        }
    }
}

/// Coarse engine state, mirroring what mobile media engines report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing loaded, stopped, or failed.
    Idle,
    /// Loading or rebuffering.
    Buffering,
    /// Able to play immediately from the current position.
    Ready,
    /// The loaded item played to its end.
    Ended,
}

/// Event raised by a render pipeline, possibly on a foreign thread.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    StateChanged(EngineState),
    IsPlayingChanged(bool),
    DurationKnown(u64),
    Error { message: String },
}

/// Receiver for pipeline events.
///
/// Implementations must return quickly: the engine thread is blocked for the
/// duration of the call.
pub trait RenderListener: Send + Sync {
    fn on_render_event(&self, event: RenderEvent);
}

/// One host media engine instance.
pub trait RenderPipeline: Send + Sync {
    /// Replace the loaded item. Playback does not start until [`play`](Self::play).
    fn load(&self, item: MediaItem);

    /// Start buffering the loaded item.
    fn prepare(&self);

    fn play(&self);

    fn pause(&self);

    /// Stop playback and release buffers; the item stays loaded.
    fn stop(&self);

    /// Unload the current item.
    fn clear(&self);

    /// Seek inside the loaded item. Out-of-range values are clamped by the engine.
    fn seek(&self, position_ms: u64);

    /// Output gain in `0.0..=1.0`.
    fn set_volume(&self, volume: f32);

    fn volume(&self) -> f32;

    /// Whether an item is currently loaded.
    fn has_item(&self) -> bool;

    fn is_playing(&self) -> bool;

    fn position_ms(&self) -> u64;

    /// Duration of the loaded item, `None` until the engine knows it.
    fn duration_ms(&self) -> Option<u64>;

    fn state(&self) -> EngineState;

    /// Install or remove the event listener. Only one listener is kept.
    fn set_listener(&self, listener: Option<Arc<dyn RenderListener>>);

    /// Free native resources. The pipeline is unusable afterwards.
    fn release(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_item_keeps_id_and_uri() {
        let item = MediaItem::new("42", "content://media/external/audio/media/42");
        assert_eq!(item.media_id, "42");
        assert!(item.uri.ends_with("/42"));
    }
}
