//! # Event Bus System
//!
//! Notification channel for outcomes that are not part of the playback
//! callback contract: hand-off progress, renderer session lifecycle, and
//! user-facing notices such as "media server not ready".
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wraps [`HandoffEvent`], [`SessionEvent`]
//!   and free-form notifications
//! - **EventBus**: `tokio::sync::broadcast` channel, cheap to clone
//! - **EventStream**: receiver wrapper with an optional filter
//!
//! ```text
//! ┌──────────────────┐   emit   ┌──────────┐  subscribe  ┌──────────┐
//! │ PlaybackSwitcher ├─────────>│ EventBus ├────────────>│ Host UI  │
//! └──────────────────┘          └──────────┘             └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventSeverity};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(CoreEvent::notification("Cast device lost", EventSeverity::Warning)).ok();
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.severity(), EventSeverity::Warning);
//! # }
//! ```
//!
//! ## Error Handling
//!
//! `RecvError::Lagged(n)` means the subscriber missed `n` events and may keep
//! reading. `RecvError::Closed` means every sender is gone and the subscriber
//! should exit. Emitting with no subscribers returns an error that callers
//! normally ignore with `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Backend hand-off progress
    Handoff(HandoffEvent),
    /// Renderer session lifecycle, as reported by the host
    Session(SessionEvent),
    /// Message meant to be shown to the user
    Notification {
        message: String,
        severity: EventSeverity,
    },
}

impl CoreEvent {
    pub fn notification(message: impl Into<String>, severity: EventSeverity) -> Self {
        CoreEvent::Notification {
            message: message.into(),
            severity,
        }
    }

    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Handoff(e) => e.description(),
            CoreEvent::Session(e) => e.description(),
            CoreEvent::Notification { message, .. } => message,
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Handoff(HandoffEvent::Aborted { .. }) => EventSeverity::Warning,
            CoreEvent::Handoff(HandoffEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Session(SessionEvent::Ended { .. }) => EventSeverity::Info,
            CoreEvent::Notification { severity, .. } => *severity,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Hand-off Events
// ============================================================================

/// Which way a hand-off moves playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandoffDirection {
    ToRemote,
    ToLocal,
}

/// Progress of a backend switch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum HandoffEvent {
    Started {
        direction: HandoffDirection,
        /// Renderer session involved, if any.
        session_id: Option<String>,
    },
    Completed {
        direction: HandoffDirection,
        /// Track resumed on the new backend, `None` when nothing was queued.
        track_id: Option<String>,
        position_ms: u64,
        was_playing: bool,
    },
    /// The switch was abandoned; the previous backend stays active.
    Aborted {
        direction: HandoffDirection,
        reason: String,
    },
}

impl HandoffEvent {
    fn description(&self) -> &str {
        match self {
            HandoffEvent::Started { .. } => "Playback hand-off started",
            HandoffEvent::Completed { .. } => "Playback hand-off completed",
            HandoffEvent::Aborted { .. } => "Playback hand-off aborted",
        }
    }
}

// ============================================================================
// Session Events
// ============================================================================

/// Renderer session lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    Started { session_id: String },
    Resumed { session_id: String },
    Ended { session_id: String },
    Suspended { session_id: String },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::Started { session_id }
            | SessionEvent::Resumed { session_id }
            | SessionEvent::Ended { session_id }
            | SessionEvent::Suspended { session_id } => session_id,
        }
    }

    fn description(&self) -> &str {
        match self {
            SessionEvent::Started { .. } => "Renderer session started",
            SessionEvent::Resumed { .. } => "Renderer session resumed",
            SessionEvent::Ended { .. } => "Renderer session ended",
            SessionEvent::Suspended { .. } => "Renderer session suspended",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Clones share the same channel. Slow subscribers receive
/// `RecvError::Lagged` and never block publishers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering at most `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a receiver for all future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Same as [`subscribe`](Self::subscribe), wrapped in an [`EventStream`].
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` that skips events rejected by a filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus};
///
/// let bus = EventBus::new(16);
/// let handoffs = bus.stream().filter(|event| matches!(event, CoreEvent::Handoff(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Keep only events at or above `minimum`.
    pub fn min_severity(self, minimum: EventSeverity) -> Self {
        self.filter(move |event| event.severity() >= minimum)
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every sender has been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive. `None` when nothing matching is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn aborted() -> CoreEvent {
        CoreEvent::Handoff(HandoffEvent::Aborted {
            direction: HandoffDirection::ToRemote,
            reason: "media server not ready".to_string(),
        })
    }

    #[tokio::test]
    async fn emission_without_subscribers_fails() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.emit(aborted()).is_err());
    }

    #[tokio::test]
    async fn every_subscriber_receives_the_event() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.emit(aborted()).unwrap(), 2);
        assert_eq!(first.recv().await.unwrap(), aborted());
        assert_eq!(second.recv().await.unwrap(), aborted());
    }

    #[tokio::test]
    async fn stream_filter_skips_other_events() {
        let bus = EventBus::new(10);
        let mut stream = bus
            .stream()
            .filter(|event| matches!(event, CoreEvent::Handoff(_)));

        bus.emit(CoreEvent::Session(SessionEvent::Started {
            session_id: "s-1".to_string(),
        }))
        .ok();
        bus.emit(aborted()).ok();

        assert_eq!(stream.recv().await.unwrap(), aborted());
    }

    #[tokio::test]
    async fn min_severity_drops_debug_events() {
        let bus = EventBus::new(10);
        let mut stream = bus.stream().min_severity(EventSeverity::Warning);

        bus.emit(CoreEvent::Handoff(HandoffEvent::Started {
            direction: HandoffDirection::ToLocal,
            session_id: None,
        }))
        .ok();
        assert!(stream.try_recv().is_none());

        bus.emit(aborted()).ok();
        assert_eq!(stream.try_recv().unwrap().unwrap(), aborted());
    }

    #[tokio::test]
    async fn lagged_subscriber_is_told() {
        let bus = EventBus::new(2);
        let mut receiver = bus.subscribe();

        for index in 0..5 {
            bus.emit(CoreEvent::notification(
                format!("notice {index}"),
                EventSeverity::Info,
            ))
            .ok();
        }

        assert!(matches!(receiver.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn severity_and_description() {
        assert_eq!(aborted().severity(), EventSeverity::Warning);
        assert_eq!(aborted().description(), "Playback hand-off aborted");

        let notice = CoreEvent::notification("Cast device lost", EventSeverity::Error);
        assert_eq!(notice.severity(), EventSeverity::Error);
        assert_eq!(notice.description(), "Cast device lost");
    }

    #[test]
    fn session_event_exposes_id() {
        let event = SessionEvent::Suspended {
            session_id: "living-room".to_string(),
        };
        assert_eq!(event.session_id(), "living-room");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = CoreEvent::Handoff(HandoffEvent::Completed {
            direction: HandoffDirection::ToRemote,
            track_id: Some("42".to_string()),
            position_ms: 42_000,
            was_playing: true,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Handoff\""));

        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
