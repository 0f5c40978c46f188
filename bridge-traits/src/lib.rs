//! # Host Bridge Traits
//!
//! Contract between the playback core and the host platform.
//!
//! ## Overview
//!
//! The core never touches audio hardware, the network stack of a cast
//! protocol, or an HTTP listener directly. Each of those is a capability the
//! host supplies through one of the traits below.
//!
//! ### Local rendering
//! - [`RenderPipeline`](render::RenderPipeline) - One host media engine instance
//! - [`RenderListener`](render::RenderListener) - Engine state and error events
//!
//! ### Remote rendering
//! - [`SessionManager`](cast::SessionManager) - Announces renderer sessions
//! - [`RemoteSession`](cast::RemoteSession) - A connected renderer
//! - [`RemoteMediaClient`](cast::RemoteMediaClient) - Queue loads and transport commands
//!
//! ### Media exposure
//! - [`MediaServerControl`](media_server::MediaServerControl) - Start the local HTTP server
//! - [`ServerAddress`](media_server::ServerAddress) - Published base address of that server
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Threading
//!
//! Every trait is `Send + Sync`. Listener callbacks may arrive on any host
//! thread and must return quickly; the core hops onto its own runtime before
//! doing real work.
//!
//! ## Testing
//!
//! The `test-support` feature exposes in-memory fakes of every bridge in
//! [`testing`].

pub mod cast;
pub mod error;
pub mod logging;
pub mod media_server;
pub mod render;

#[cfg(feature = "test-support")]
pub mod testing;

pub use error::BridgeError;

pub use cast::{
    IdleReason, ListenerId, MediaStatus, QueueLoadRequest, RemoteMediaClient, RemoteMediaInfo,
    RemoteMediaListener, RemotePlayerState, RemoteQueueEntry, RemoteQueueItem, RemoteRepeatMode,
    RemoteSession, ResumeState, SessionLifecycleListener, SessionManager,
};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use media_server::{MediaEndpoints, MediaServerControl, ServerAddress};
pub use render::{EngineState, MediaItem, RenderEvent, RenderListener, RenderPipeline};
