//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the playback crates:
//! - Logging and tracing setup
//! - Configuration builder and timing knobs
//! - Event bus for hand-off and session notifications
//!
//! ## Overview
//!
//! Nothing here knows about tracks or backends. `core-playback` and
//! `core-service` build on these pieces: the switcher reads its timeouts from
//! [`config::PlaybackTimings`] and reports aborted hand-offs on the
//! [`events::EventBus`].

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, PlaybackTimings};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventSeverity, EventStream};
