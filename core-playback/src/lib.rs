//! # Playback Backends
//!
//! The two places audio can be rendered, behind one contract:
//!
//! - [`LocalBackend`]: two host render pipelines on the device, with gapless
//!   staging of the next track and crossfade transitions.
//! - [`RemoteBackend`]: a cast renderer streaming from the local media server.
//!
//! Both report to the UI through [`PlaybackCallbacks`]. Deciding which backend
//! is active, and moving playback between them, lives in `core-service`.
//!
//! ## Overview
//!
//! This crate handles:
//! - The play queue (natural order, shuffle order, repeat modes)
//! - Crossfade envelopes and the transition runner
//! - Translating engine and renderer notifications into callbacks

pub mod backend;
pub mod callbacks;
pub mod error;
pub mod local;
pub mod queue;
pub mod remote;
pub mod track;
pub mod transition;
pub mod types;

pub use backend::{BackendSnapshot, PlaybackBackend};
pub use callbacks::{CallbackSlot, PlaybackCallbacks};
pub use error::{PlaybackError, Result};
pub use local::LocalBackend;
pub use queue::PlayQueue;
pub use remote::RemoteBackend;
pub use track::Track;
pub use transition::{FadeCurve, TransitionMode, TransitionSettings};
pub use types::{BackendKind, RepeatMode, TransportState};
