//! Workspace entry crate.
//!
//! Host applications depend on `handoff-workspace` and get the playback
//! hand-off core (`core-service`) plus the backend types from
//! `core-playback` without wiring each crate individually.

#[cfg(feature = "service")]
pub use core_playback as playback;
#[cfg(feature = "service")]
pub use core_service::*;
