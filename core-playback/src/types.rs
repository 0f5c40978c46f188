//! Small enums shared by the backends and their observers.

use serde::{Deserialize, Serialize};

/// Repeat behavior of the play queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RepeatMode {
    #[default]
    Off,
    /// Wrap from the last track to the first.
    All,
    /// Replay the current track on completion.
    One,
}

impl RepeatMode {
    /// Next mode in the `Off → All → One → Off` cycle.
    pub fn cycled(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }
}

/// Transport status reported to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportState {
    /// Nothing loaded, or stopped.
    Idle,
    /// Loading or buffering.
    Loading,
    /// Ready; playing or able to play immediately.
    Playing,
    Paused,
    /// The queue played to its end.
    Ended,
    /// The last command failed; see logs.
    Error,
}

/// Where audio is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    Local,
    Remote,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Local => f.write_str("local"),
            BackendKind::Remote => f.write_str("remote"),
        }
    }
}
