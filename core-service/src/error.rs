use std::time::Duration;
use thiserror::Error;

/// Why a backend switch was abandoned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandoffError {
    #[error("Media server did not publish an address within {0:?}")]
    ServerNotReady(Duration),

    #[error("Remote renderer unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Hand-off cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),

    #[error("Hand-off error: {0}")]
    Handoff(#[from] HandoffError),
}

impl CoreError {
    /// The hand-off failure behind this error, if any.
    pub fn as_handoff(&self) -> Option<&HandoffError> {
        match self {
            CoreError::Handoff(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
