//! # Playback Error Types
//!
//! Errors raised while constructing or driving a playback backend.
//!
//! Most playback failures never surface as `Err`: a backend command that
//! fails at runtime is reported through [`PlaybackCallbacks`] (status `Error`,
//! song `None`). These variants cover construction failures and the internal
//! plumbing between a backend and its bridges.
//!
//! [`PlaybackCallbacks`]: crate::callbacks::PlaybackCallbacks

use bridge_traits::BridgeError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Source Errors
    // ========================================================================
    /// The track has no playable locator.
    #[error("Track {0} has no content locator")]
    MissingContent(String),

    /// The media server has not published an address yet.
    #[error("Media server address not published")]
    MissingServerAddress,

    // ========================================================================
    // Remote Renderer Errors
    // ========================================================================
    /// The renderer session has no media channel.
    #[error("Remote session unavailable: {0}")]
    SessionUnavailable(String),

    /// The renderer rejected a queue load.
    #[error("Remote queue load failed: {0}")]
    LoadFailed(String),

    /// The renderer did not acknowledge a queue load in time.
    #[error("Remote queue load not acknowledged after {0:?}")]
    LoadTimeout(Duration),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Error reported by a host bridge.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// The backend was already released.
    #[error("Backend released")]
    Released,

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlaybackError::MissingServerAddress
                | PlaybackError::LoadTimeout(_)
                | PlaybackError::Bridge(BridgeError::Timeout(_))
        )
    }

    /// Returns `true` if the error comes from the remote renderer side.
    pub fn is_remote_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::SessionUnavailable(_)
                | PlaybackError::LoadFailed(_)
                | PlaybackError::LoadTimeout(_)
                | PlaybackError::Bridge(BridgeError::RequestRejected { .. })
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
