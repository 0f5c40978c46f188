//! # Core Configuration Module
//!
//! Builder-based configuration for the playback core.
//!
//! ## Overview
//!
//! [`CoreConfig`] bundles every host bridge the core drives together with the
//! timing knobs of the hand-off and transition machinery. The builder fails
//! fast with [`Error::CapabilityMissing`] when a required bridge is absent, so
//! a misconfigured host finds out at startup rather than on the first cast
//! session.
//!
//! ## Required Dependencies
//!
//! - `primary_pipeline` / `staging_pipeline` - the two local render engines
//! - `session_manager` - remote renderer sessions
//! - `media_server` - control over the local media HTTP server
//!
//! ## Optional Dependencies
//!
//! - `server_address` - the cell the media server publishes into. A fresh,
//!   unpublished cell is created when none is supplied; the host then reads
//!   it back from [`CoreConfig::server_address`] to hand it to its server.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, PlaybackTimings};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .primary_pipeline(primary)
//!     .staging_pipeline(staging)
//!     .session_manager(sessions)
//!     .media_server(server)
//!     .timings(PlaybackTimings {
//!         http_ready_timeout: Duration::from_secs(3),
//!         ..PlaybackTimings::default()
//!     })
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{MediaServerControl, RenderPipeline, ServerAddress, SessionManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Timing knobs of the playback core.
///
/// Serialized with every duration in milliseconds; missing fields take their
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackTimings {
    /// How long a local-to-remote switch waits for the media server to
    /// publish its address. Default: 5 s.
    #[serde(with = "millis")]
    pub http_ready_timeout: Duration,

    /// Pause between loading the queue on the renderer and seeking it.
    /// Default: 1 s.
    #[serde(with = "millis")]
    pub handoff_settle_delay: Duration,

    /// Bound on the renderer's acknowledgement of a queue load. Default: 10 s.
    #[serde(with = "millis")]
    pub remote_load_timeout: Duration,

    /// Cadence of local position reports. Default: 500 ms.
    #[serde(with = "millis")]
    pub position_interval: Duration,

    /// Progress cadence requested from the renderer. Default: 1000 ms.
    #[serde(with = "millis")]
    pub remote_progress_interval: Duration,

    /// Volume ramp step of crossfade transitions. Default: 50 ms.
    #[serde(with = "millis")]
    pub transition_tick: Duration,
}

impl Default for PlaybackTimings {
    fn default() -> Self {
        Self {
            http_ready_timeout: Duration::from_secs(5),
            handoff_settle_delay: Duration::from_secs(1),
            remote_load_timeout: Duration::from_secs(10),
            position_interval: Duration::from_millis(500),
            remote_progress_interval: Duration::from_millis(1000),
            transition_tick: Duration::from_millis(50),
        }
    }
}

impl PlaybackTimings {
    pub fn validate(&self) -> Result<()> {
        let at_least_a_millisecond = [
            ("http_ready_timeout", self.http_ready_timeout),
            ("remote_load_timeout", self.remote_load_timeout),
            ("position_interval", self.position_interval),
            ("remote_progress_interval", self.remote_progress_interval),
            ("transition_tick", self.transition_tick),
        ];
        for (name, value) in at_least_a_millisecond {
            if value < Duration::from_millis(1) {
                return Err(Error::Config(format!("{name} must be at least 1ms")));
            }
        }

        if self.transition_tick > self.position_interval {
            return Err(Error::Config(format!(
                "transition_tick ({}ms) cannot exceed position_interval ({}ms)",
                self.transition_tick.as_millis(),
                self.position_interval.as_millis()
            )));
        }

        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Core configuration. Build with [`CoreConfig::builder`].
#[derive(Clone)]
pub struct CoreConfig {
    /// Render engine the UI follows.
    pub primary_pipeline: Arc<dyn RenderPipeline>,

    /// Second engine, used to pre-stage the next item and for crossfades.
    pub staging_pipeline: Arc<dyn RenderPipeline>,

    pub session_manager: Arc<dyn SessionManager>,

    pub media_server: Arc<dyn MediaServerControl>,

    /// Published base address of the media server.
    pub server_address: ServerAddress,

    pub timings: PlaybackTimings,

    /// Per-subscriber buffer of the event bus.
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("primary_pipeline", &"RenderPipeline { ... }")
            .field("staging_pipeline", &"RenderPipeline { ... }")
            .field("session_manager", &"SessionManager { ... }")
            .field("media_server", &"MediaServerControl { ... }")
            .field("server_address", &self.server_address)
            .field("timings", &self.timings)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Every timing is consistent (see [`PlaybackTimings::validate`])
    /// - The event buffer holds at least one event
    /// - The two render pipelines are distinct instances
    pub fn validate(&self) -> Result<()> {
        self.timings.validate()?;

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if Arc::ptr_eq(&self.primary_pipeline, &self.staging_pipeline) {
            return Err(Error::Config(
                "Primary and staging pipelines must be distinct engine instances".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    primary_pipeline: Option<Arc<dyn RenderPipeline>>,
    staging_pipeline: Option<Arc<dyn RenderPipeline>>,
    session_manager: Option<Arc<dyn SessionManager>>,
    media_server: Option<Arc<dyn MediaServerControl>>,
    server_address: Option<ServerAddress>,
    timings: Option<PlaybackTimings>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the render engine the UI follows (required).
    pub fn primary_pipeline(mut self, pipeline: Arc<dyn RenderPipeline>) -> Self {
        self.primary_pipeline = Some(pipeline);
        self
    }

    /// Sets the staging render engine (required).
    pub fn staging_pipeline(mut self, pipeline: Arc<dyn RenderPipeline>) -> Self {
        self.staging_pipeline = Some(pipeline);
        self
    }

    /// Sets the remote session manager (required).
    pub fn session_manager(mut self, manager: Arc<dyn SessionManager>) -> Self {
        self.session_manager = Some(manager);
        self
    }

    /// Sets the media server control (required).
    pub fn media_server(mut self, server: Arc<dyn MediaServerControl>) -> Self {
        self.media_server = Some(server);
        self
    }

    /// Shares an existing address cell with the media server.
    pub fn server_address(mut self, address: ServerAddress) -> Self {
        self.server_address = Some(address);
        self
    }

    pub fn timings(mut self, timings: PlaybackTimings) -> Self {
        self.timings = Some(timings);
        self
    }

    /// Default: [`DEFAULT_EVENT_BUFFER_SIZE`].
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when a required bridge was not provided
    /// - [`Error::Config`] when validation fails
    pub fn build(self) -> Result<CoreConfig> {
        let primary_pipeline = self.primary_pipeline.ok_or_else(|| {
            Error::missing(
                "RenderPipeline (primary)",
                "A primary render pipeline is required for local playback. \
                 Inject the host media engine instance the UI follows.",
            )
        })?;

        let staging_pipeline = self.staging_pipeline.ok_or_else(|| {
            Error::missing(
                "RenderPipeline (staging)",
                "A second render pipeline is required for gapless staging and crossfades. \
                 Inject a separate engine instance.",
            )
        })?;

        let session_manager = self.session_manager.ok_or_else(|| {
            Error::missing(
                "SessionManager",
                "A session manager is required to follow remote renderer sessions. \
                 Hosts without casting can inject one that never starts a session.",
            )
        })?;

        let media_server = self.media_server.ok_or_else(|| {
            Error::missing(
                "MediaServerControl",
                "Media server control is required to expose local tracks to remote renderers.",
            )
        })?;

        let config = CoreConfig {
            primary_pipeline,
            staging_pipeline,
            session_manager,
            media_server,
            server_address: self.server_address.unwrap_or_default(),
            timings: self.timings.unwrap_or_default(),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::cast::{ListenerId, RemoteSession, SessionLifecycleListener};
    use bridge_traits::render::{EngineState, MediaItem, RenderListener};

    struct NullPipeline;

    impl RenderPipeline for NullPipeline {
        fn load(&self, _item: MediaItem) {}
        fn prepare(&self) {}
        fn play(&self) {}
        fn pause(&self) {}
        fn stop(&self) {}
        fn clear(&self) {}
        fn seek(&self, _position_ms: u64) {}
        fn set_volume(&self, _volume: f32) {}
        fn volume(&self) -> f32 {
            1.0
        }
        fn has_item(&self) -> bool {
            false
        }
        fn is_playing(&self) -> bool {
            false
        }
        fn position_ms(&self) -> u64 {
            0
        }
        fn duration_ms(&self) -> Option<u64> {
            None
        }
        fn state(&self) -> EngineState {
            EngineState::Idle
        }
        fn set_listener(&self, _listener: Option<Arc<dyn RenderListener>>) {}
        fn release(&self) {}
    }

    struct NoSessions;

    impl SessionManager for NoSessions {
        fn add_listener(&self, _listener: Arc<dyn SessionLifecycleListener>) -> ListenerId {
            ListenerId::new()
        }
        fn remove_listener(&self, _id: ListenerId) {}
        fn current_session(&self) -> Option<Arc<dyn RemoteSession>> {
            None
        }
    }

    struct NoServer;

    impl MediaServerControl for NoServer {
        fn request_start(&self) {}
    }

    fn complete_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .primary_pipeline(Arc::new(NullPipeline))
            .staging_pipeline(Arc::new(NullPipeline))
            .session_manager(Arc::new(NoSessions))
            .media_server(Arc::new(NoServer))
    }

    #[test]
    fn builds_with_defaults() {
        let config = complete_builder().build().unwrap();
        assert_eq!(config.timings, PlaybackTimings::default());
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert!(!config.server_address.is_published());
    }

    #[test]
    fn missing_staging_pipeline_is_reported() {
        let result = CoreConfig::builder()
            .primary_pipeline(Arc::new(NullPipeline))
            .session_manager(Arc::new(NoSessions))
            .media_server(Arc::new(NoServer))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "RenderPipeline (staging)")
            }
            other => panic!("expected CapabilityMissing, got {other:?}"),
        }
    }

    #[test]
    fn missing_media_server_is_reported() {
        let result = CoreConfig::builder()
            .primary_pipeline(Arc::new(NullPipeline))
            .staging_pipeline(Arc::new(NullPipeline))
            .session_manager(Arc::new(NoSessions))
            .build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { capability, .. }) if capability == "MediaServerControl"
        ));
    }

    #[test]
    fn same_pipeline_twice_is_rejected() {
        let pipeline: Arc<dyn RenderPipeline> = Arc::new(NullPipeline);
        let result = CoreConfig::builder()
            .primary_pipeline(Arc::clone(&pipeline))
            .staging_pipeline(pipeline)
            .session_manager(Arc::new(NoSessions))
            .media_server(Arc::new(NoServer))
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let timings = PlaybackTimings {
            http_ready_timeout: Duration::ZERO,
            ..PlaybackTimings::default()
        };
        assert!(complete_builder().timings(timings).build().is_err());
    }

    #[test]
    fn zero_settle_delay_is_allowed() {
        let timings = PlaybackTimings {
            handoff_settle_delay: Duration::ZERO,
            ..PlaybackTimings::default()
        };
        assert!(timings.validate().is_ok());
    }

    #[test]
    fn sub_millisecond_tick_is_rejected() {
        let timings = PlaybackTimings {
            transition_tick: Duration::from_micros(500),
            ..PlaybackTimings::default()
        };
        let err = timings.validate().unwrap_err();
        assert!(err.to_string().contains("transition_tick"), "{err}");
    }

    #[test]
    fn tick_larger_than_position_interval_is_rejected() {
        let timings = PlaybackTimings {
            transition_tick: Duration::from_millis(600),
            ..PlaybackTimings::default()
        };
        assert!(matches!(timings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn timings_deserialize_from_millis_with_defaults() {
        let timings: PlaybackTimings =
            serde_json::from_str(r#"{ "http_ready_timeout": 2500 }"#).unwrap();

        assert_eq!(timings.http_ready_timeout, Duration::from_millis(2500));
        assert_eq!(timings.handoff_settle_delay, Duration::from_secs(1));

        let json = serde_json::to_value(timings).unwrap();
        assert_eq!(json["position_interval"], 500);
    }

    #[test]
    fn shared_address_cell_is_kept() {
        let address = ServerAddress::new();
        let config = complete_builder()
            .server_address(address.clone())
            .build()
            .unwrap();

        address.publish("http://10.0.0.2:8080");
        assert!(config.server_address.is_published());
    }
}
