//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridges (two render pipelines, the cast
//! session manager, the media server) into the playback core. Hosts build a
//! [`CoreConfig`], hand it to [`CoreService::new`], and from then on send
//! every transport command to [`CoreService::backend`], which follows the
//! cast session automatically.
//!
//! ```ignore
//! use core_service::CoreService;
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .primary_pipeline(primary)
//!     .staging_pipeline(staging)
//!     .session_manager(sessions)
//!     .media_server(server)
//!     .build()?;
//! let core = CoreService::new(config)?;
//! core.set_callbacks(Some(ui));
//! core.backend().play_queue(tracks, None).await;
//! ```

pub mod error;
pub mod switcher;

pub use error::{CoreError, HandoffError, Result};
pub use switcher::{ActiveBackend, PlaybackSwitcher};

use std::sync::Arc;

use bridge_traits::ServerAddress;
use core_playback::{LocalBackend, PlaybackBackend, PlaybackCallbacks, TransitionSettings};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use tracing::info;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    switcher: PlaybackSwitcher,
    events: EventBus,
    server_address: ServerAddress,
}

impl CoreService {
    /// Validate `config`, create the local backend and start following
    /// renderer sessions. Must be called inside a Tokio runtime.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_buffer_size);
        let local = LocalBackend::new(
            config.primary_pipeline,
            config.staging_pipeline,
            &config.timings,
        )?;
        let switcher = PlaybackSwitcher::new(
            local,
            config.session_manager,
            config.media_server,
            config.server_address.clone(),
            config.timings,
            events.clone(),
        )?;

        info!("Playback core started");
        Ok(Self {
            switcher,
            events,
            server_address: config.server_address,
        })
    }

    /// The active backend. Re-read it after a hand-off.
    pub fn backend(&self) -> Arc<dyn PlaybackBackend> {
        self.switcher.backend()
    }

    pub fn switcher(&self) -> &PlaybackSwitcher {
        &self.switcher
    }

    /// Install the UI sink. It moves with playback across hand-offs.
    pub fn set_callbacks(&self, callbacks: Option<Arc<dyn PlaybackCallbacks>>) {
        self.switcher.set_callbacks(callbacks);
    }

    /// Crossfade automatically near the end of each track on the device.
    pub fn set_auto_transition(&self, settings: Option<TransitionSettings>) {
        self.switcher.local().set_auto_transition(settings);
    }

    /// Cell the host's media server publishes its base address into.
    pub fn server_address(&self) -> ServerAddress {
        self.server_address.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe_events(&self) -> EventStream {
        self.events.stream()
    }

    /// Release every backend and stop following sessions.
    pub async fn shutdown(&self) {
        self.switcher.shutdown().await;
        info!("Playback core stopped");
    }
}
