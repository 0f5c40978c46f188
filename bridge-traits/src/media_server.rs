//! Local media HTTP exposure bridge.
//!
//! Remote renderers cannot open local content URIs, so the host runs a small
//! HTTP server exposing two routes:
//!
//! - `GET {base}/song/{id}` serves the audio bytes of a track
//! - `GET {base}/art/{id}` serves its cover art
//!
//! The server publishes its reachable base address (for example
//! `http://192.168.1.20:8080`) into a [`ServerAddress`] cell once it is
//! listening, and clears it when it stops. The core only reads the cell and
//! asks the host to start the server.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Host control over the media HTTP server.
pub trait MediaServerControl: Send + Sync {
    /// Ask the host to start the server. Returns immediately; readiness is
    /// signalled through the [`ServerAddress`] cell.
    fn request_start(&self);
}

/// Published base address of the media HTTP server.
///
/// Single writer (the server), many readers. `None` means "not ready" and is
/// a normal state every reader has to handle. Clones share the same cell.
#[derive(Clone)]
pub struct ServerAddress {
    sender: Arc<watch::Sender<Option<String>>>,
}

impl ServerAddress {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish the base address. A trailing slash is dropped.
    pub fn publish(&self, base: impl Into<String>) {
        let base = base.into().trim_end_matches('/').to_string();
        self.sender.send_replace(Some(base));
    }

    /// Mark the server as stopped.
    pub fn clear(&self) {
        self.sender.send_replace(None);
    }

    pub fn current(&self) -> Option<String> {
        self.sender.borrow().clone()
    }

    pub fn is_published(&self) -> bool {
        self.sender.borrow().is_some()
    }

    /// Endpoint builder for the current address, if published.
    pub fn endpoints(&self) -> Option<MediaEndpoints> {
        self.current().map(MediaEndpoints::new)
    }

    /// Wait until an address is published, at most `timeout`.
    pub async fn wait_published(&self, timeout: Duration) -> Option<String> {
        let mut receiver = self.sender.subscribe();
        let published = match tokio::time::timeout(timeout, receiver.wait_for(Option::is_some))
            .await
        {
            Ok(Ok(published)) => (*published).clone(),
            _ => None,
        };
        published
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerAddress")
            .field("published", &self.is_published())
            .finish()
    }
}

/// URL builder for the two media routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEndpoints {
    base: String,
}

impl MediaEndpoints {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn song_url(&self, track_id: &str) -> String {
        format!("{}/song/{}", self.base, track_id)
    }

    pub fn art_url(&self, track_id: &str) -> String {
        format!("{}/art/{}", self.base, track_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpublished_by_default() {
        let address = ServerAddress::new();
        assert!(!address.is_published());
        assert!(address.current().is_none());
        assert!(address.endpoints().is_none());
    }

    #[test]
    fn publish_and_clear_are_shared_between_clones() {
        let address = ServerAddress::new();
        let reader = address.clone();

        address.publish("http://192.168.1.20:8080/");
        assert_eq!(reader.current().as_deref(), Some("http://192.168.1.20:8080"));

        address.clear();
        assert!(!reader.is_published());
    }

    #[test]
    fn endpoints_build_song_and_art_urls() {
        let endpoints = MediaEndpoints::new("http://10.0.0.2:8080");
        assert_eq!(endpoints.song_url("17"), "http://10.0.0.2:8080/song/17");
        assert_eq!(endpoints.art_url("17"), "http://10.0.0.2:8080/art/17");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_published_times_out() {
        let address = ServerAddress::new();
        let result = address.wait_published(Duration::from_secs(5)).await;
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_published_sees_late_publication() {
        let address = ServerAddress::new();
        let writer = address.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            writer.publish("http://10.0.0.2:8080");
        });

        let result = address.wait_published(Duration::from_secs(5)).await;
        assert_eq!(result.as_deref(), Some("http://10.0.0.2:8080"));
    }
}
