//! Track descriptor shared by every backend.

use serde::{Deserialize, Serialize};

/// A playable library track.
///
/// Backends copy tracks by value; a hand-off clones the queue out of the old
/// backend and into the new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Stable library id. Also the path segment of the media server routes.
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Duration reported by the library, 0 if unknown.
    pub duration_ms: u64,
    /// Locator the local engine can open. Empty means "not playable locally".
    pub content_uri: String,
    pub artwork_uri: Option<String>,
}

impl Track {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content_uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: String::new(),
            album: String::new(),
            duration_ms: 0,
            content_uri: content_uri.into(),
            artwork_uri: None,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = album.into();
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_artwork(mut self, artwork_uri: impl Into<String>) -> Self {
        self.artwork_uri = Some(artwork_uri.into());
        self
    }

    pub fn has_content(&self) -> bool {
        !self.content_uri.trim().is_empty()
    }

    /// Lower-cased file extension of the content locator, if any.
    pub fn extension(&self) -> Option<String> {
        let path = self.content_uri.split(['?', '#']).next()?;
        let file = path.rsplit(['/', '\\']).next()?;
        let (stem, ext) = file.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}
