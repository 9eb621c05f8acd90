//! Shared media model.
//!
//! [`Track`] is owned by the catalog; every other component holds copies and
//! routes favorite changes back through
//! [`CatalogSource::set_favorite`](crate::catalog::CatalogSource::set_favorite).

use serde::{Deserialize, Serialize};

/// Duration sentinel for live or otherwise unbounded content.
pub const UNKNOWN_DURATION: i64 = -1;

/// A catalog entry. Entries with an empty `media_uri` are browsable only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub artwork_uri: Option<String>,
    #[serde(default)]
    pub media_uri: String,
    #[serde(default)]
    pub is_favorite: bool,
    /// Milliseconds, or [`UNKNOWN_DURATION`] when unbounded.
    #[serde(default)]
    pub duration_ms: i64,
}

impl Track {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            title: title.into(),
            artist: None,
            description: None,
            artwork_uri: None,
            media_uri: String::new(),
            is_favorite: false,
            duration_ms: 0,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_artwork(mut self, uri: impl Into<String>) -> Self {
        self.artwork_uri = Some(uri.into());
        self
    }

    pub fn with_media(mut self, uri: impl Into<String>) -> Self {
        self.media_uri = uri.into();
        self
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }

    /// Whether the entry can be handed to a render device.
    pub fn is_playable(&self) -> bool {
        !self.media_uri.is_empty()
    }

    /// Live content has no known end.
    pub fn is_live(&self) -> bool {
        self.duration_ms < 0
    }
}

/// Queue repeat behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RepeatMode {
    #[default]
    None,
    One,
    All,
}

impl RepeatMode {
    /// Next mode in the controller cycle: `All -> None -> One -> All`.
    pub fn cycled(self) -> Self {
        match self {
            RepeatMode::All => RepeatMode::None,
            RepeatMode::None => RepeatMode::One,
            RepeatMode::One => RepeatMode::All,
        }
    }
}
