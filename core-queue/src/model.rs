//! Queue state and supporting types.

use bridge_traits::media::{RepeatMode, Track};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Browse root.
pub const ROOT_ID: &str = "media-core://root";
/// Browse node listing favorite tracks; also builds the favorites queue.
pub const FAVORITES_ID: &str = "media-core://favorites";
/// Browse node listing top-level catalog entries.
pub const ALL_ID: &str = "media-core://all";
/// Prefix marking a track id as listed under favorites.
pub const FAVORITE_ITEM_PREFIX: &str = "media-core://favorite/";

/// Whether `id` collides with one of the browse identifiers.
pub fn is_reserved_id(id: &str) -> bool {
    id == ROOT_ID || id == FAVORITES_ID || id == ALL_ID || id.starts_with(FAVORITE_ITEM_PREFIX)
}

pub fn favorite_item_id(track_id: &str) -> String {
    format!("{FAVORITE_ITEM_PREFIX}{track_id}")
}

/// Catalog id behind a favorites-tagged id.
pub fn strip_favorite_prefix(id: &str) -> Option<&str> {
    id.strip_prefix(FAVORITE_ITEM_PREFIX)
}

/// Catalog id for `id`, with any favorites tag removed.
pub fn catalog_id(id: &str) -> &str {
    strip_favorite_prefix(id).unwrap_or(id)
}

/// What the active queue was built from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueueSource {
    #[default]
    Empty,
    Parent(String),
    /// Playable entries that have no parent.
    TopLevel,
    Favorites,
}

impl fmt::Display for QueueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueSource::Empty => write!(f, "empty"),
            QueueSource::Parent(id) => write!(f, "parent:{}", id),
            QueueSource::TopLevel => write!(f, "top-level"),
            QueueSource::Favorites => write!(f, "favorites"),
        }
    }
}

/// Ordering applied when a queue is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortCriterion {
    #[default]
    None,
    Title,
    Artist,
    Duration,
}

impl SortCriterion {
    /// Stable sort; equal keys keep catalog order.
    pub fn apply(self, tracks: &mut [Track]) {
        match self {
            SortCriterion::None => {}
            SortCriterion::Title => tracks.sort_by_cached_key(|t| t.title.to_lowercase()),
            SortCriterion::Artist => {
                tracks.sort_by_cached_key(|t| t.artist.as_deref().map(str::to_lowercase))
            }
            SortCriterion::Duration => tracks.sort_by(|a, b| {
                // Unbounded entries go last.
                match (a.is_live(), b.is_live()) {
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    _ => a.duration_ms.cmp(&b.duration_ms),
                }
            }),
        }
    }
}

/// Result of [`advance`](crate::QueueCore::advance) or
/// [`retreat`](crate::QueueCore::retreat).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// The current index changed.
    Moved(usize),
    /// The index stayed put and the current item should restart.
    Restarted(usize),
    /// No next/previous item under the active repeat mode.
    Boundary,
}

impl Navigation {
    pub fn index(self) -> Option<usize> {
        match self {
            Navigation::Moved(index) | Navigation::Restarted(index) => Some(index),
            Navigation::Boundary => None,
        }
    }
}

/// Published queue snapshot.
///
/// `current_index` is `Some` exactly when `queue` is non-empty, and then
/// always within bounds. `version` moves only when membership or order does.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueueState {
    pub queue: Vec<Track>,
    pub current_index: Option<usize>,
    pub shuffle_enabled: bool,
    pub repeat_mode: RepeatMode,
    pub version: u64,
    pub source: QueueSource,
    pub updated_at: DateTime<Utc>,
}

impl QueueState {
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_index.and_then(|index| self.queue.get(index))
    }

    pub fn position_of(&self, track_id: &str) -> Option<usize> {
        self.queue.iter().position(|t| t.id == track_id)
    }

    /// Index `advance` would land on, if any.
    pub fn next_index(&self) -> Option<usize> {
        let current = self.current_index?;
        match self.repeat_mode {
            RepeatMode::One => Some(current),
            _ if current + 1 < self.queue.len() => Some(current + 1),
            RepeatMode::All => Some(0),
            RepeatMode::None => None,
        }
    }

    /// Index `retreat` would land on, if any.
    pub fn previous_index(&self) -> Option<usize> {
        let current = self.current_index?;
        match self.repeat_mode {
            RepeatMode::One => Some(current),
            _ if current > 0 => Some(current - 1),
            RepeatMode::All => Some(self.queue.len() - 1),
            RepeatMode::None => None,
        }
    }

    pub fn has_next(&self) -> bool {
        self.next_index().is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.previous_index().is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(|t| t.id.as_str())
    }
}
