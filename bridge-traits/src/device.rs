//! Render device contract.
//!
//! The render device decodes and outputs audio. It is exclusively owned by the
//! Playback Engine, which mirrors the active queue into it and reacts to the
//! events it emits. Decoding, buffering and network resilience all live behind
//! this trait.

use crate::{
    error::Result,
    media::{RepeatMode, Track},
};
use core_async::sync::mpsc;
use serde::{Deserialize, Serialize};

/// One playable entry handed to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderItem {
    pub id: String,
    /// Media locator the device resolves (file path, URL, ...).
    pub locator: String,
    pub title: String,
    pub artist: Option<String>,
    pub artwork_uri: Option<String>,
    /// Duration hint in milliseconds; negative for live content.
    pub duration_ms: i64,
}

impl From<&Track> for RenderItem {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            locator: track.media_uri.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            artwork_uri: track.artwork_uri.clone(),
            duration_ms: track.duration_ms,
        }
    }
}

/// Device-level playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    Idle,
    Buffering,
    Ready,
    /// The last item finished and nothing follows it.
    Ended,
}

/// Why the active item changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionReason {
    /// Previous item played to its natural end.
    Auto,
    /// Explicit seek to another item.
    Seek,
    /// Repeat-one restarted the same item.
    Repeat,
    /// The item list was replaced.
    PlaylistChanged,
}

/// Notifications emitted by a device to its attached listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceEvent {
    ItemTransitioned {
        index: usize,
        reason: TransitionReason,
    },
    MetadataChanged {
        index: usize,
    },
    PlaybackStateChanged(DeviceStatus),
    IsPlayingChanged(bool),
    Error {
        message: String,
    },
}

/// Channel used by devices to deliver [`DeviceEvent`]s.
pub type DeviceEventSender = mpsc::UnboundedSender<DeviceEvent>;

/// Point-in-time view of the device transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub status: DeviceStatus,
    pub is_playing: bool,
    pub position_ms: i64,
    /// Negative when the active item is unbounded or not yet known.
    pub duration_ms: i64,
    pub buffered_ms: i64,
    pub current_index: Option<usize>,
    pub item_count: usize,
    pub volume: f32,
    pub shuffle_enabled: bool,
    pub repeat_mode: RepeatMode,
}

impl Default for DeviceSnapshot {
    fn default() -> Self {
        Self {
            status: DeviceStatus::Idle,
            is_playing: false,
            position_ms: 0,
            duration_ms: crate::media::UNKNOWN_DURATION,
            buffered_ms: 0,
            current_index: None,
            item_count: 0,
            volume: 1.0,
            shuffle_enabled: false,
            repeat_mode: RepeatMode::None,
        }
    }
}

/// Audio decode/render engine.
///
/// The item list handed to [`set_items`](Self::set_items) is already in
/// playback order. The shuffle flag is informational and implementations
/// must not reorder items themselves. Repeat mode governs what the device
/// does at an item's natural end.
#[async_trait::async_trait]
pub trait RenderDevice: Send + Sync {
    /// Replace the item list and position the device at `start_index`.
    async fn set_items(&self, items: Vec<RenderItem>, start_index: usize) -> Result<()>;

    /// Begin loading the active item.
    async fn prepare(&self) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    /// Stop transport and drop buffered media. The item list is kept.
    async fn stop(&self) -> Result<()>;

    /// Seek within the active item.
    async fn seek(&self, position_ms: i64) -> Result<()>;

    /// Move to another item and seek within it.
    async fn seek_to_item(&self, index: usize, position_ms: i64) -> Result<()>;

    /// Output volume in `0.0..=1.0`.
    async fn set_volume(&self, volume: f32) -> Result<()>;

    async fn set_shuffle_enabled(&self, enabled: bool) -> Result<()>;

    async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()>;

    /// Current transport view.
    fn snapshot(&self) -> DeviceSnapshot;

    /// Route events to `events`, replacing any previous listener.
    fn attach_listener(&self, events: DeviceEventSender);

    /// Stop delivering events.
    fn detach_listener(&self);

    /// Release decoder and output resources. The device is unusable afterwards.
    async fn release(&self) -> Result<()>;
}
