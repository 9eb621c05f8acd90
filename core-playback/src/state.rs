//! Published playback state.

use bridge_traits::artwork::Artwork;
use bridge_traits::device::{DeviceSnapshot, DeviceStatus};
use bridge_traits::media::{RepeatMode, Track, UNKNOWN_DURATION};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Transport status as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Buffering,
    Ready,
    /// The queue played out with nothing after it.
    Ended,
    /// The device reported a fatal error; see [`PlaybackState::error`].
    Error,
}

impl From<DeviceStatus> for PlaybackStatus {
    fn from(status: DeviceStatus) -> Self {
        match status {
            DeviceStatus::Idle => PlaybackStatus::Idle,
            DeviceStatus::Buffering => PlaybackStatus::Buffering,
            DeviceStatus::Ready => PlaybackStatus::Ready,
            DeviceStatus::Ended => PlaybackStatus::Ended,
        }
    }
}

/// Snapshot emitted by the playback engine on every observable change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub current_track: Option<Track>,
    pub current_index: Option<usize>,
    #[serde(skip)]
    pub artwork: Option<Artwork>,
    /// [`UNKNOWN_DURATION`] for live content.
    pub duration_ms: i64,
    /// [`UNKNOWN_DURATION`] for live content.
    pub position_ms: i64,
    pub buffered_ms: i64,
    pub is_playing: bool,
    pub shuffle_enabled: bool,
    pub repeat_mode: RepeatMode,
    pub has_next: bool,
    pub has_previous: bool,
    pub error: Option<String>,
    pub volume: f32,
    pub updated_at: DateTime<Utc>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Idle,
            current_track: None,
            current_index: None,
            artwork: None,
            duration_ms: 0,
            position_ms: 0,
            buffered_ms: 0,
            is_playing: false,
            shuffle_enabled: false,
            repeat_mode: RepeatMode::None,
            has_next: false,
            has_previous: false,
            error: None,
            volume: 1.0,
            updated_at: DateTime::<Utc>::default(),
        }
    }
}

impl PlaybackState {
    pub fn current_track_id(&self) -> Option<&str> {
        self.current_track.as_ref().map(|t| t.id.as_str())
    }

    /// Live content has no position and no end.
    pub fn is_live(&self) -> bool {
        self.current_track.as_ref().is_some_and(Track::is_live)
    }

    pub fn is_favorite(&self) -> bool {
        self.current_track.as_ref().is_some_and(|t| t.is_favorite)
    }

    /// Copy the transport fields from a device snapshot.
    ///
    /// `Error` and `Ended` are sticky: the device parking on the first item
    /// does not clear them. Only a transport command or a reload does.
    pub(crate) fn apply_device(&mut self, snapshot: &DeviceSnapshot) {
        if !matches!(self.status, PlaybackStatus::Error | PlaybackStatus::Ended) {
            self.status = snapshot.status.into();
        }
        self.is_playing = snapshot.is_playing;
        self.buffered_ms = snapshot.buffered_ms.max(0);
        self.volume = snapshot.volume;

        if self.is_live() {
            self.duration_ms = UNKNOWN_DURATION;
            self.position_ms = UNKNOWN_DURATION;
        } else {
            self.duration_ms = snapshot.duration_ms.max(0);
            self.position_ms = snapshot.position_ms.max(0);
        }
    }

    /// Compare everything except the timestamp.
    pub(crate) fn same_content(&self, other: &PlaybackState) -> bool {
        let mut other = other.clone();
        other.updated_at = self.updated_at;
        *self == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: DeviceStatus, position_ms: i64, duration_ms: i64) -> DeviceSnapshot {
        DeviceSnapshot {
            status,
            is_playing: true,
            position_ms,
            duration_ms,
            current_index: Some(0),
            item_count: 1,
            ..DeviceSnapshot::default()
        }
    }

    #[test]
    fn bounded_track_copies_position_and_duration() {
        let mut state = PlaybackState {
            current_track: Some(Track::new("a", "A").with_duration(60_000)),
            ..PlaybackState::default()
        };
        state.apply_device(&snapshot(DeviceStatus::Ready, 1_500, 60_000));

        assert_eq!(state.status, PlaybackStatus::Ready);
        assert!(state.is_playing);
        assert_eq!(state.position_ms, 1_500);
        assert_eq!(state.duration_ms, 60_000);
    }

    #[test]
    fn live_track_reports_unknown_position() {
        let mut state = PlaybackState {
            current_track: Some(Track::new("radio", "Radio").with_duration(UNKNOWN_DURATION)),
            ..PlaybackState::default()
        };
        state.apply_device(&snapshot(DeviceStatus::Ready, 42_000, UNKNOWN_DURATION));

        assert!(state.is_live());
        assert_eq!(state.position_ms, UNKNOWN_DURATION);
        assert_eq!(state.duration_ms, UNKNOWN_DURATION);
    }

    #[test]
    fn error_status_survives_device_updates() {
        let mut state = PlaybackState {
            status: PlaybackStatus::Error,
            error: Some("decoder crashed".to_string()),
            ..PlaybackState::default()
        };
        state.apply_device(&snapshot(DeviceStatus::Ready, 0, 1_000));
        assert_eq!(state.status, PlaybackStatus::Error);
    }

    #[test]
    fn ended_status_survives_rewind_to_first_item() {
        let mut state = PlaybackState {
            status: PlaybackStatus::Ended,
            current_track: Some(Track::new("a", "A").with_duration(60_000)),
            ..PlaybackState::default()
        };
        let mut parked = snapshot(DeviceStatus::Ready, 0, 60_000);
        parked.is_playing = false;
        state.apply_device(&parked);

        assert_eq!(state.status, PlaybackStatus::Ended);
        assert!(!state.is_playing);
        assert_eq!(state.position_ms, 0);
    }

    #[test]
    fn timestamp_is_ignored_when_comparing() {
        let a = PlaybackState::default();
        let b = PlaybackState {
            updated_at: Utc::now(),
            ..PlaybackState::default()
        };
        assert!(a.same_content(&b));
        assert!(!a.same_content(&PlaybackState {
            is_playing: true,
            ..b
        }));
    }
}
