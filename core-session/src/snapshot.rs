//! Rendering of playback and queue state into protocol snapshots.
//!
//! Everything here is a pure function of its inputs so the bridge can
//! compare a fresh rendering against the last one it published.

use bridge_traits::media::RepeatMode;
use bridge_traits::session::{
    Capabilities, CustomAction, CustomActionKind, MediaMetadata, QueueEntry, TransportState,
    TransportStatus,
};
use core_playback::{PlaybackState, PlaybackStatus};
use core_queue::QueueState;

pub const LABEL_ADD_FAVORITE: &str = "Add Favorite";
pub const LABEL_REMOVE_FAVORITE: &str = "Remove Favorite";
pub const LABEL_SHUFFLE: &str = "Shuffle";
pub const LABEL_REPEAT: &str = "Repeat";

pub const ICON_HEART_OUTLINE: &str = "heart_outline";
pub const ICON_HEART_FILLED: &str = "heart_filled";
pub const ICON_SHUFFLE_ON: &str = "shuffle_on";
pub const ICON_SHUFFLE_OFF: &str = "shuffle_off";
pub const ICON_REPEAT_ALL: &str = "repeat_all";
pub const ICON_REPEAT_OFF: &str = "repeat_off";
pub const ICON_REPEAT_ONE: &str = "repeat_one";

const PLAYBACK_SPEED: f32 = 1.0;

/// Transport commands a controller may issue. `seekable` holds for a loaded
/// track with a bounded duration.
pub fn capabilities(seekable: bool, has_next: bool, has_previous: bool) -> Capabilities {
    let mut caps =
        Capabilities::PLAY | Capabilities::PAUSE | Capabilities::PLAY_PAUSE | Capabilities::STOP;

    if seekable {
        caps |= Capabilities::SEEK | Capabilities::FAST_FORWARD | Capabilities::REWIND;
    }
    if has_next {
        caps |= Capabilities::SKIP_NEXT;
    }
    if has_previous {
        caps |= Capabilities::SKIP_PREVIOUS;
    }
    caps
}

/// Transport snapshot anchored at `anchor_ms`.
pub fn transport_state(state: &PlaybackState, anchor_ms: i64) -> TransportState {
    let status = if state.status == PlaybackStatus::Error {
        TransportStatus::Error
    } else if state.is_playing {
        TransportStatus::Playing
    } else {
        TransportStatus::Paused
    };

    TransportState {
        status,
        position_ms: (!state.is_live()).then_some(state.position_ms),
        speed: PLAYBACK_SPEED,
        updated_at_ms: anchor_ms,
        capabilities: capabilities(
            state.current_track.is_some() && !state.is_live(),
            state.has_next,
            state.has_previous,
        ),
        error_message: match status {
            TransportStatus::Error => state.error.clone(),
            _ => None,
        },
    }
}

/// Favorite, shuffle and repeat buttons reflecting their current values.
pub fn custom_actions(state: &PlaybackState) -> Vec<CustomAction> {
    let favorite = state.is_favorite();

    vec![
        CustomAction {
            action: CustomActionKind::ToggleFavorite,
            label: if favorite {
                LABEL_REMOVE_FAVORITE
            } else {
                LABEL_ADD_FAVORITE
            }
            .to_string(),
            icon: if favorite {
                ICON_HEART_FILLED
            } else {
                ICON_HEART_OUTLINE
            }
            .to_string(),
        },
        CustomAction {
            action: CustomActionKind::ToggleShuffle,
            label: LABEL_SHUFFLE.to_string(),
            icon: if state.shuffle_enabled {
                ICON_SHUFFLE_ON
            } else {
                ICON_SHUFFLE_OFF
            }
            .to_string(),
        },
        CustomAction {
            action: CustomActionKind::ToggleRepeat,
            label: LABEL_REPEAT.to_string(),
            icon: match state.repeat_mode {
                RepeatMode::All => ICON_REPEAT_ALL,
                RepeatMode::None => ICON_REPEAT_OFF,
                RepeatMode::One => ICON_REPEAT_ONE,
            }
            .to_string(),
        },
    ]
}

/// Now-playing metadata, or `None` with nothing loaded.
pub fn metadata(state: &PlaybackState) -> Option<MediaMetadata> {
    let track = state.current_track.as_ref()?;

    Some(MediaMetadata {
        media_id: track.id.clone(),
        title: track.title.clone(),
        artist: track.artist.clone(),
        display_title: track.title.clone(),
        display_subtitle: track.artist.clone(),
        display_description: track.description.clone(),
        artwork_uri: track.artwork_uri.clone(),
        duration_ms: track.duration_ms,
        artwork: state.artwork.clone(),
    })
}

/// Queue rows in playback order.
pub fn queue_entries(queue: &QueueState) -> Vec<QueueEntry> {
    queue
        .queue
        .iter()
        .enumerate()
        .map(|(position, track)| QueueEntry {
            queue_id: position as u64,
            media_id: track.id.clone(),
            title: track.title.clone(),
            subtitle: track.artist.clone(),
            description: track.description.clone(),
            media_uri: track.media_uri.clone(),
            icon_uri: track.artwork_uri.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::media::{Track, UNKNOWN_DURATION};

    fn playing(track: Track) -> PlaybackState {
        let duration_ms = track.duration_ms;
        PlaybackState {
            status: PlaybackStatus::Ready,
            current_track: Some(track),
            current_index: Some(0),
            duration_ms,
            position_ms: 12_000,
            is_playing: true,
            ..PlaybackState::default()
        }
    }

    #[test]
    fn bounded_content_allows_seeking() {
        let caps = capabilities(true, false, false);
        assert!(caps.contains(Capabilities::PLAY | Capabilities::PAUSE));
        assert!(caps.contains(Capabilities::PLAY_PAUSE | Capabilities::STOP));
        assert!(caps.contains(Capabilities::SEEK));
        assert!(caps.contains(Capabilities::FAST_FORWARD | Capabilities::REWIND));
        assert!(!caps.contains(Capabilities::SKIP_NEXT));
        assert!(!caps.contains(Capabilities::SKIP_PREVIOUS));
    }

    #[test]
    fn live_content_drops_seek_family() {
        let caps = capabilities(false, true, true);
        assert!(!caps.contains(Capabilities::SEEK));
        assert!(!caps.contains(Capabilities::FAST_FORWARD));
        assert!(!caps.contains(Capabilities::REWIND));
        assert!(caps.contains(Capabilities::SKIP_NEXT | Capabilities::SKIP_PREVIOUS));
        assert!(caps.contains(Capabilities::STOP));
    }

    #[test]
    fn nothing_loaded_offers_no_seeking() {
        let transport = transport_state(&PlaybackState::default(), 0);
        let caps = transport.capabilities;
        assert!(!caps.contains(Capabilities::SEEK));
        assert!(!caps.contains(Capabilities::FAST_FORWARD));
        assert!(!caps.contains(Capabilities::REWIND));
        assert!(caps.contains(Capabilities::PLAY | Capabilities::STOP));

        let loaded = transport_state(&playing(Track::new("a", "A").with_duration(60_000)), 0);
        assert!(loaded.capabilities.contains(Capabilities::SEEK));
    }

    #[test]
    fn transport_reports_position_and_anchor() {
        let state = playing(Track::new("a", "A").with_duration(60_000));
        let transport = transport_state(&state, 1_700_000_000_000);

        assert_eq!(transport.status, TransportStatus::Playing);
        assert_eq!(transport.position_ms, Some(12_000));
        assert_eq!(transport.updated_at_ms, 1_700_000_000_000);
        assert_eq!(transport.speed, 1.0);
        assert_eq!(transport.error_message, None);
    }

    #[test]
    fn live_transport_has_unknown_position() {
        let mut state = playing(Track::new("radio", "Radio").with_duration(UNKNOWN_DURATION));
        state.position_ms = UNKNOWN_DURATION;

        let transport = transport_state(&state, 0);
        assert_eq!(transport.position_ms, None);
        assert!(!transport.capabilities.contains(Capabilities::SEEK));
    }

    #[test]
    fn error_status_carries_message() {
        let mut state = playing(Track::new("a", "A").with_duration(60_000));
        state.status = PlaybackStatus::Error;
        state.is_playing = false;
        state.error = Some("decoder crashed".to_string());

        let transport = transport_state(&state, 0);
        assert_eq!(transport.status, TransportStatus::Error);
        assert_eq!(transport.error_message.as_deref(), Some("decoder crashed"));
    }

    #[test]
    fn paused_state_hides_stale_error_text() {
        let mut state = playing(Track::new("a", "A").with_duration(60_000));
        state.is_playing = false;
        state.error = Some("old".to_string());

        let transport = transport_state(&state, 0);
        assert_eq!(transport.status, TransportStatus::Paused);
        assert_eq!(transport.error_message, None);
    }

    #[test]
    fn custom_actions_follow_current_values() {
        let mut state = playing(Track::new("a", "A").with_favorite(true));
        state.shuffle_enabled = true;
        state.repeat_mode = RepeatMode::One;

        let actions = custom_actions(&state);
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[0].label, LABEL_REMOVE_FAVORITE);
        assert_eq!(actions[0].icon, ICON_HEART_FILLED);
        assert_eq!(actions[1].icon, ICON_SHUFFLE_ON);
        assert_eq!(actions[2].icon, ICON_REPEAT_ONE);

        state.current_track = Some(Track::new("b", "B"));
        state.shuffle_enabled = false;
        state.repeat_mode = RepeatMode::All;
        let actions = custom_actions(&state);
        assert_eq!(actions[0].label, LABEL_ADD_FAVORITE);
        assert_eq!(actions[0].icon, ICON_HEART_OUTLINE);
        assert_eq!(actions[1].icon, ICON_SHUFFLE_OFF);
        assert_eq!(actions[2].icon, ICON_REPEAT_ALL);
    }

    #[test]
    fn metadata_mirrors_track() {
        let track = Track::new("a", "Alpha")
            .with_artist("Band")
            .with_description("Opening track")
            .with_artwork("https://img/a.png")
            .with_duration(60_000);
        let meta = metadata(&playing(track)).unwrap();

        assert_eq!(meta.media_id, "a");
        assert_eq!(meta.display_title, "Alpha");
        assert_eq!(meta.display_subtitle.as_deref(), Some("Band"));
        assert_eq!(meta.display_description.as_deref(), Some("Opening track"));
        assert_eq!(meta.artwork_uri.as_deref(), Some("https://img/a.png"));
        assert_eq!(meta.duration_ms, 60_000);
        assert!(metadata(&PlaybackState::default()).is_none());
    }

    #[test]
    fn queue_rows_use_playback_positions() {
        let queue = QueueState {
            queue: vec![
                Track::new("c", "C").with_media("file:///c"),
                Track::new("a", "A").with_media("file:///a"),
            ],
            current_index: Some(0),
            ..QueueState::default()
        };

        let rows = queue_entries(&queue);
        assert_eq!(rows[0].queue_id, 0);
        assert_eq!(rows[0].media_id, "c");
        assert_eq!(rows[1].queue_id, 1);
        assert_eq!(rows[1].media_uri, "file:///a");
    }
}
