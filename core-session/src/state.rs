use bridge_traits::artwork::Artwork;
use bridge_traits::notification::NotificationContent;
use bridge_traits::session::{MediaMetadata, SessionToken};

/// What the host needs to present the session outside the protocol, such as
/// the now-playing notification. Position is deliberately absent so ticks
/// do not produce new states.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub token: Option<SessionToken>,
    pub active: bool,
    pub metadata: Option<MediaMetadata>,
    pub artwork: Option<Artwork>,
    pub is_playing: bool,
    pub is_favorite: bool,
}

impl SessionState {
    pub fn notification(&self) -> NotificationContent {
        NotificationContent {
            session: self.token,
            metadata: self.metadata.clone(),
            artwork: self.artwork.clone(),
            is_playing: self.is_playing,
            is_favorite: self.is_favorite,
        }
    }
}
