//! Notification surface.
//!
//! Building and styling the platform notification is the host's job. The core
//! only hands it the content to show.

use crate::{
    artwork::Artwork,
    error::Result,
    session::{MediaMetadata, SessionToken},
};

/// Everything the host needs to draw the now-playing notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationContent {
    pub session: Option<SessionToken>,
    pub metadata: Option<MediaMetadata>,
    pub artwork: Option<Artwork>,
    pub is_playing: bool,
    pub is_favorite: bool,
}

#[async_trait::async_trait]
pub trait NotificationRenderer: Send + Sync {
    async fn render(&self, content: NotificationContent) -> Result<()>;

    /// Remove the notification. Idempotent.
    async fn clear(&self) -> Result<()>;
}
