//! Notification renderer that logs instead of drawing.

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    notification::{NotificationContent, NotificationRenderer},
};
use parking_lot::Mutex;
use tracing::info;

/// Writes notification updates to `tracing` and remembers the last one.
#[derive(Default)]
pub struct LoggingNotificationRenderer {
    current: Mutex<Option<NotificationContent>>,
}

impl LoggingNotificationRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// What would currently be on screen.
    pub fn current(&self) -> Option<NotificationContent> {
        self.current.lock().clone()
    }
}

#[async_trait]
impl NotificationRenderer for LoggingNotificationRenderer {
    async fn render(&self, content: NotificationContent) -> Result<()> {
        let title = content
            .metadata
            .as_ref()
            .map(|metadata| metadata.display_title.as_str())
            .unwrap_or("");
        info!(
            title,
            playing = content.is_playing,
            favorite = content.is_favorite,
            artwork = content.artwork.is_some(),
            "Notification updated"
        );
        *self.current.lock() = Some(content);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        if self.current.lock().take().is_some() {
            info!("Notification cleared");
        }
        Ok(())
    }
}
