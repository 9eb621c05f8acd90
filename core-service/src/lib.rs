//! Media service facade and bootstrap helpers.
//!
//! This crate wires host-provided collaborators (catalog, render device,
//! audio focus, media-session protocol) into the queue, playback and session
//! engines. Desktop hosts and head-unit simulators typically enable the
//! `desktop-shims` feature, which fills every missing collaborator with the
//! in-process implementations from `bridge-desktop`. Embedded hosts inject
//! their platform implementations through [`CoreConfig::builder`].
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .catalog(catalog)
//!     .render_device(device)
//!     .focus(focus)
//!     .session_protocol(protocol)
//!     .build()?;
//! let media = MediaService::start(config).await?;
//! media.play_from_parent("album-1", 0).await?;
//! media.shutdown().await?;
//! ```

pub mod error;
pub mod service;

pub use error::{CoreError, Result};
pub use service::MediaService;

pub use core_playback::{PlaybackState, PlaybackStatus};
pub use core_queue::{QueueState, SortCriterion};
pub use core_runtime::{BrowseLabels, CoreConfig, CoreConfigBuilder, EngineSettings};
pub use core_session::{ListenerId, MediaStateListener, SessionState};

#[cfg(feature = "desktop-shims")]
use std::{path::PathBuf, sync::Arc};

/// Start a service backed entirely by the desktop collaborators, reading the
/// catalog from `catalog_path`. Events are enabled.
///
/// ```no_run
/// # #[cfg(feature = "desktop-shims")]
/// # async fn example() -> core_service::Result<()> {
/// let media = core_service::bootstrap_desktop("catalog.json").await?;
/// media.play().await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(catalog_path: impl Into<PathBuf>) -> Result<MediaService> {
    use bridge_desktop::{DesktopArtworkLoader, LoggingNotificationRenderer};

    let config = CoreConfig::builder()
        .catalog_path(catalog_path)
        .artwork_loader(Arc::new(DesktopArtworkLoader::new()?))
        .notification_renderer(Arc::new(LoggingNotificationRenderer::new()))
        .enable_events(true)
        .build()?;

    MediaService::start(config).await
}
