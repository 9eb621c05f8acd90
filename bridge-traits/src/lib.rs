//! # Host Bridge Traits
//!
//! Collaborator contracts between the media core and the host environment.
//!
//! ## Overview
//!
//! The core orchestrates playback but owns none of the platform pieces it
//! drives. Each trait in this crate names one capability the core requires
//! from its host:
//!
//! ### Content
//! - [`CatalogSource`](catalog::CatalogSource) - Authoritative track catalog with favorite writes
//! - [`ArtworkLoader`](artwork::ArtworkLoader) - Fetches artwork bytes for the current track
//!
//! ### Audio
//! - [`RenderDevice`](device::RenderDevice) - Decode/render engine driven by the Playback Engine
//! - [`AudioFocusArbitrator`](focus::AudioFocusArbitrator) - OS-level exclusive audio focus
//!
//! ### Host surfaces
//! - [`SessionProtocol`](session::SessionProtocol) - Media-session handle exposed to controllers
//! - [`MediaBrowser`](session::MediaBrowser) - Browse tree answered by the core
//! - [`NotificationRenderer`](notification::NotificationRenderer) - Platform notification surface
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Implementations
//!
//! | Flavour | Location | Use |
//! |----------|---------------------|--------|
//! | In-process production | `bridge-desktop` | Desktop hosts, head-unit simulators |
//! | In-memory fakes | [`fakes`] (feature `test-utils`) | Deterministic tests |
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required collaborator is
//! missing:
//!
//! ```ignore
//! let catalog = builder.catalog
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "CatalogSource".to_string(),
//!         message: "Inject a catalog or enable the 'desktop-shims' feature.".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it with an actionable message.
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync` so a single handle can be shared between
//! the engine actors through `Arc<dyn Trait>`.

pub mod artwork;
pub mod catalog;
pub mod device;
pub mod error;
pub mod focus;
pub mod media;
pub mod notification;
pub mod session;
pub mod time;

#[cfg(any(test, feature = "test-utils"))]
pub mod fakes;

pub use error::BridgeError;

// Re-export commonly used types
pub use artwork::{Artwork, ArtworkLoader};
pub use catalog::{CatalogSnapshot, CatalogSource};
pub use device::{
    DeviceEvent, DeviceEventSender, DeviceSnapshot, DeviceStatus, RenderDevice, RenderItem,
    TransitionReason,
};
pub use focus::{AudioFocusArbitrator, FocusChange, FocusChangeSender, FocusGrant, FocusUsage};
pub use media::{RepeatMode, Track, UNKNOWN_DURATION};
pub use notification::{NotificationContent, NotificationRenderer};
pub use session::{
    BrowseFlag, BrowseItem, Capabilities, CustomAction, CustomActionKind, MediaBrowser, MediaKey,
    MediaMetadata, QueueEntry, SessionCommand, SessionCommandSender, SessionProtocol,
    SessionToken, TransportState, TransportStatus,
};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
