//! # Desktop Bridge Implementations
//!
//! In-process implementations of the collaborator traits for desktop hosts
//! and head-unit simulators.
//!
//! ## Overview
//!
//! - [`JsonCatalogSource`] loads the catalog from a JSON file and keeps
//!   favorites in memory
//! - [`HeadlessRenderDevice`] runs a silent timeline that behaves like a real
//!   decoder (transitions, natural end, repeat)
//! - [`FocusBroker`] arbitrates audio focus between [`FocusClient`]s in the
//!   same process
//! - [`ChannelSessionProtocol`] exposes the media session to in-process
//!   controllers through [`SessionController`]
//! - [`DesktopArtworkLoader`] reads artwork from disk or over HTTP with
//!   `reqwest`
//! - [`LoggingNotificationRenderer`] writes notification updates to `tracing`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FocusBroker, HeadlessRenderDevice, JsonCatalogSource};
//!
//! let broker = FocusBroker::new();
//! let catalog = JsonCatalogSource::from_path("catalog.json");
//! let device = HeadlessRenderDevice::new();
//! let focus = broker.client();
//! ```

mod artwork;
mod catalog;
mod device;
mod focus;
mod notification;
mod session;

pub use artwork::DesktopArtworkLoader;
pub use catalog::JsonCatalogSource;
pub use device::HeadlessRenderDevice;
pub use focus::{FocusBroker, FocusClient};
pub use notification::LoggingNotificationRenderer;
pub use session::{ChannelSessionProtocol, PublishedSession, SessionController};
