//! # Core Configuration Module
//!
//! Builds the [`CoreConfig`] that wires the media core to its host.
//!
//! ## Overview
//!
//! The builder collects collaborator implementations and engine settings, and
//! fails fast when a required collaborator is missing.
//!
//! ## Required Collaborators
//!
//! - `CatalogSource` - authoritative track catalog
//! - `RenderDevice` - decode/render engine
//! - `AudioFocusArbitrator` - OS audio focus
//! - `SessionProtocol` - media session exposed to controllers
//!
//! ## Optional Collaborators
//!
//! - `ArtworkLoader` - artwork bytes for the current track
//! - `NotificationRenderer` - now-playing notification
//! - `Clock` - defaults to `SystemClock`
//! - `EventBus` - transition events for diagnostics
//!
//! With the `desktop-shims` feature, missing required collaborators default
//! to the in-process implementations from `bridge-desktop`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, EngineSettings};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .catalog(Arc::new(MyCatalog::new()))
//!     .render_device(Arc::new(MyDevice::new()))
//!     .focus(Arc::new(MyFocus::new()))
//!     .session_protocol(Arc::new(MySession::new()))
//!     .settings(EngineSettings::from_json(r#"{"seek_step_ms": 10000}"#)?)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::{EventBus, DEFAULT_EVENT_BUFFER_SIZE};
use bridge_traits::{
    ArtworkLoader, AudioFocusArbitrator, CatalogSource, Clock, NotificationRenderer,
    RenderDevice, SessionProtocol, SystemClock,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default tag passed to `SessionProtocol::create_session`.
pub const DEFAULT_SESSION_TAG: &str = "media-core";

/// Fully wired configuration. Build with [`CoreConfig::builder`].
#[derive(Clone)]
pub struct CoreConfig {
    pub catalog: Arc<dyn CatalogSource>,
    pub render_device: Arc<dyn RenderDevice>,
    pub focus: Arc<dyn AudioFocusArbitrator>,
    pub session_protocol: Arc<dyn SessionProtocol>,
    pub artwork_loader: Option<Arc<dyn ArtworkLoader>>,
    pub notification_renderer: Option<Arc<dyn NotificationRenderer>>,
    pub clock: Arc<dyn Clock>,
    pub event_bus: Option<EventBus>,
    pub settings: EngineSettings,
    pub browse_labels: BrowseLabels,
    pub session_tag: String,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("catalog", &"CatalogSource { ... }")
            .field("render_device", &"RenderDevice { ... }")
            .field("focus", &"AudioFocusArbitrator { ... }")
            .field("session_protocol", &"SessionProtocol { ... }")
            .field(
                "artwork_loader",
                &self.artwork_loader.as_ref().map(|_| "ArtworkLoader { ... }"),
            )
            .field(
                "notification_renderer",
                &self
                    .notification_renderer
                    .as_ref()
                    .map(|_| "NotificationRenderer { ... }"),
            )
            .field("event_bus", &self.event_bus)
            .field("settings", &self.settings)
            .field("browse_labels", &self.browse_labels)
            .field("session_tag", &self.session_tag)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_tag.trim().is_empty() {
            return Err(Error::Config("Session tag cannot be empty".to_string()));
        }
        self.settings.validate()?;
        self.browse_labels.validate()
    }
}

// ============================================================================
// Engine settings
// ============================================================================

fn default_seek_step_ms() -> i64 {
    15_000
}

fn default_duck_volume() -> f32 {
    0.15
}

fn default_position_tick_ms() -> u64 {
    1_000
}

fn default_favorite_debounce_ms() -> u64 {
    500
}

fn default_autoplay_on_load() -> bool {
    true
}

fn default_command_buffer() -> usize {
    64
}

fn default_event_buffer_size() -> usize {
    DEFAULT_EVENT_BUFFER_SIZE
}

/// Tunables for the three engines. Loadable from JSON; absent fields take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Fast-forward / rewind step.
    #[serde(default = "default_seek_step_ms")]
    pub seek_step_ms: i64,

    /// Output volume while ducked.
    #[serde(default = "default_duck_volume")]
    pub duck_volume: f32,

    /// Period of the position ticker while playing.
    #[serde(default = "default_position_tick_ms")]
    pub position_tick_ms: u64,

    /// Window in which repeated favorite taps on the same track coalesce.
    #[serde(default = "default_favorite_debounce_ms")]
    pub favorite_debounce_ms: u64,

    /// Start playing as soon as a new queue is loaded.
    #[serde(default = "default_autoplay_on_load")]
    pub autoplay_on_load: bool,

    /// Capacity of each engine's command channel.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// Fixed shuffle seed for reproducible permutations.
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            seek_step_ms: default_seek_step_ms(),
            duck_volume: default_duck_volume(),
            position_tick_ms: default_position_tick_ms(),
            favorite_debounce_ms: default_favorite_debounce_ms(),
            autoplay_on_load: default_autoplay_on_load(),
            command_buffer: default_command_buffer(),
            event_buffer_size: default_event_buffer_size(),
            shuffle_seed: None,
        }
    }
}

impl EngineSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid engine settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Cannot read engine settings {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.seek_step_ms <= 0 {
            return Err(Error::Config(
                "seek_step_ms must be greater than 0".to_string(),
            ));
        }

        if !(self.duck_volume > 0.0 && self.duck_volume <= 1.0) {
            return Err(Error::Config(
                "duck_volume must be within (0, 1]".to_string(),
            ));
        }

        if !(50..=60_000).contains(&self.position_tick_ms) {
            return Err(Error::Config(
                "position_tick_ms must be between 50 and 60,000".to_string(),
            ));
        }

        if self.favorite_debounce_ms > 10_000 {
            return Err(Error::Config(
                "favorite_debounce_ms exceeds maximum of 10 seconds (10,000ms)".to_string(),
            ));
        }

        if self.command_buffer == 0 {
            return Err(Error::Config(
                "command_buffer must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Titles and icons of the two fixed browse-root nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseLabels {
    pub favorites_title: String,
    pub all_title: String,
    #[serde(default)]
    pub favorites_icon: Option<String>,
    #[serde(default)]
    pub all_icon: Option<String>,
}

impl Default for BrowseLabels {
    fn default() -> Self {
        Self {
            favorites_title: "Favorites".to_string(),
            all_title: "All".to_string(),
            favorites_icon: None,
            all_icon: None,
        }
    }
}

impl BrowseLabels {
    pub fn validate(&self) -> Result<()> {
        if self.favorites_title.trim().is_empty() || self.all_title.trim().is_empty() {
            return Err(Error::Config(
                "Browse root titles cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Collaborator defaults
// ============================================================================

fn capability_missing(capability: &str, purpose: &str, shim: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{capability} implementation is required for {purpose}. \
             Desktop: enable the 'desktop-shims' feature to use the default {shim}. \
             Embedded hosts: inject the platform implementation through CoreConfig::builder()."
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_catalog(path: Option<&Path>) -> Result<Arc<dyn CatalogSource>> {
    use bridge_desktop::JsonCatalogSource;

    let catalog = match path {
        Some(path) => {
            tracing::info!(
                "Using JSON catalog {}",
                crate::logging::strip_path(&path.to_string_lossy())
            );
            JsonCatalogSource::from_path(path)
        }
        None => {
            tracing::warn!("No catalog configured; starting with an empty one");
            JsonCatalogSource::empty()
        }
    };
    Ok(Arc::new(catalog))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_catalog(_path: Option<&Path>) -> Result<Arc<dyn CatalogSource>> {
    Err(capability_missing(
        "CatalogSource",
        "building queues and the browse tree",
        "JsonCatalogSource",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_render_device() -> Result<Arc<dyn RenderDevice>> {
    Ok(Arc::new(bridge_desktop::HeadlessRenderDevice::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_render_device() -> Result<Arc<dyn RenderDevice>> {
    Err(capability_missing(
        "RenderDevice",
        "audio output",
        "HeadlessRenderDevice",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_focus() -> Result<Arc<dyn AudioFocusArbitrator>> {
    Ok(Arc::new(bridge_desktop::FocusBroker::new().client()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_focus() -> Result<Arc<dyn AudioFocusArbitrator>> {
    Err(capability_missing(
        "AudioFocusArbitrator",
        "audio focus arbitration",
        "FocusBroker client",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_session_protocol() -> Result<Arc<dyn SessionProtocol>> {
    Ok(Arc::new(bridge_desktop::ChannelSessionProtocol::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_session_protocol() -> Result<Arc<dyn SessionProtocol>> {
    Err(capability_missing(
        "SessionProtocol",
        "exposing playback to media controllers",
        "ChannelSessionProtocol",
    ))
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    catalog: Option<Arc<dyn CatalogSource>>,
    catalog_path: Option<PathBuf>,
    render_device: Option<Arc<dyn RenderDevice>>,
    focus: Option<Arc<dyn AudioFocusArbitrator>>,
    session_protocol: Option<Arc<dyn SessionProtocol>>,
    artwork_loader: Option<Arc<dyn ArtworkLoader>>,
    notification_renderer: Option<Arc<dyn NotificationRenderer>>,
    clock: Option<Arc<dyn Clock>>,
    event_bus: Option<EventBus>,
    with_event_bus: bool,
    settings: Option<EngineSettings>,
    browse_labels: Option<BrowseLabels>,
    session_tag: Option<String>,
}

impl CoreConfigBuilder {
    pub fn catalog(mut self, catalog: Arc<dyn CatalogSource>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// JSON file for the default desktop catalog. Ignored when a catalog is
    /// injected.
    pub fn catalog_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    pub fn render_device(mut self, device: Arc<dyn RenderDevice>) -> Self {
        self.render_device = Some(device);
        self
    }

    pub fn focus(mut self, focus: Arc<dyn AudioFocusArbitrator>) -> Self {
        self.focus = Some(focus);
        self
    }

    pub fn session_protocol(mut self, protocol: Arc<dyn SessionProtocol>) -> Self {
        self.session_protocol = Some(protocol);
        self
    }

    pub fn artwork_loader(mut self, loader: Arc<dyn ArtworkLoader>) -> Self {
        self.artwork_loader = Some(loader);
        self
    }

    pub fn notification_renderer(mut self, renderer: Arc<dyn NotificationRenderer>) -> Self {
        self.notification_renderer = Some(renderer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Publish engine transitions on `bus`.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Create an event bus sized by `EngineSettings::event_buffer_size`.
    pub fn enable_events(mut self, enabled: bool) -> Self {
        self.with_event_bus = enabled;
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn browse_labels(mut self, labels: BrowseLabels) -> Self {
        self.browse_labels = Some(labels);
        self
    }

    pub fn session_tag(mut self, tag: impl Into<String>) -> Self {
        self.session_tag = Some(tag.into());
        self
    }

    /// Resolve defaults and validate.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when a required collaborator is absent
    ///   and `desktop-shims` is disabled
    /// - [`Error::Config`] when a setting is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => provide_default_catalog(self.catalog_path.as_deref())?,
        };

        let render_device = match self.render_device {
            Some(device) => device,
            None => provide_default_render_device()?,
        };

        let focus = match self.focus {
            Some(focus) => focus,
            None => provide_default_focus()?,
        };

        let session_protocol = match self.session_protocol {
            Some(protocol) => protocol,
            None => provide_default_session_protocol()?,
        };

        let settings = self.settings.unwrap_or_default();
        let event_bus = match (self.event_bus, self.with_event_bus) {
            (Some(bus), _) => Some(bus),
            (None, true) => Some(EventBus::new(settings.event_buffer_size)),
            (None, false) => None,
        };

        let config = CoreConfig {
            catalog,
            render_device,
            focus,
            session_protocol,
            artwork_loader: self.artwork_loader,
            notification_renderer: self.notification_renderer,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_bus,
            settings,
            browse_labels: self.browse_labels.unwrap_or_default(),
            session_tag: self
                .session_tag
                .unwrap_or_else(|| DEFAULT_SESSION_TAG.to_string()),
        };

        config.validate()?;
        Ok(config)
    }
}
