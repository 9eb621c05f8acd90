//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the queue, playback and session engines:
//! - Logging and tracing setup with host sink forwarding
//! - [`CoreConfig`](config::CoreConfig) collaborator wiring and engine settings
//! - Event bus for engine transition diagnostics
//!
//! ## Overview
//!
//! Nothing in this crate holds playback state. It establishes the logging
//! conventions, the configuration surface and the broadcast channel every
//! engine crate depends on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{BrowseLabels, CoreConfig, CoreConfigBuilder, EngineSettings};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream};
