//! # Playback Engine
//!
//! Drives the render device from the active queue.
//!
//! ## Overview
//!
//! This crate handles:
//! - Mirroring queue versions into the device's item list
//! - Transport commands: play, pause, stop, seek, fast-forward, rewind, skip
//! - Audio-focus arbitration, including ducking and transient loss
//! - Position tracking through a cancellable ticker
//! - Debounced favorite toggles
//!
//! ## Usage
//!
//! ```ignore
//! let playback = PlaybackEngine::spawn(device, focus, None, queue, clock, &settings, None);
//! playback.play_from_parent("album-1", 0).await?;
//! assert!(playback.state().is_playing);
//! ```

pub mod engine;
pub mod error;
pub mod favorite;
pub mod focus;
pub mod state;
pub mod ticker;

pub use engine::{PlaybackEngine, PlaybackHandle};
pub use error::{PlaybackError, Result};
pub use focus::{FocusAction, FocusController, FocusState};
pub use state::{PlaybackState, PlaybackStatus};
