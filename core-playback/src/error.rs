//! # Playback Error Types

use bridge_traits::error::BridgeError;
use core_queue::QueueError;
use thiserror::Error;

/// Errors returned by the playback engine.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Audio focus was requested and refused. Nothing was started.
    #[error("Audio focus denied")]
    FocusDenied,

    /// The render device rejected or failed a command.
    #[error("Render device error: {0}")]
    Device(#[from] BridgeError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The focus arbitrator itself failed (as opposed to refusing).
    #[error("Audio focus error: {0}")]
    Focus(#[source] BridgeError),

    #[error("Playback engine is no longer running")]
    EngineClosed,
}

impl PlaybackError {
    /// Errors that reach external listeners rather than only the caller.
    pub fn is_surfaced(&self) -> bool {
        matches!(self, PlaybackError::FocusDenied | PlaybackError::Device(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PlaybackError::Queue(e) if e.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
