//! # Session Error Types

use bridge_traits::error::BridgeError;
use core_playback::PlaybackError;
use core_queue::QueueError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session protocol error: {0}")]
    Protocol(#[from] BridgeError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Session bridge is closed")]
    Closed,
}

impl SessionError {
    /// Errors that controllers and listeners get to see.
    pub fn is_surfaced(&self) -> bool {
        matches!(self, SessionError::Playback(e) if e.is_surfaced())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_denial_is_surfaced() {
        let error = SessionError::from(PlaybackError::FocusDenied);
        assert!(error.is_surfaced());
        assert!(!SessionError::Closed.is_surfaced());
        assert!(!SessionError::from(BridgeError::NotAvailable("gone".into())).is_surfaced());
    }
}
