use bridge_traits::error::BridgeError;
use core_playback::PlaybackError;
use core_queue::QueueError;
use core_session::SessionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl CoreError {
    /// Unknown track or parent id, from any layer.
    pub fn is_not_found(&self) -> bool {
        match self {
            CoreError::Queue(e) => e.is_not_found(),
            CoreError::Playback(e) => e.is_not_found(),
            CoreError::Session(SessionError::Playback(e)) => e.is_not_found(),
            CoreError::Session(SessionError::Queue(e)) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_focus_denied(&self) -> bool {
        matches!(
            self,
            CoreError::Playback(PlaybackError::FocusDenied)
                | CoreError::Session(SessionError::Playback(PlaybackError::FocusDenied))
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
