//! # Event Bus System
//!
//! Typed, fire-and-forget notifications from the engines, published over a
//! `broadcast` channel.
//!
//! ## Overview
//!
//! State itself is observed through each engine's `watch` channel. The bus
//! carries the *transitions* (a queue was rebuilt, focus was lost, a favorite
//! write failed) for hosts that want an audit trail, analytics or diagnostics
//! without diffing snapshots.
//!
//! ```text
//! ┌──────────────┐  emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ Queue Engine ├────────>│           ├────────────>│ Subscriber │
//! ├──────────────┤         │ EventBus  │             └────────────┘
//! │ Playback Eng ├────────>│ (broadcast│  subscribe  ┌────────────┐
//! ├──────────────┤         │  channel) ├────────────>│ Subscriber │
//! │ Session Brdg ├────────>│           │             └────────────┘
//! └──────────────┘         └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, PlaybackEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut errors = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Playback(PlaybackEvent::Error { .. })));
//!
//! bus.emit(CoreEvent::Playback(PlaybackEvent::Error {
//!     track_id: None,
//!     message: "decoder crashed".to_string(),
//! }))
//! .ok();
//!
//! assert!(errors.recv().await.is_ok());
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep
//!   receiving.
//! - **`RecvError::Closed`**: every sender was dropped, i.e. shutdown.
//!
//! Emitting with no subscribers returns an error that publishers ignore.

use bridge_traits::{focus::FocusChange, media::RepeatMode};
use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Queue(QueueEvent),
    Playback(PlaybackEvent),
    Session(SessionEvent),
    Catalog(CatalogEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Queue(e) => e.description(),
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Session(e) => e.description(),
            CoreEvent::Catalog(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Catalog(CatalogEvent::RefreshFailed { .. })
            | CoreEvent::Catalog(CatalogEvent::FavoriteWriteFailed { .. })
            | CoreEvent::Playback(PlaybackEvent::FocusDenied) => EventSeverity::Warning,
            CoreEvent::Queue(QueueEvent::Built { .. })
            | CoreEvent::Playback(PlaybackEvent::TrackChanged { .. })
            | CoreEvent::Session(SessionEvent::Activated { .. })
            | CoreEvent::Session(SessionEvent::Released) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Queue Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// Membership or order changed.
    Built {
        version: u64,
        source: String,
        length: usize,
        start_index: Option<usize>,
    },
    Navigated {
        index: usize,
        track_id: String,
    },
    ShuffleChanged {
        enabled: bool,
        version: u64,
    },
    RepeatChanged {
        mode: RepeatMode,
    },
    FavoriteToggled {
        track_id: String,
        is_favorite: bool,
    },
    Cleared {
        version: u64,
    },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::Built { .. } => "Queue built",
            QueueEvent::Navigated { .. } => "Queue position changed",
            QueueEvent::ShuffleChanged { .. } => "Shuffle toggled",
            QueueEvent::RepeatChanged { .. } => "Repeat mode changed",
            QueueEvent::FavoriteToggled { .. } => "Favorite toggled",
            QueueEvent::Cleared { .. } => "Queue cleared",
        }
    }
}

// ============================================================================
// Playback Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    Started {
        track_id: String,
        title: String,
    },
    Paused {
        track_id: String,
        position_ms: i64,
    },
    Stopped {
        track_id: Option<String>,
    },
    TrackChanged {
        track_id: String,
        index: usize,
    },
    /// The last item finished with nothing queued after it.
    Ended,
    FocusChanged {
        change: FocusChange,
    },
    FocusDenied,
    VolumeChanged {
        volume: f32,
    },
    Error {
        track_id: Option<String>,
        message: String,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Stopped { .. } => "Playback stopped",
            PlaybackEvent::TrackChanged { .. } => "Track changed",
            PlaybackEvent::Ended => "Queue finished",
            PlaybackEvent::FocusChanged { .. } => "Audio focus changed",
            PlaybackEvent::FocusDenied => "Audio focus denied",
            PlaybackEvent::VolumeChanged { .. } => "Volume changed",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Session Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    Activated { session: String },
    Deactivated { session: String },
    CommandReceived { command: String },
    Released,
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::Activated { .. } => "Media session activated",
            SessionEvent::Deactivated { .. } => "Media session deactivated",
            SessionEvent::CommandReceived { .. } => "Controller command received",
            SessionEvent::Released => "Media session released",
        }
    }
}

// ============================================================================
// Catalog Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CatalogEvent {
    Loaded {
        item_count: usize,
        /// Entries dropped because their id collides with a reserved id.
        dropped: usize,
    },
    RefreshFailed {
        message: String,
    },
    FavoriteWriteFailed {
        track_id: String,
        message: String,
    },
}

impl CatalogEvent {
    fn description(&self) -> &str {
        match self {
            CatalogEvent::Loaded { .. } => "Catalog loaded",
            CatalogEvent::RefreshFailed { .. } => "Catalog refresh failed",
            CatalogEvent::FavoriteWriteFailed { .. } => "Favorite write failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Cloneable handle to the broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Fails only when nobody is subscribed.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver with an optional predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive; `None` when nothing matching is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
