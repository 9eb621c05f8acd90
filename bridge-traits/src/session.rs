//! Host media-session protocol.
//!
//! A protocol session is the OS-level handle through which external
//! controllers (lock screen, head unit, hardware keys) observe playback and
//! send transport commands. The core publishes snapshots into it and receives
//! [`SessionCommand`]s back through the sender handed to
//! [`SessionProtocol::attach`].

use crate::{artwork::Artwork, error::Result};
use core_async::sync::mpsc;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use uuid::Uuid;

/// Opaque handle for a protocol session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub Uuid);

impl SessionToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportStatus {
    Playing,
    Paused,
    Error,
}

/// Transport commands a controller is allowed to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const PLAY: Self = Self(1);
    pub const PAUSE: Self = Self(1 << 1);
    pub const PLAY_PAUSE: Self = Self(1 << 2);
    pub const STOP: Self = Self(1 << 3);
    pub const SEEK: Self = Self(1 << 4);
    pub const FAST_FORWARD: Self = Self(1 << 5);
    pub const REWIND: Self = Self(1 << 6);
    pub const SKIP_NEXT: Self = Self(1 << 7);
    pub const SKIP_PREVIOUS: Self = Self(1 << 8);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

/// Transport snapshot published to controllers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportState {
    pub status: TransportStatus,
    /// `None` for live content.
    pub position_ms: Option<i64>,
    pub speed: f32,
    /// Wall-clock anchor for position extrapolation.
    pub updated_at_ms: i64,
    pub capabilities: Capabilities,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomActionKind {
    ToggleFavorite,
    ToggleShuffle,
    ToggleRepeat,
}

impl CustomActionKind {
    /// Protocol-level action identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            CustomActionKind::ToggleFavorite => "toggle_favorite",
            CustomActionKind::ToggleShuffle => "toggle_shuffle",
            CustomActionKind::ToggleRepeat => "toggle_repeat",
        }
    }

    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "toggle_favorite" => Some(CustomActionKind::ToggleFavorite),
            "toggle_shuffle" => Some(CustomActionKind::ToggleShuffle),
            "toggle_repeat" => Some(CustomActionKind::ToggleRepeat),
            _ => None,
        }
    }
}

/// A controller-visible button beyond the standard transport set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomAction {
    pub action: CustomActionKind,
    pub label: String,
    pub icon: String,
}

/// Now-playing metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub media_id: String,
    pub title: String,
    pub artist: Option<String>,
    pub display_title: String,
    pub display_subtitle: Option<String>,
    pub display_description: Option<String>,
    pub artwork_uri: Option<String>,
    pub duration_ms: i64,
    #[serde(skip)]
    pub artwork: Option<Artwork>,
}

/// One row of the published queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Position in playback order.
    pub queue_id: u64,
    pub media_id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub media_uri: String,
    pub icon_uri: Option<String>,
}

/// Hardware or headset media key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKey {
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Previous,
    FastForward,
    Rewind,
}

/// Inbound command from a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionCommand {
    Play,
    Pause,
    Stop,
    SeekTo(i64),
    FastForward,
    Rewind,
    SkipToNext,
    SkipToPrevious,
    PlayFromId(String),
    PlayFromParent { parent_id: String, index: usize },
    CustomAction(CustomActionKind),
    MediaButton(MediaKey),
}

/// Channel on which the protocol forwards controller commands.
pub type SessionCommandSender = mpsc::UnboundedSender<SessionCommand>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrowseFlag {
    Browsable,
    Playable,
}

/// Node of the browse tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseItem {
    pub id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub icon_uri: Option<String>,
    pub flag: BrowseFlag,
}

/// Browse sub-protocol answered by the core.
pub trait MediaBrowser: Send + Sync {
    fn root_id(&self) -> String;

    /// Children of `parent_id`; empty for unknown ids.
    fn load_children(&self, parent_id: &str) -> Vec<BrowseItem>;
}

/// OS media-session handle.
#[async_trait::async_trait]
pub trait SessionProtocol: Send + Sync {
    async fn create_session(&self, tag: &str) -> Result<SessionToken>;

    async fn set_active(&self, active: bool) -> Result<()>;

    async fn set_transport_state(&self, state: TransportState) -> Result<()>;

    async fn set_metadata(&self, metadata: MediaMetadata) -> Result<()>;

    async fn set_queue(&self, title: Option<String>, items: Vec<QueueEntry>) -> Result<()>;

    async fn set_custom_actions(&self, actions: Vec<CustomAction>) -> Result<()>;

    /// Route controller commands to `commands` and browse requests to `browser`.
    fn attach(&self, commands: SessionCommandSender, browser: Arc<dyn MediaBrowser>);

    async fn release(&self) -> Result<()>;
}
