//! Audio focus arbitration.
//!
//! Audio focus is the OS-arbitrated, process-wide right to render audio. The
//! Playback Engine is the only component that requests or abandons it.

use crate::error::Result;
use core_async::sync::mpsc;
use serde::{Deserialize, Serialize};

/// What the requester intends to do with focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FocusUsage {
    /// Long-lived media playback.
    Media,
    /// Short interruption; the current holder should pause.
    Transient,
    /// Short interruption; the current holder may keep playing quietly.
    TransientMayDuck,
}

/// Focus changes delivered to the current holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FocusChange {
    Gain,
    TransientLoss,
    TransientLossDuck,
    Loss,
}

/// Outcome of a focus request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusGrant {
    Granted,
    Denied,
}

impl FocusGrant {
    pub fn is_granted(self) -> bool {
        matches!(self, FocusGrant::Granted)
    }
}

/// Channel on which focus changes are delivered.
pub type FocusChangeSender = mpsc::UnboundedSender<FocusChange>;

/// OS focus arbitrator.
///
/// Each arbitrator handle represents one focus client. Requesting again while
/// holding focus refreshes the change listener and keeps the grant.
#[async_trait::async_trait]
pub trait AudioFocusArbitrator: Send + Sync {
    /// Ask for focus; changes are delivered on `on_change` until abandoned.
    async fn request(&self, usage: FocusUsage, on_change: FocusChangeSender)
        -> Result<FocusGrant>;

    /// Give focus back. Idempotent.
    async fn abandon(&self) -> Result<()>;
}
