use bridge_traits::error::BridgeError;
use std::fmt;
use thiserror::Error;

/// What a failed lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Parent,
    Track,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKind::Parent => write!(f, "Parent"),
            LookupKind::Track => write!(f, "Track"),
        }
    }
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: LookupKind, id: String },

    #[error("Catalog error: {0}")]
    Catalog(#[from] BridgeError),

    #[error("Queue engine is no longer running")]
    EngineClosed,
}

impl QueueError {
    pub fn parent_not_found(id: impl Into<String>) -> Self {
        QueueError::NotFound {
            kind: LookupKind::Parent,
            id: id.into(),
        }
    }

    pub fn track_not_found(id: impl Into<String>) -> Self {
        QueueError::NotFound {
            kind: LookupKind::Track,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, QueueError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
