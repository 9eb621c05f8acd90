//! Errors raised while assembling or configuring the media core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A setting or label is out of range, or a config file is unreadable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required host collaborator was neither injected nor provided by a shim.
    #[error("Missing collaborator {capability}: {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
