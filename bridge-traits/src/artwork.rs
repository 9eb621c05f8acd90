//! Artwork loading.

use crate::error::Result;
use bytes::Bytes;

/// Encoded artwork bytes. Decoding and scaling are left to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub uri: String,
    pub data: Bytes,
    pub mime_type: Option<String>,
}

impl Artwork {
    pub fn new(uri: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            uri: uri.into(),
            data: data.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

#[async_trait::async_trait]
pub trait ArtworkLoader: Send + Sync {
    /// Fetch the artwork referenced by `uri`.
    async fn load(&self, uri: &str) -> Result<Artwork>;
}
