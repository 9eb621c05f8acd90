//! Artwork loading from disk or HTTP.

use async_trait::async_trait;
use bridge_traits::{
    artwork::{Artwork, ArtworkLoader},
    error::{BridgeError, Result},
};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// Resolves `file://` uris and bare paths with `tokio::fs`, and `http(s)://`
/// uris with `reqwest`.
pub struct DesktopArtworkLoader {
    client: Client,
}

impl DesktopArtworkLoader {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(15))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent("media-core/0.1.0")
            .build()
            .map_err(|e| BridgeError::OperationFailed(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn mime_from_extension(path: &str) -> Option<String> {
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        let mime = match ext.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            _ => return None,
        };
        Some(mime.to_string())
    }

    async fn load_remote(&self, uri: &str) -> Result<Artwork> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::OperationFailed(format!(
                "HTTP {} for {uri}",
                status.as_u16()
            )));
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| Self::mime_from_extension(uri));
        let data = response
            .bytes()
            .await
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;
        debug!(uri, size = data.len(), "Fetched remote artwork");
        Ok(Artwork {
            uri: uri.to_string(),
            data,
            mime_type,
        })
    }

    async fn load_local(&self, uri: &str) -> Result<Artwork> {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        let data = fs::read(path).await?;
        debug!(path, size = data.len(), "Read local artwork");
        Ok(Artwork {
            uri: uri.to_string(),
            data: data.into(),
            mime_type: Self::mime_from_extension(path),
        })
    }
}

#[async_trait]
impl ArtworkLoader for DesktopArtworkLoader {
    async fn load(&self, uri: &str) -> Result<Artwork> {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            self.load_remote(uri).await
        } else if uri.is_empty() {
            Err(BridgeError::Rejected("empty artwork uri".to_string()))
        } else {
            self.load_local(uri).await
        }
    }
}
