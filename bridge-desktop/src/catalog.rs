//! JSON-file catalog.

use async_trait::async_trait;
use bridge_traits::{
    catalog::{CatalogSnapshot, CatalogSource},
    error::{BridgeError, Result},
    media::Track,
};
use core_async::sync::watch;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Catalog read from a JSON array of tracks.
///
/// Favorite flags written through [`CatalogSource::set_favorite`] live in an
/// in-memory overlay that survives refreshes but not restarts. Without a
/// backing file the catalog serves whatever it was constructed with.
pub struct JsonCatalogSource {
    path: Option<PathBuf>,
    snapshots: watch::Sender<CatalogSnapshot>,
    favorites: Mutex<HashMap<String, bool>>,
}

impl JsonCatalogSource {
    /// Catalog backed by `path`. Nothing is read until `fetch_all`.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let (snapshots, _) = watch::channel(CatalogSnapshot::default());
        Self {
            path: Some(path.into()),
            snapshots,
            favorites: Mutex::new(HashMap::new()),
        }
    }

    /// Fixed catalog with no backing file.
    pub fn from_tracks(items: Vec<Track>) -> Self {
        let (snapshots, _) = watch::channel(CatalogSnapshot::new(items));
        Self {
            path: None,
            snapshots,
            favorites: Mutex::new(HashMap::new()),
        }
    }

    pub fn empty() -> Self {
        Self::from_tracks(Vec::new())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn read_tracks(path: &Path) -> Result<Vec<Track>> {
        let data = fs::read(path).await?;
        let tracks: Vec<Track> = serde_json::from_slice(&data).map_err(|e| {
            BridgeError::OperationFailed(format!("invalid catalog {}: {e}", path.display()))
        })?;
        debug!(path = ?path, count = tracks.len(), "Read catalog file");
        Ok(tracks)
    }

    fn apply_overlay(&self, tracks: &mut [Track]) {
        let favorites = self.favorites.lock();
        for track in tracks.iter_mut() {
            if let Some(&value) = favorites.get(&track.id) {
                track.is_favorite = value;
            }
        }
    }

    fn current_items(&self) -> Vec<Track> {
        self.snapshots.borrow().items.clone()
    }
}

#[async_trait]
impl CatalogSource for JsonCatalogSource {
    fn subscribe(&self) -> watch::Receiver<CatalogSnapshot> {
        self.snapshots.subscribe()
    }

    async fn fetch_all(&self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            let items = self.current_items();
            self.snapshots.send_replace(CatalogSnapshot::new(items));
            return Ok(());
        };

        self.snapshots.send_modify(|snapshot| snapshot.loading = true);
        match Self::read_tracks(&path).await {
            Ok(mut tracks) => {
                self.apply_overlay(&mut tracks);
                info!(count = tracks.len(), "Catalog loaded");
                self.snapshots.send_replace(CatalogSnapshot::new(tracks));
                Ok(())
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Catalog refresh failed");
                self.snapshots.send_modify(|snapshot| snapshot.loading = false);
                Err(e)
            }
        }
    }

    async fn set_favorite(&self, id: &str, value: bool) -> Result<()> {
        let mut items = self.current_items();
        let track = items
            .iter_mut()
            .find(|track| track.id == id)
            .ok_or_else(|| BridgeError::Rejected(format!("unknown track {id}")))?;
        track.is_favorite = value;
        self.favorites.lock().insert(id.to_string(), value);
        debug!(id, value, "Favorite updated");
        self.snapshots.send_replace(CatalogSnapshot::new(items));
        Ok(())
    }
}
