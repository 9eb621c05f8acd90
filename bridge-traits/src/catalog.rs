//! Content catalog contract.

use crate::{error::Result, media::Track};
use core_async::sync::watch;
use serde::{Deserialize, Serialize};

/// Latest catalog contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub items: Vec<Track>,
    /// True while a repopulation triggered by [`CatalogSource::fetch_all`] is in flight.
    pub loading: bool,
}

impl CatalogSnapshot {
    pub fn new(items: Vec<Track>) -> Self {
        Self {
            items,
            loading: false,
        }
    }

    pub fn loading() -> Self {
        Self {
            items: Vec::new(),
            loading: true,
        }
    }
}

/// Authoritative track collection.
///
/// The catalog publishes its contents with replay-latest semantics: a new
/// subscriber sees the current snapshot right away, then every republication.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::catalog::CatalogSource;
///
/// async fn favorite_first(catalog: &dyn CatalogSource) -> bridge_traits::error::Result<()> {
///     let snapshot = catalog.subscribe().borrow().clone();
///     if let Some(track) = snapshot.items.first() {
///         catalog.set_favorite(&track.id, true).await?;
///     }
///     Ok(())
/// }
/// ```
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    /// Subscribe to catalog snapshots.
    fn subscribe(&self) -> watch::Receiver<CatalogSnapshot>;

    /// Trigger a repopulation. Completion is observed through [`subscribe`](Self::subscribe).
    async fn fetch_all(&self) -> Result<()>;

    /// Persist a favorite flag and republish the catalog.
    async fn set_favorite(&self, id: &str, value: bool) -> Result<()>;
}
