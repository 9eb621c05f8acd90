//! Browse tree served to head units.
//!
//! ```text
//! media-core://root
//! ├── media-core://favorites   favorite tracks as media-core://favorite/<id>
//! └── media-core://all         entries without a parent
//!     └── <parent id>          children of that entry
//! ```

use crate::index::CatalogIndex;
use crate::model::{favorite_item_id, ALL_ID, FAVORITES_ID, ROOT_ID};
use bridge_traits::media::Track;
use bridge_traits::session::{BrowseFlag, BrowseItem};
use core_runtime::config::BrowseLabels;

pub fn root_id() -> String {
    ROOT_ID.to_string()
}

/// The two fixed nodes under the root.
pub fn root_items(labels: &BrowseLabels) -> Vec<BrowseItem> {
    vec![
        BrowseItem {
            id: FAVORITES_ID.to_string(),
            title: labels.favorites_title.clone(),
            subtitle: None,
            icon_uri: labels.favorites_icon.clone(),
            flag: BrowseFlag::Browsable,
        },
        BrowseItem {
            id: ALL_ID.to_string(),
            title: labels.all_title.clone(),
            subtitle: None,
            icon_uri: labels.all_icon.clone(),
            flag: BrowseFlag::Browsable,
        },
    ]
}

/// Children of `parent_id`. Unknown ids yield an empty list.
pub fn children(index: &CatalogIndex, labels: &BrowseLabels, parent_id: &str) -> Vec<BrowseItem> {
    match parent_id {
        ROOT_ID => root_items(labels),
        FAVORITES_ID => index
            .favorites()
            .map(|track| BrowseItem {
                id: favorite_item_id(&track.id),
                ..browse_item(track)
            })
            .collect(),
        ALL_ID => index.top_level().map(browse_item).collect(),
        parent => index.children(parent).map(browse_item).collect(),
    }
}

fn browse_item(track: &Track) -> BrowseItem {
    BrowseItem {
        id: track.id.clone(),
        title: track.title.clone(),
        subtitle: track.artist.clone(),
        icon_uri: track.artwork_uri.clone(),
        flag: if track.is_playable() {
            BrowseFlag::Playable
        } else {
            BrowseFlag::Browsable
        },
    }
}
