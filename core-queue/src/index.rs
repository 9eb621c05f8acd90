//! Catalog lookup tables.
//!
//! Rebuilt from scratch on every catalog snapshot: a parent→children table
//! and an id→(group, position) table. Entries without a parent form the
//! top-level group listed under the "All" browse node.

use crate::model::is_reserved_id;
use bridge_traits::media::Track;
use std::collections::HashMap;
use tracing::warn;

/// Grouping key of a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Group {
    Parent(String),
    TopLevel,
}

impl Group {
    fn of(track: &Track) -> Self {
        match &track.parent_id {
            Some(parent) => Group::Parent(parent.clone()),
            None => Group::TopLevel,
        }
    }
}

/// Immutable snapshot of the catalog with lookup tables.
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    items: Vec<Track>,
    groups: HashMap<Group, Vec<usize>>,
    positions: HashMap<String, (Group, usize)>,
    by_id: HashMap<String, usize>,
    dropped: usize,
}

impl CatalogIndex {
    /// Index `tracks`. Entries using a reserved id, or repeating an id seen
    /// earlier, are dropped.
    pub fn build(tracks: Vec<Track>) -> Self {
        let mut index = CatalogIndex::default();

        for track in tracks {
            if is_reserved_id(&track.id) {
                warn!("Dropping catalog entry with reserved id {}", track.id);
                index.dropped += 1;
                continue;
            }
            if index.by_id.contains_key(&track.id) {
                warn!("Dropping duplicate catalog entry {}", track.id);
                index.dropped += 1;
                continue;
            }

            let slot = index.items.len();
            let group = Group::of(&track);
            let members = index.groups.entry(group.clone()).or_default();
            index
                .positions
                .insert(track.id.clone(), (group, members.len()));
            members.push(slot);
            index.by_id.insert(track.id.clone(), slot);
            index.items.push(track);
        }

        index
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries dropped while indexing.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn items(&self) -> &[Track] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&Track> {
        self.by_id.get(id).map(|&slot| &self.items[slot])
    }

    /// Group and position within the group.
    pub fn locate(&self, id: &str) -> Option<&(Group, usize)> {
        self.positions.get(id)
    }

    pub fn has_parent(&self, parent_id: &str) -> bool {
        self.groups
            .contains_key(&Group::Parent(parent_id.to_string()))
    }

    pub fn members(&self, group: &Group) -> impl Iterator<Item = &Track> {
        self.groups
            .get(group)
            .into_iter()
            .flatten()
            .map(|&slot| &self.items[slot])
    }

    pub fn children(&self, parent_id: &str) -> impl Iterator<Item = &Track> {
        self.members(&Group::Parent(parent_id.to_string()))
    }

    pub fn top_level(&self) -> impl Iterator<Item = &Track> {
        self.members(&Group::TopLevel)
    }

    pub fn favorites(&self) -> impl Iterator<Item = &Track> {
        self.items.iter().filter(|t| t.is_favorite)
    }

    pub fn first_playable(&self) -> Option<&Track> {
        self.items.iter().find(|t| t.is_playable())
    }

    /// Title of the entry whose id is `parent_id`.
    pub fn parent_title(&self, parent_id: &str) -> Option<&str> {
        self.get(parent_id).map(|t| t.title.as_str())
    }

    /// Update the local copy of a favorite flag. Returns false for unknown ids.
    pub fn set_favorite(&mut self, id: &str, value: bool) -> bool {
        match self.by_id.get(id) {
            Some(&slot) => {
                self.items[slot].is_favorite = value;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{favorite_item_id, FAVORITES_ID};

    fn catalog() -> Vec<Track> {
        vec![
            Track::new("album-1", "First Album"),
            Track::new("a", "A").with_parent("album-1").with_media("file:///a.mp3"),
            Track::new("b", "B")
                .with_parent("album-1")
                .with_media("file:///b.mp3")
                .with_favorite(true),
            Track::new("radio", "Radio").with_media("http://radio/live").with_duration(-1),
        ]
    }

    #[test]
    fn builds_parent_and_position_tables() {
        let index = CatalogIndex::build(catalog());
        assert_eq!(index.len(), 4);

        let children: Vec<_> = index.children("album-1").map(|t| t.id.as_str()).collect();
        assert_eq!(children, vec!["a", "b"]);

        assert_eq!(
            index.locate("b"),
            Some(&(Group::Parent("album-1".to_string()), 1))
        );
        assert_eq!(index.locate("radio"), Some(&(Group::TopLevel, 1)));

        let top: Vec<_> = index.top_level().map(|t| t.id.as_str()).collect();
        assert_eq!(top, vec!["album-1", "radio"]);
        assert_eq!(index.parent_title("album-1"), Some("First Album"));
    }

    #[test]
    fn drops_reserved_and_duplicate_ids() {
        let mut tracks = catalog();
        tracks.push(Track::new(FAVORITES_ID, "Clash"));
        tracks.push(Track::new(favorite_item_id("a"), "Clash"));
        tracks.push(Track::new("a", "Duplicate"));

        let index = CatalogIndex::build(tracks);
        assert_eq!(index.len(), 4);
        assert_eq!(index.dropped(), 3);
        assert_eq!(index.get("a").map(|t| t.title.as_str()), Some("A"));
    }

    #[test]
    fn favorite_flag_updates_local_copy() {
        let mut index = CatalogIndex::build(catalog());
        assert!(index.set_favorite("a", true));
        assert!(!index.set_favorite("missing", true));

        let favorites: Vec<_> = index.favorites().map(|t| t.id.as_str()).collect();
        assert_eq!(favorites, vec!["a", "b"]);
        assert_eq!(index.first_playable().map(|t| t.id.as_str()), Some("a"));
    }
}
