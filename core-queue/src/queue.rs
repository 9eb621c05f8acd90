//! Synchronous queue state machine.
//!
//! [`QueueCore`] holds every queue rule and no I/O. The engine actor owns one
//! instance and is its only writer.

use crate::error::{QueueError, Result};
use crate::index::{CatalogIndex, Group};
use crate::model::{
    catalog_id, strip_favorite_prefix, Navigation, QueueSource, QueueState, SortCriterion,
    ALL_ID, FAVORITES_ID,
};
use bridge_traits::media::{RepeatMode, Track};
use bridge_traits::time::Clock;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

enum StartAt {
    Index(usize),
    Track(String),
}

pub struct QueueCore {
    catalog: Arc<CatalogIndex>,
    state: QueueState,
    /// Member ids in built (sorted, unshuffled) order.
    natural_order: Vec<String>,
    sort: SortCriterion,
    rng: StdRng,
    clock: Arc<dyn Clock>,
}

impl QueueCore {
    pub fn new(clock: Arc<dyn Clock>, shuffle_seed: Option<u64>) -> Self {
        let rng = match shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = QueueState {
            updated_at: clock.now(),
            ..QueueState::default()
        };
        Self {
            catalog: Arc::new(CatalogIndex::default()),
            state,
            natural_order: Vec::new(),
            sort: SortCriterion::None,
            rng,
            clock,
        }
    }

    pub fn state(&self) -> &QueueState {
        &self.state
    }

    pub fn catalog(&self) -> &Arc<CatalogIndex> {
        &self.catalog
    }

    pub fn sort_criterion(&self) -> SortCriterion {
        self.sort
    }

    /// Replace the catalog snapshot. The active queue is left alone.
    pub fn set_catalog(&mut self, tracks: Vec<Track>) -> &CatalogIndex {
        self.catalog = Arc::new(CatalogIndex::build(tracks));
        &self.catalog
    }

    /// Queue the children of `parent_id` (or favorites / top-level entries
    /// for the reserved ids) starting at `start_index`, clamped.
    pub fn build_queue_by_parent(&mut self, parent_id: &str, start_index: usize) -> Result<()> {
        let (source, members) = if parent_id == FAVORITES_ID
            || strip_favorite_prefix(parent_id).is_some()
        {
            (QueueSource::Favorites, self.favorite_members())
        } else if parent_id == ALL_ID {
            (QueueSource::TopLevel, self.group_members(&Group::TopLevel))
        } else if self.catalog.has_parent(parent_id) {
            (
                QueueSource::Parent(parent_id.to_string()),
                self.group_members(&Group::Parent(parent_id.to_string())),
            )
        } else {
            warn!("Cannot build queue: unknown parent {}", parent_id);
            return Err(QueueError::parent_not_found(parent_id));
        };

        if members.is_empty() {
            warn!("Cannot build queue: parent {} has no playable children", parent_id);
            return Err(QueueError::parent_not_found(parent_id));
        }

        self.install(source, members, StartAt::Index(start_index));
        Ok(())
    }

    /// Queue the group `track_id` belongs to, starting at that track.
    /// Favorites-tagged ids queue the favorites subset.
    pub fn build_queue_by_track_id(&mut self, track_id: &str) -> Result<()> {
        let (source, members, id) = match strip_favorite_prefix(track_id) {
            Some(id) => (QueueSource::Favorites, self.favorite_members(), id),
            None => match self.catalog.locate(track_id) {
                Some((group, _)) => {
                    let source = match group {
                        Group::Parent(parent) => QueueSource::Parent(parent.clone()),
                        Group::TopLevel => QueueSource::TopLevel,
                    };
                    (source, self.group_members(group), track_id)
                }
                None => {
                    warn!("Cannot build queue: unknown track {}", track_id);
                    return Err(QueueError::track_not_found(track_id));
                }
            },
        };

        if !members.iter().any(|t| t.id == id) {
            warn!("Cannot build queue: track {} is not playable in {}", id, source);
            return Err(QueueError::track_not_found(track_id));
        }

        self.install(source, members, StartAt::Track(id.to_string()));
        Ok(())
    }

    pub fn advance(&mut self) -> Navigation {
        let target = self.state.next_index();
        self.navigate(target)
    }

    pub fn retreat(&mut self) -> Navigation {
        let target = self.state.previous_index();
        self.navigate(target)
    }

    fn navigate(&mut self, target: Option<usize>) -> Navigation {
        match (self.state.current_index, target) {
            (Some(current), Some(index)) if current == index => Navigation::Restarted(index),
            (Some(_), Some(index)) => {
                self.state.current_index = Some(index);
                self.touch();
                Navigation::Moved(index)
            }
            _ => Navigation::Boundary,
        }
    }

    /// Move to `index`, clamped. Returns the new index, or `None` when the
    /// queue is empty.
    pub fn select_index(&mut self, index: usize) -> Option<usize> {
        let last = self.state.queue.len().checked_sub(1)?;
        let index = index.min(last);
        if self.state.current_index != Some(index) {
            self.state.current_index = Some(index);
            self.touch();
        }
        Some(index)
    }

    /// Catalog id and current flag for a favorite toggle on `id`.
    pub fn favorite_target(&self, id: &str) -> Result<(String, bool)> {
        let id = catalog_id(id);
        let current = self
            .catalog
            .get(id)
            .or_else(|| self.state.queue.iter().find(|t| t.id == id))
            .map(|t| t.is_favorite);

        match current {
            Some(flag) => Ok((id.to_string(), flag)),
            None => {
                warn!("Cannot toggle favorite: unknown track {}", id);
                Err(QueueError::track_not_found(id))
            }
        }
    }

    /// Record a persisted favorite flag in the catalog copy and in matching
    /// queue entries. The version is untouched.
    pub fn apply_favorite(&mut self, id: &str, value: bool) {
        Arc::make_mut(&mut self.catalog).set_favorite(id, value);
        for track in self.state.queue.iter_mut().filter(|t| t.id == id) {
            track.is_favorite = value;
        }
        self.touch();
    }

    /// Returns whether anything changed.
    pub fn set_shuffle(&mut self, enabled: bool) -> bool {
        if self.state.shuffle_enabled == enabled {
            return false;
        }

        let current_id = self.state.current_track().map(|t| t.id.clone());
        if enabled {
            self.state.queue.shuffle(&mut self.rng);
        } else {
            let natural: HashMap<&str, usize> = self
                .natural_order
                .iter()
                .enumerate()
                .map(|(position, id)| (id.as_str(), position))
                .collect();
            self.state
                .queue
                .sort_by_key(|t| natural.get(t.id.as_str()).copied().unwrap_or(usize::MAX));
        }

        self.state.current_index = current_id.and_then(|id| self.state.position_of(&id));
        self.state.shuffle_enabled = enabled;
        self.state.version += 1;
        self.touch();
        info!(
            "Shuffle {} (version {})",
            if enabled { "enabled" } else { "disabled" },
            self.state.version
        );
        true
    }

    /// Returns whether the mode changed.
    pub fn set_repeat_mode(&mut self, mode: RepeatMode) -> bool {
        if self.state.repeat_mode == mode {
            return false;
        }
        self.state.repeat_mode = mode;
        self.touch();
        true
    }

    /// Applies to queues built afterwards.
    pub fn set_sort_criterion(&mut self, criterion: SortCriterion) {
        debug!("Sort criterion set to {:?}", criterion);
        self.sort = criterion;
    }

    /// Empty the queue. Returns false when it was already empty.
    pub fn clear(&mut self) -> bool {
        if self.state.queue.is_empty() {
            return false;
        }
        self.state.queue.clear();
        self.state.current_index = None;
        self.state.source = QueueSource::Empty;
        self.state.version += 1;
        self.natural_order.clear();
        self.touch();
        true
    }

    pub fn first_playable(&self) -> Option<&Track> {
        self.state
            .queue
            .first()
            .or_else(|| self.catalog.first_playable())
    }

    /// Look up a track by id, accepting favorites-tagged ids.
    pub fn find_track(&self, id: &str) -> Option<&Track> {
        let id = catalog_id(id);
        self.catalog
            .get(id)
            .or_else(|| self.state.queue.iter().find(|t| t.id == id))
    }

    fn group_members(&self, group: &Group) -> Vec<Track> {
        self.catalog
            .members(group)
            .filter(|t| t.is_playable())
            .cloned()
            .collect()
    }

    fn favorite_members(&self) -> Vec<Track> {
        self.catalog
            .favorites()
            .filter(|t| t.is_playable())
            .cloned()
            .collect()
    }

    fn install(&mut self, source: QueueSource, mut members: Vec<Track>, start: StartAt) {
        self.sort.apply(&mut members);
        let natural_order: Vec<String> = members.iter().map(|t| t.id.clone()).collect();

        let start_id = match start {
            StartAt::Index(index) => {
                let index = index.min(members.len() - 1);
                members[index].id.clone()
            }
            StartAt::Track(id) => id,
        };

        if self.state.source == source && self.natural_order == natural_order {
            // Same membership and order: refresh entries, move the index only.
            let mut fresh: HashMap<String, Track> =
                members.into_iter().map(|t| (t.id.clone(), t)).collect();
            for track in self.state.queue.iter_mut() {
                if let Some(updated) = fresh.remove(&track.id) {
                    *track = updated;
                }
            }
            self.state.current_index = self.state.position_of(&start_id).or(Some(0));
            self.touch();
            debug!(
                "Queue {} unchanged, moved to index {:?}",
                source, self.state.current_index
            );
            return;
        }

        if self.state.shuffle_enabled {
            members.shuffle(&mut self.rng);
        }

        self.state.current_index = members
            .iter()
            .position(|t| t.id == start_id)
            .or(Some(0));
        self.state.queue = members;
        self.state.source = source;
        self.state.version += 1;
        self.natural_order = natural_order;
        self.touch();

        info!(
            "Queue built from {}: {} tracks, index {:?}, version {}",
            self.state.source,
            self.state.queue.len(),
            self.state.current_index,
            self.state.version
        );
    }

    fn touch(&mut self) {
        self.state.updated_at = self.clock.now();
    }
}
