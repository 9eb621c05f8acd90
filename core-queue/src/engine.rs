//! # Queue Engine
//!
//! Actor that owns the [`QueueCore`] and serializes every mutation.
//!
//! ## Overview
//!
//! Callers hold a cloneable [`QueueHandle`]. Mutations travel over an `mpsc`
//! channel with a `oneshot` reply and run to completion one at a time. The
//! one exception is a favorite toggle: the catalog write runs as a background
//! task and its reply waits for the write. State is published on two `watch`
//! channels:
//!
//! - [`QueueState`] after every queue change
//! - the [`CatalogIndex`] after every catalog snapshot or favorite write
//!
//! Read-only queries (`current_track`, `has_next`, browse) are answered from
//! those snapshots without a round trip.
//!
//! The actor also follows the catalog: every published `CatalogSnapshot` that
//! is not mid-refresh is applied through `set_catalog`, and a refresh is
//! requested once at startup.
//!
//! ## Usage
//!
//! ```ignore
//! let queue = QueueEngine::spawn(catalog, clock, &settings, labels, None);
//! queue.build_queue_by_parent("album-1", 0).await?;
//! assert_eq!(queue.state().current_index, Some(0));
//! ```

use crate::browse;
use crate::error::{QueueError, Result};
use crate::index::CatalogIndex;
use crate::model::{catalog_id, Navigation, QueueSource, QueueState, SortCriterion};
use crate::queue::QueueCore;
use bridge_traits::catalog::{CatalogSnapshot, CatalogSource};
use bridge_traits::error::BridgeError;
use bridge_traits::media::{RepeatMode, Track};
use bridge_traits::session::{BrowseItem, MediaBrowser};
use bridge_traits::time::Clock;
use core_async::sync::{mpsc, oneshot, watch, CancellationToken, Mutex};
use core_async::task::JoinHandle;
use core_runtime::config::{BrowseLabels, EngineSettings};
use core_runtime::events::{CatalogEvent, CoreEvent, EventBus, QueueEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Outcome of a catalog favorite write, applied back on the actor.
struct FavoriteStored {
    id: String,
    value: bool,
    result: std::result::Result<(), BridgeError>,
    reply: Reply<bool>,
}

enum QueueCommand {
    SetCatalog {
        tracks: Vec<Track>,
        reply: oneshot::Sender<usize>,
    },
    BuildByParent {
        parent_id: String,
        start_index: usize,
        reply: Reply<()>,
    },
    BuildByTrackId {
        track_id: String,
        reply: Reply<()>,
    },
    Advance {
        reply: oneshot::Sender<Navigation>,
    },
    Retreat {
        reply: oneshot::Sender<Navigation>,
    },
    SelectIndex {
        index: usize,
        reply: oneshot::Sender<Option<usize>>,
    },
    ToggleFavorite {
        id: String,
        reply: Reply<bool>,
    },
    SetShuffle {
        enabled: bool,
        reply: oneshot::Sender<bool>,
    },
    SetRepeatMode {
        mode: RepeatMode,
        reply: oneshot::Sender<bool>,
    },
    SetSortCriterion {
        criterion: SortCriterion,
        reply: oneshot::Sender<()>,
    },
    Clear {
        reply: oneshot::Sender<bool>,
    },
    RefreshCatalog {
        reply: Reply<()>,
    },
}

impl QueueCommand {
    fn name(&self) -> &'static str {
        match self {
            QueueCommand::SetCatalog { .. } => "set_catalog",
            QueueCommand::BuildByParent { .. } => "build_queue_by_parent",
            QueueCommand::BuildByTrackId { .. } => "build_queue_by_track_id",
            QueueCommand::Advance { .. } => "advance",
            QueueCommand::Retreat { .. } => "retreat",
            QueueCommand::SelectIndex { .. } => "select_index",
            QueueCommand::ToggleFavorite { .. } => "toggle_favorite",
            QueueCommand::SetShuffle { .. } => "set_shuffle",
            QueueCommand::SetRepeatMode { .. } => "set_repeat_mode",
            QueueCommand::SetSortCriterion { .. } => "set_sort_criterion",
            QueueCommand::Clear { .. } => "clear",
            QueueCommand::RefreshCatalog { .. } => "refresh_catalog",
        }
    }
}

/// Entry point for starting the queue actor.
pub struct QueueEngine {
    core: QueueCore,
    catalog: Arc<dyn CatalogSource>,
    state_tx: watch::Sender<QueueState>,
    index_tx: watch::Sender<Arc<CatalogIndex>>,
    event_bus: Option<EventBus>,
    /// Flag value each in-flight favorite write will store.
    writing: HashMap<String, bool>,
    stored_tx: mpsc::UnboundedSender<FavoriteStored>,
    /// Parent of the in-flight catalog writes.
    writes: CancellationToken,
}

impl QueueEngine {
    /// Start the actor on the current runtime.
    pub fn spawn(
        catalog: Arc<dyn CatalogSource>,
        clock: Arc<dyn Clock>,
        settings: &EngineSettings,
        labels: BrowseLabels,
        event_bus: Option<EventBus>,
    ) -> QueueHandle {
        let core = QueueCore::new(clock, settings.shuffle_seed);
        let (state_tx, state_rx) = watch::channel(core.state().clone());
        let (index_tx, index_rx) = watch::channel(Arc::clone(core.catalog()));
        let (command_tx, command_rx) = mpsc::channel(settings.command_buffer);
        let (stored_tx, stored_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let engine = QueueEngine {
            core,
            catalog: Arc::clone(&catalog),
            state_tx,
            index_tx,
            event_bus,
            writing: HashMap::new(),
            stored_tx,
            writes: CancellationToken::new(),
        };
        let catalog_rx = catalog.subscribe();
        let task = core_async::task::spawn(engine.run(
            command_rx,
            catalog_rx,
            stored_rx,
            shutdown.clone(),
        ));

        QueueHandle {
            commands: command_tx,
            state: state_rx,
            index: index_rx,
            labels: Arc::new(labels),
            shutdown,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<QueueCommand>,
        mut catalog_rx: watch::Receiver<CatalogSnapshot>,
        mut stored_rx: mpsc::UnboundedReceiver<FavoriteStored>,
        shutdown: CancellationToken,
    ) {
        info!("Queue engine started");

        let initial = catalog_rx.borrow_and_update().clone();
        if !initial.loading {
            self.apply_catalog(initial.items);
        }
        if let Err(e) = self.catalog.fetch_all().await {
            warn!("Initial catalog refresh failed: {}", e);
            self.emit(CoreEvent::Catalog(CatalogEvent::RefreshFailed {
                message: e.to_string(),
            }));
        }

        let mut following = true;
        loop {
            core_async::select! {
                biased;
                _ = shutdown.cancelled() => break,
                // Catalog snapshots are applied before any command queued after them.
                changed = catalog_rx.changed(), if following => {
                    if changed.is_err() {
                        warn!("Catalog source closed; keeping last snapshot");
                        following = false;
                        continue;
                    }
                    let snapshot = catalog_rx.borrow_and_update().clone();
                    if !snapshot.loading {
                        self.apply_catalog(snapshot.items);
                    }
                }
                Some(stored) = stored_rx.recv() => self.on_favorite_stored(stored),
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }

        self.writes.cancel();
        info!("Queue engine stopped");
    }

    async fn handle(&mut self, command: QueueCommand) {
        debug!("Queue command: {}", command.name());

        match command {
            QueueCommand::SetCatalog { tracks, reply } => {
                let dropped = self.apply_catalog(tracks);
                reply.send(dropped).ok();
            }
            QueueCommand::BuildByParent {
                parent_id,
                start_index,
                reply,
            } => {
                let result = self.core.build_queue_by_parent(&parent_id, start_index);
                if result.is_ok() {
                    self.publish_built();
                }
                reply.send(result).ok();
            }
            QueueCommand::BuildByTrackId { track_id, reply } => {
                let result = self.core.build_queue_by_track_id(&track_id);
                if result.is_ok() {
                    self.publish_built();
                }
                reply.send(result).ok();
            }
            QueueCommand::Advance { reply } => {
                let navigation = self.core.advance();
                self.publish_navigation(navigation);
                reply.send(navigation).ok();
            }
            QueueCommand::Retreat { reply } => {
                let navigation = self.core.retreat();
                self.publish_navigation(navigation);
                reply.send(navigation).ok();
            }
            QueueCommand::SelectIndex { index, reply } => {
                let previous = self.core.state().current_index;
                let selected = self.core.select_index(index);
                if let Some(index) = selected.filter(|&index| Some(index) != previous) {
                    self.publish_navigation(Navigation::Moved(index));
                }
                reply.send(selected).ok();
            }
            QueueCommand::ToggleFavorite { id, reply } => self.toggle_favorite(&id, reply),
            QueueCommand::SetShuffle { enabled, reply } => {
                let changed = self.core.set_shuffle(enabled);
                if changed {
                    self.publish();
                    self.emit(CoreEvent::Queue(QueueEvent::ShuffleChanged {
                        enabled,
                        version: self.core.state().version,
                    }));
                }
                reply.send(changed).ok();
            }
            QueueCommand::SetRepeatMode { mode, reply } => {
                let changed = self.core.set_repeat_mode(mode);
                if changed {
                    info!("Repeat mode set to {:?}", mode);
                    self.publish();
                    self.emit(CoreEvent::Queue(QueueEvent::RepeatChanged { mode }));
                }
                reply.send(changed).ok();
            }
            QueueCommand::SetSortCriterion { criterion, reply } => {
                self.core.set_sort_criterion(criterion);
                reply.send(()).ok();
            }
            QueueCommand::Clear { reply } => {
                let cleared = self.core.clear();
                if cleared {
                    info!("Queue cleared");
                    self.publish();
                    self.emit(CoreEvent::Queue(QueueEvent::Cleared {
                        version: self.core.state().version,
                    }));
                }
                reply.send(cleared).ok();
            }
            QueueCommand::RefreshCatalog { reply } => {
                let result = self.catalog.fetch_all().await.map_err(|e| {
                    warn!("Catalog refresh failed: {}", e);
                    self.emit(CoreEvent::Catalog(CatalogEvent::RefreshFailed {
                        message: e.to_string(),
                    }));
                    QueueError::from(e)
                });
                reply.send(result).ok();
            }
        }
    }

    /// Start the catalog write off the actor; the flag is applied when
    /// [`FavoriteStored`] comes back.
    fn toggle_favorite(&mut self, id: &str, reply: Reply<bool>) {
        let (id, stored) = match self.core.favorite_target(id) {
            Ok(target) => target,
            Err(e) => {
                reply.send(Err(e)).ok();
                return;
            }
        };
        let value = !self.writing.get(&id).copied().unwrap_or(stored);
        self.writing.insert(id.clone(), value);
        debug!("Writing favorite {} for {}", value, id);

        let catalog = Arc::clone(&self.catalog);
        let stored_tx = self.stored_tx.clone();
        let token = self.writes.child_token();
        core_async::task::spawn(async move {
            core_async::select! {
                biased;
                _ = token.cancelled() => {}
                result = catalog.set_favorite(&id, value) => {
                    stored_tx
                        .send(FavoriteStored { id, value, result, reply })
                        .ok();
                }
            }
        });
    }

    fn on_favorite_stored(&mut self, stored: FavoriteStored) {
        let FavoriteStored {
            id,
            value,
            result,
            reply,
        } = stored;
        if self.writing.get(&id) == Some(&value) {
            self.writing.remove(&id);
        }

        if let Err(e) = result {
            warn!("Favorite write for {} failed: {}", id, e);
            self.emit(CoreEvent::Catalog(CatalogEvent::FavoriteWriteFailed {
                track_id: id,
                message: e.to_string(),
            }));
            reply.send(Err(QueueError::Catalog(e))).ok();
            return;
        }

        self.core.apply_favorite(&id, value);
        self.index_tx.send_replace(Arc::clone(self.core.catalog()));
        self.publish();
        info!("Track {} favorite set to {}", id, value);
        self.emit(CoreEvent::Queue(QueueEvent::FavoriteToggled {
            track_id: id,
            is_favorite: value,
        }));
        reply.send(Ok(value)).ok();
    }

    fn apply_catalog(&mut self, tracks: Vec<Track>) -> usize {
        let index = self.core.set_catalog(tracks);
        let (item_count, dropped) = (index.len(), index.dropped());
        self.index_tx.send_replace(Arc::clone(self.core.catalog()));
        debug!("Catalog applied: {} items, {} dropped", item_count, dropped);
        self.emit(CoreEvent::Catalog(CatalogEvent::Loaded {
            item_count,
            dropped,
        }));
        dropped
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.core.state().clone());
    }

    fn publish_built(&self) {
        self.publish();
        let state = self.core.state();
        self.emit(CoreEvent::Queue(QueueEvent::Built {
            version: state.version,
            source: state.source.to_string(),
            length: state.len(),
            start_index: state.current_index,
        }));
    }

    fn publish_navigation(&self, navigation: Navigation) {
        if let Navigation::Moved(index) = navigation {
            self.publish();
            if let Some(track) = self.core.state().current_track() {
                self.emit(CoreEvent::Queue(QueueEvent::Navigated {
                    index,
                    track_id: track.id.clone(),
                }));
            }
        }
    }

    fn emit(&self, event: CoreEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).ok();
        }
    }
}

/// Cloneable handle to the queue actor.
#[derive(Clone)]
pub struct QueueHandle {
    commands: mpsc::Sender<QueueCommand>,
    state: watch::Receiver<QueueState>,
    index: watch::Receiver<Arc<CatalogIndex>>,
    labels: Arc<BrowseLabels>,
    shutdown: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl QueueHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> QueueCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| QueueError::EngineClosed)?;
        response.await.map_err(|_| QueueError::EngineClosed)
    }

    /// Replace the catalog snapshot. Returns the number of entries dropped
    /// for using reserved ids.
    pub async fn set_catalog(&self, tracks: Vec<Track>) -> Result<usize> {
        self.request(|reply| QueueCommand::SetCatalog { tracks, reply })
            .await
    }

    #[instrument(skip(self))]
    pub async fn build_queue_by_parent(&self, parent_id: &str, start_index: usize) -> Result<()> {
        let parent_id = parent_id.to_string();
        self.request(|reply| QueueCommand::BuildByParent {
            parent_id,
            start_index,
            reply,
        })
        .await?
    }

    #[instrument(skip(self))]
    pub async fn build_queue_by_track_id(&self, track_id: &str) -> Result<()> {
        let track_id = track_id.to_string();
        self.request(|reply| QueueCommand::BuildByTrackId { track_id, reply })
            .await?
    }

    pub async fn advance(&self) -> Result<Navigation> {
        self.request(|reply| QueueCommand::Advance { reply }).await
    }

    pub async fn retreat(&self) -> Result<Navigation> {
        self.request(|reply| QueueCommand::Retreat { reply }).await
    }

    /// Index-only move, clamped. `None` when the queue is empty.
    pub async fn select_index(&self, index: usize) -> Result<Option<usize>> {
        self.request(|reply| QueueCommand::SelectIndex { index, reply })
            .await
    }

    /// Flip the favorite flag in the catalog. Returns the new value.
    #[instrument(skip(self))]
    pub async fn toggle_favorite(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.request(|reply| QueueCommand::ToggleFavorite { id, reply })
            .await?
    }

    /// Returns whether the flag changed.
    pub async fn set_shuffle(&self, enabled: bool) -> Result<bool> {
        self.request(|reply| QueueCommand::SetShuffle { enabled, reply })
            .await
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<bool> {
        self.request(|reply| QueueCommand::SetRepeatMode { mode, reply })
            .await
    }

    pub async fn set_sort_criterion(&self, criterion: SortCriterion) -> Result<()> {
        self.request(|reply| QueueCommand::SetSortCriterion { criterion, reply })
            .await
    }

    pub async fn clear(&self) -> Result<bool> {
        self.request(|reply| QueueCommand::Clear { reply }).await
    }

    /// Ask the catalog to repopulate; the result arrives as a new snapshot.
    pub async fn refresh_catalog(&self) -> Result<()> {
        self.request(|reply| QueueCommand::RefreshCatalog { reply })
            .await?
    }

    pub fn state(&self) -> QueueState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueueState> {
        self.state.clone()
    }

    pub fn catalog(&self) -> Arc<CatalogIndex> {
        Arc::clone(&self.index.borrow())
    }

    pub fn current_track(&self) -> Option<Track> {
        self.state.borrow().current_track().cloned()
    }

    pub fn has_next(&self) -> bool {
        self.state.borrow().has_next()
    }

    pub fn has_previous(&self) -> bool {
        self.state.borrow().has_previous()
    }

    /// Look up a track, accepting favorites-tagged ids.
    pub fn find_track(&self, id: &str) -> Option<Track> {
        let id = catalog_id(id);
        if let Some(track) = self.index.borrow().get(id) {
            return Some(track.clone());
        }
        self.state
            .borrow()
            .queue
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    /// First queued track, else the first playable catalog entry.
    pub fn first_playable(&self) -> Option<Track> {
        if let Some(track) = self.state.borrow().queue.first() {
            return Some(track.clone());
        }
        self.index.borrow().first_playable().cloned()
    }

    pub fn media_list(&self, parent_id: &str) -> Vec<Track> {
        self.index.borrow().children(parent_id).cloned().collect()
    }

    /// Entries without a parent.
    pub fn album_list(&self) -> Vec<Track> {
        self.index.borrow().top_level().cloned().collect()
    }

    pub fn favorite_list(&self) -> Vec<Track> {
        self.index.borrow().favorites().cloned().collect()
    }

    /// Title of the active queue's parent entry.
    pub fn queue_title(&self) -> Option<String> {
        let state = self.state.borrow();
        match &state.source {
            QueueSource::Parent(parent) => self
                .index
                .borrow()
                .parent_title(parent)
                .map(str::to_string),
            QueueSource::Favorites => Some(self.labels.favorites_title.clone()),
            QueueSource::TopLevel => Some(self.labels.all_title.clone()),
            QueueSource::Empty => None,
        }
    }

    pub fn browse_root(&self) -> Vec<BrowseItem> {
        browse::root_items(&self.labels)
    }

    pub fn browse_children(&self, parent_id: &str) -> Vec<BrowseItem> {
        browse::children(&self.index.borrow(), &self.labels, parent_id)
    }

    /// Browser answering from the latest catalog snapshot.
    pub fn browser(&self) -> Arc<dyn MediaBrowser> {
        Arc::new(QueueBrowser {
            index: self.index.clone(),
            labels: Arc::clone(&self.labels),
        })
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed() && !self.shutdown.is_cancelled()
    }

    /// Stop the actor and wait for it to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("Queue engine task ended abnormally: {}", e);
            }
        }
    }
}

struct QueueBrowser {
    index: watch::Receiver<Arc<CatalogIndex>>,
    labels: Arc<BrowseLabels>,
}

impl MediaBrowser for QueueBrowser {
    fn root_id(&self) -> String {
        browse::root_id()
    }

    fn load_children(&self, parent_id: &str) -> Vec<BrowseItem> {
        browse::children(&self.index.borrow(), &self.labels, parent_id)
    }
}
