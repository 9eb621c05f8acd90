//! The [`MediaService`] facade.

use crate::error::{CoreError, Result};
use bridge_traits::media::{RepeatMode, Track};
use bridge_traits::session::{BrowseItem, MediaKey, SessionCommand, SessionToken};
use core_async::sync::watch;
use core_playback::{PlaybackEngine, PlaybackHandle, PlaybackState};
use core_queue::{QueueEngine, QueueHandle, QueueState, SortCriterion};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_session::{ListenerId, MediaStateListener, SessionBridge, SessionHandle, SessionState};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Running media core: one queue engine, one playback engine and one session
/// bridge sharing the collaborators of a [`CoreConfig`].
///
/// Cloning yields another handle to the same engines.
#[derive(Clone)]
pub struct MediaService {
    queue: QueueHandle,
    playback: PlaybackHandle,
    session: SessionHandle,
    event_bus: Option<EventBus>,
}

impl MediaService {
    /// Spawn the engines and open the protocol session.
    ///
    /// If the session cannot be created, the engines already started are
    /// released again before the error is returned.
    #[instrument(skip(config), fields(tag = %config.session_tag))]
    pub async fn start(config: CoreConfig) -> Result<Self> {
        config.validate()?;
        info!("Starting media service");

        let queue = QueueEngine::spawn(
            Arc::clone(&config.catalog),
            Arc::clone(&config.clock),
            &config.settings,
            config.browse_labels.clone(),
            config.event_bus.clone(),
        );

        let playback = PlaybackEngine::spawn(
            Arc::clone(&config.render_device),
            Arc::clone(&config.focus),
            config.artwork_loader.clone(),
            queue.clone(),
            Arc::clone(&config.clock),
            &config.settings,
            config.event_bus.clone(),
        );

        let session = match SessionBridge::start(
            Arc::clone(&config.session_protocol),
            config.notification_renderer.clone(),
            playback.clone(),
            Arc::clone(&config.clock),
            &config.session_tag,
            config.event_bus.clone(),
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to open media session: {}", e);
                if let Err(release) = playback.release().await {
                    warn!("Playback release after failed start: {}", release);
                }
                queue.shutdown().await;
                return Err(e.into());
            }
        };

        info!("Media service started with session {}", session.token());
        Ok(Self {
            queue,
            playback,
            session,
            event_bus: config.event_bus,
        })
    }

    /// Report errors that listeners should see before handing them back.
    fn surface<T>(&self, result: core_playback::Result<T>) -> Result<T> {
        result.map_err(|e| {
            if e.is_surfaced() {
                self.session.listeners().playback_error(&e.to_string());
            } else if e.is_not_found() {
                warn!("{}", e);
            }
            CoreError::from(e)
        })
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    pub async fn play(&self) -> Result<()> {
        self.surface(self.playback.play().await)
    }

    pub async fn pause(&self) -> Result<()> {
        self.surface(self.playback.pause().await)
    }

    pub async fn stop(&self) -> Result<()> {
        self.surface(self.playback.stop().await)
    }

    pub async fn seek_to(&self, position_ms: i64) -> Result<()> {
        self.surface(self.playback.seek_to(position_ms).await)
    }

    pub async fn fast_forward(&self) -> Result<()> {
        self.surface(self.playback.fast_forward().await)
    }

    pub async fn rewind(&self) -> Result<()> {
        self.surface(self.playback.rewind().await)
    }

    pub async fn skip_next(&self) -> Result<()> {
        self.surface(self.playback.skip_next().await)
    }

    pub async fn skip_previous(&self) -> Result<()> {
        self.surface(self.playback.skip_previous().await)
    }

    pub async fn play_from_id(&self, id: &str) -> Result<()> {
        self.surface(self.playback.play_from_id(id).await)
    }

    pub async fn play_from_parent(&self, parent_id: &str, index: usize) -> Result<()> {
        self.surface(self.playback.play_from_parent(parent_id, index).await)
    }

    pub async fn mark_favorite(&self, id: &str) -> Result<()> {
        self.surface(self.playback.mark_favorite(id).await)
    }

    pub async fn set_shuffle(&self, enabled: bool) -> Result<()> {
        self.surface(self.playback.set_shuffle(enabled).await)
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.surface(self.playback.set_repeat_mode(mode).await)
    }

    /// Route a hardware key through the session, as a controller would.
    pub fn press_key(&self, key: MediaKey) -> Result<()> {
        Ok(self.session.submit(SessionCommand::MediaButton(key))?)
    }

    // ------------------------------------------------------------------
    // Catalog and queue
    // ------------------------------------------------------------------

    pub async fn refresh_catalog(&self) -> Result<()> {
        Ok(self.queue.refresh_catalog().await?)
    }

    pub async fn set_sort_criterion(&self, criterion: SortCriterion) -> Result<()> {
        Ok(self.queue.set_sort_criterion(criterion).await?)
    }

    pub fn find_track(&self, id: &str) -> Option<Track> {
        self.queue.find_track(id)
    }

    pub fn media_list(&self, parent_id: &str) -> Vec<Track> {
        self.queue.media_list(parent_id)
    }

    pub fn album_list(&self) -> Vec<Track> {
        self.queue.album_list()
    }

    pub fn favorite_list(&self) -> Vec<Track> {
        self.queue.favorite_list()
    }

    pub fn browse_root(&self) -> Vec<BrowseItem> {
        self.queue.browse_root()
    }

    pub fn browse_children(&self, parent_id: &str) -> Vec<BrowseItem> {
        self.queue.browse_children(parent_id)
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    pub fn state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.playback.subscribe()
    }

    pub fn queue_state(&self) -> QueueState {
        self.queue.state()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session_token(&self) -> SessionToken {
        self.session.token()
    }

    pub fn is_playing(&self) -> bool {
        self.playback.state().is_playing
    }

    pub fn current_track(&self) -> Option<Track> {
        self.playback.current_track()
    }

    pub fn has_next(&self) -> bool {
        self.playback.has_next()
    }

    pub fn has_previous(&self) -> bool {
        self.playback.has_previous()
    }

    /// Engine events, when the config carries an event bus.
    pub fn events(&self) -> Option<EventStream> {
        self.event_bus
            .as_ref()
            .map(|bus| EventStream::new(bus.subscribe()))
    }

    pub fn register_listener(&self, listener: Arc<dyn MediaStateListener>) -> ListenerId {
        self.session.register_listener(listener)
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.session.unregister_listener(id)
    }

    pub fn queue(&self) -> &QueueHandle {
        &self.queue
    }

    pub fn playback(&self) -> &PlaybackHandle {
        &self.playback
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running() && self.playback.is_running() && self.queue.is_running()
    }

    /// Tear down the session (which releases playback), then stop the queue.
    /// Safe to call more than once.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down media service");
        let result = self.session.release().await;
        if let Err(e) = self.playback.release().await {
            warn!("Playback release during shutdown failed: {}", e);
        }
        self.queue.shutdown().await;
        info!("Media service stopped");
        Ok(result?)
    }
}
