//! # Playback Engine
//!
//! Actor that owns the render device and mirrors the active queue into it.
//!
//! ## Overview
//!
//! The actor reacts to five inputs, in priority order:
//!
//! 1. device events (item transitions, status, errors)
//! 2. audio-focus changes
//! 3. new [`QueueState`] emissions, reconciled by version
//! 4. its own background work: position ticks, favorite flushes, artwork
//! 5. transport commands from [`PlaybackHandle`]s
//!
//! After each input the engine re-reads the device snapshot and publishes a
//! [`PlaybackState`] on a `watch` channel if anything observable changed.
//!
//! ## Queue reconciliation
//!
//! A version change pushes the whole item list to the device and starts
//! loading it. The same version with a different index is an item seek only.
//! Commands that build queues await the queue engine's reply and reconcile
//! before returning, so callers never observe a stale device.

use crate::error::{PlaybackError, Result};
use crate::favorite::{FavoriteDebouncer, FavoriteFlush};
use crate::focus::FocusController;
use crate::state::{PlaybackState, PlaybackStatus};
use crate::ticker::{PositionTicker, Tick};
use bridge_traits::artwork::{Artwork, ArtworkLoader};
use bridge_traits::device::{
    DeviceEvent, DeviceStatus, RenderDevice, RenderItem, TransitionReason,
};
use bridge_traits::error::BridgeError;
use bridge_traits::focus::{AudioFocusArbitrator, FocusChange, FocusGrant, FocusUsage};
use bridge_traits::media::{RepeatMode, Track};
use bridge_traits::time::Clock;
use core_async::sync::{mpsc, oneshot, watch, CancellationToken, Mutex};
use core_async::task::JoinHandle;
use core_async::time::Duration;
use core_queue::model::catalog_id;
use core_queue::{Navigation, QueueError, QueueHandle, QueueSource, QueueState};
use core_runtime::config::EngineSettings;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use core_runtime::logging::redact_locator;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

type Reply<T> = oneshot::Sender<Result<T>>;

enum PlaybackCommand {
    Play { reply: Reply<()> },
    Pause { reply: Reply<()> },
    Stop { reply: Reply<()> },
    SeekTo { position_ms: i64, reply: Reply<()> },
    FastForward { reply: Reply<()> },
    Rewind { reply: Reply<()> },
    SkipNext { reply: Reply<()> },
    SkipPrevious { reply: Reply<()> },
    PlayFromId { id: String, reply: Reply<()> },
    PlayFromParent { parent_id: String, index: usize, reply: Reply<()> },
    MarkFavorite { id: String, reply: Reply<()> },
    SetShuffle { enabled: bool, reply: Reply<()> },
    SetRepeatMode { mode: RepeatMode, reply: Reply<()> },
    Release { reply: Reply<()> },
}

impl PlaybackCommand {
    fn name(&self) -> &'static str {
        match self {
            PlaybackCommand::Play { .. } => "play",
            PlaybackCommand::Pause { .. } => "pause",
            PlaybackCommand::Stop { .. } => "stop",
            PlaybackCommand::SeekTo { .. } => "seek_to",
            PlaybackCommand::FastForward { .. } => "fast_forward",
            PlaybackCommand::Rewind { .. } => "rewind",
            PlaybackCommand::SkipNext { .. } => "skip_next",
            PlaybackCommand::SkipPrevious { .. } => "skip_previous",
            PlaybackCommand::PlayFromId { .. } => "play_from_id",
            PlaybackCommand::PlayFromParent { .. } => "play_from_parent",
            PlaybackCommand::MarkFavorite { .. } => "mark_favorite",
            PlaybackCommand::SetShuffle { .. } => "set_shuffle",
            PlaybackCommand::SetRepeatMode { .. } => "set_repeat_mode",
            PlaybackCommand::Release { .. } => "release",
        }
    }
}

/// Why a queue emission is being reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    /// Observed on the queue watch; autoplay follows settings.
    Follow,
    /// A play command built the queue and will start playback itself.
    Play,
}

/// The queue as last pushed to the device.
struct Applied {
    version: u64,
    source: QueueSource,
    shuffle_enabled: bool,
}

struct ArtworkLoaded {
    generation: u64,
    result: std::result::Result<Artwork, BridgeError>,
}

struct FavoriteWritten {
    track_id: String,
    value: bool,
    result: std::result::Result<bool, QueueError>,
}

/// Receivers for everything the actor reacts to besides commands.
struct Inbox {
    device: mpsc::UnboundedReceiver<DeviceEvent>,
    focus: mpsc::UnboundedReceiver<FocusChange>,
    ticks: mpsc::UnboundedReceiver<Tick>,
    favorites: mpsc::UnboundedReceiver<FavoriteFlush>,
    written: mpsc::UnboundedReceiver<FavoriteWritten>,
    artwork: mpsc::UnboundedReceiver<ArtworkLoaded>,
}

/// Senders handed to collaborators and background tasks.
struct Outbox {
    focus: mpsc::UnboundedSender<FocusChange>,
    ticks: mpsc::UnboundedSender<Tick>,
    favorites: mpsc::UnboundedSender<FavoriteFlush>,
    written: mpsc::UnboundedSender<FavoriteWritten>,
    artwork: mpsc::UnboundedSender<ArtworkLoaded>,
}

/// Entry point for starting the playback actor.
pub struct PlaybackEngine {
    device: Arc<dyn RenderDevice>,
    focus_arbitrator: Arc<dyn AudioFocusArbitrator>,
    artwork_loader: Option<Arc<dyn ArtworkLoader>>,
    queue: QueueHandle,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    seek_step_ms: i64,
    autoplay_on_load: bool,

    state: PlaybackState,
    state_tx: watch::Sender<PlaybackState>,
    focus: FocusController,
    ticker: PositionTicker,
    favorites: FavoriteDebouncer,
    applied: Option<Applied>,
    artwork_generation: u64,
    /// Parent of every background task the actor spawns.
    tasks: CancellationToken,
    outbox: Outbox,
}

impl PlaybackEngine {
    /// Start the actor on the current runtime. The device listener is
    /// attached before this returns.
    pub fn spawn(
        device: Arc<dyn RenderDevice>,
        focus_arbitrator: Arc<dyn AudioFocusArbitrator>,
        artwork_loader: Option<Arc<dyn ArtworkLoader>>,
        queue: QueueHandle,
        clock: Arc<dyn Clock>,
        settings: &EngineSettings,
        event_bus: Option<EventBus>,
    ) -> PlaybackHandle {
        let (device_tx, device_rx) = mpsc::unbounded_channel();
        let (focus_tx, focus_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let (favorite_tx, favorite_rx) = mpsc::unbounded_channel();
        let (written_tx, written_rx) = mpsc::unbounded_channel();
        let (artwork_tx, artwork_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(settings.command_buffer);

        let initial = PlaybackState {
            updated_at: clock.now(),
            ..PlaybackState::default()
        };
        let (state_tx, state_rx) = watch::channel(initial.clone());
        let tasks = CancellationToken::new();
        let shutdown = CancellationToken::new();

        device.attach_listener(device_tx);

        let engine = PlaybackEngine {
            device,
            focus_arbitrator,
            artwork_loader,
            queue: queue.clone(),
            clock,
            event_bus,
            seek_step_ms: settings.seek_step_ms,
            autoplay_on_load: settings.autoplay_on_load,
            state: initial,
            state_tx,
            focus: FocusController::new(settings.duck_volume),
            ticker: PositionTicker::new(
                Duration::from_millis(settings.position_tick_ms),
                tasks.clone(),
            ),
            favorites: FavoriteDebouncer::new(
                Duration::from_millis(settings.favorite_debounce_ms),
                tasks.clone(),
            ),
            applied: None,
            artwork_generation: 0,
            tasks,
            outbox: Outbox {
                focus: focus_tx,
                ticks: tick_tx,
                favorites: favorite_tx,
                written: written_tx,
                artwork: artwork_tx,
            },
        };
        let inbox = Inbox {
            device: device_rx,
            focus: focus_rx,
            ticks: tick_rx,
            favorites: favorite_rx,
            written: written_rx,
            artwork: artwork_rx,
        };
        let task = core_async::task::spawn(engine.run(command_rx, inbox, shutdown.clone()));

        PlaybackHandle {
            commands: command_tx,
            state: state_rx,
            queue,
            shutdown,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<PlaybackCommand>,
        mut inbox: Inbox,
        shutdown: CancellationToken,
    ) {
        info!("Playback engine started");

        let mut queue_rx = self.queue.subscribe();
        let initial = queue_rx.borrow_and_update().clone();
        self.follow_queue(&initial).await;

        let mut following = true;
        loop {
            core_async::select! {
                biased;
                _ = shutdown.cancelled() => {
                    if let Err(e) = self.release().await {
                        warn!("Release during shutdown failed: {}", e);
                    }
                    break;
                }
                Some(event) = inbox.device.recv() => self.on_device_event(event).await,
                Some(change) = inbox.focus.recv() => self.on_focus_change(change).await,
                changed = queue_rx.changed(), if following => {
                    if changed.is_err() {
                        warn!("Queue engine closed; playback keeps its last queue");
                        following = false;
                        continue;
                    }
                    let queue = queue_rx.borrow_and_update().clone();
                    self.follow_queue(&queue).await;
                }
                Some(tick) = inbox.ticks.recv() => self.on_tick(tick),
                Some(flush) = inbox.favorites.recv() => self.on_favorite_flush(flush).await,
                Some(written) = inbox.written.recv() => self.on_favorite_written(written).await,
                Some(loaded) = inbox.artwork.recv() => self.on_artwork(loaded),
                command = commands.recv() => match command {
                    Some(PlaybackCommand::Release { reply }) => {
                        reply.send(self.release().await).ok();
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        if let Err(e) = self.release().await {
                            warn!("Release after last handle dropped failed: {}", e);
                        }
                        break;
                    }
                },
            }
        }

        info!("Playback engine stopped");
    }

    async fn handle(&mut self, command: PlaybackCommand) {
        debug!("Playback command: {}", command.name());

        match command {
            PlaybackCommand::Play { reply } => {
                let result = self.play().await;
                self.finish(reply, result).await;
            }
            PlaybackCommand::Pause { reply } => {
                let result = self.device.pause().await.map_err(PlaybackError::from);
                self.finish(reply, result).await;
            }
            PlaybackCommand::Stop { reply } => {
                let result = self.stop().await;
                self.finish(reply, result).await;
            }
            PlaybackCommand::SeekTo { position_ms, reply } => {
                let result = self.seek_to(position_ms).await;
                self.finish(reply, result).await;
            }
            PlaybackCommand::FastForward { reply } => {
                let result = self.step(self.seek_step_ms).await;
                self.finish(reply, result).await;
            }
            PlaybackCommand::Rewind { reply } => {
                let result = self.step(-self.seek_step_ms).await;
                self.finish(reply, result).await;
            }
            PlaybackCommand::SkipNext { reply } => {
                let result = self.skip(true).await;
                self.finish(reply, result).await;
            }
            PlaybackCommand::SkipPrevious { reply } => {
                let result = self.skip(false).await;
                self.finish(reply, result).await;
            }
            PlaybackCommand::PlayFromId { id, reply } => {
                let result = match self.queue.build_queue_by_track_id(&id).await {
                    Ok(()) => self.play_current().await,
                    Err(e) => Err(e.into()),
                };
                self.finish(reply, result).await;
            }
            PlaybackCommand::PlayFromParent {
                parent_id,
                index,
                reply,
            } => {
                let result = match self.queue.build_queue_by_parent(&parent_id, index).await {
                    Ok(()) => self.play_current().await,
                    Err(e) => Err(e.into()),
                };
                self.finish(reply, result).await;
            }
            PlaybackCommand::MarkFavorite { id, reply } => {
                let result = self.mark_favorite(&id);
                self.finish(reply, result).await;
            }
            PlaybackCommand::SetShuffle { enabled, reply } => {
                let result = self.set_shuffle(enabled).await;
                self.finish(reply, result).await;
            }
            PlaybackCommand::SetRepeatMode { mode, reply } => {
                let result = self.set_repeat_mode(mode).await;
                self.finish(reply, result).await;
            }
            PlaybackCommand::Release { reply } => {
                reply.send(self.release().await).ok();
            }
        }
    }

    /// Publish whatever the command changed, then answer the caller.
    async fn finish(&mut self, reply: Reply<()>, result: Result<()>) {
        if let Err(e) = &result {
            match e {
                PlaybackError::Queue(QueueError::NotFound { .. }) => warn!("{}", e),
                _ => debug!("Playback command failed: {}", e),
            }
        }
        self.refresh().await;
        reply.send(result).ok();
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    async fn play(&mut self) -> Result<()> {
        if self.device.snapshot().item_count == 0 {
            let Some(track) = self.queue.first_playable() else {
                debug!("Nothing to play");
                return Ok(());
            };
            self.acquire_focus().await?;
            self.queue.build_queue_by_track_id(&track.id).await?;
            return self.play_current().await;
        }
        self.clear_error();
        self.clear_ended();
        self.start_playback().await
    }

    /// Bring the device in line with the queue after a build, then play the
    /// queue's current item from the start.
    async fn play_current(&mut self) -> Result<()> {
        let queue = self.queue.state();
        let loaded = self.reconcile(&queue, Intent::Play).await?;
        if !loaded {
            if let Some(index) = queue.current_index {
                self.device.seek_to_item(index, 0).await?;
                self.ticker.stop().await;
            }
        }
        self.clear_error();
        self.clear_ended();
        self.start_playback().await
    }

    async fn start_playback(&mut self) -> Result<()> {
        self.acquire_focus().await?;

        let snapshot = self.device.snapshot();
        if snapshot.item_count == 0 {
            return Ok(());
        }
        if matches!(snapshot.status, DeviceStatus::Idle | DeviceStatus::Ended) {
            self.device.prepare().await?;
        }
        self.device.play().await?;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.device.stop().await?;
        self.ticker.stop().await;
        self.clear_ended();
        info!("Playback stopped");
        self.emit(PlaybackEvent::Stopped {
            track_id: self.state.current_track_id().map(str::to_string),
        });
        self.abandon_focus().await
    }

    async fn seek_to(&mut self, position_ms: i64) -> Result<()> {
        let snapshot = self.device.snapshot();
        if self.state.is_live() || snapshot.item_count == 0 {
            debug!("Ignoring seek; nothing seekable is loaded");
            return Ok(());
        }
        let target = if snapshot.duration_ms > 0 {
            position_ms.clamp(0, snapshot.duration_ms)
        } else {
            position_ms.max(0)
        };
        self.device.seek(target).await?;
        self.clear_ended();
        // Restarted from the new position by the next refresh.
        self.ticker.stop().await;
        Ok(())
    }

    /// Fast-forward (positive `delta_ms`) or rewind, crossing into the
    /// neighbouring item when the offset leaves the current one.
    async fn step(&mut self, delta_ms: i64) -> Result<()> {
        let snapshot = self.device.snapshot();
        let offset = snapshot.position_ms.saturating_add(delta_ms);
        if offset < 0 {
            self.skip(false).await
        } else if snapshot.duration_ms > 0 && offset > snapshot.duration_ms {
            self.skip(true).await
        } else {
            self.seek_to(offset).await
        }
    }

    async fn skip(&mut self, forward: bool) -> Result<()> {
        let navigation = if forward {
            self.queue.advance().await?
        } else {
            self.queue.retreat().await?
        };
        let recovering = self.clear_error();
        self.clear_ended();

        match navigation {
            Navigation::Moved(index) => {
                self.device.seek_to_item(index, 0).await?;
                self.ticker.stop().await;
            }
            Navigation::Restarted(_) => {
                self.device.seek(0).await?;
                self.ticker.stop().await;
            }
            Navigation::Boundary => {
                debug!("No {} item", if forward { "next" } else { "previous" });
            }
        }

        if recovering {
            self.start_playback().await?;
        }
        Ok(())
    }

    /// Flip the flag now; the catalog write waits for the debounce window.
    fn mark_favorite(&mut self, id: &str) -> Result<()> {
        let id = catalog_id(id);
        if self.queue.find_track(id).is_none() {
            return Err(QueueError::track_not_found(id).into());
        }
        self.favorites.tap(id, self.outbox.favorites.clone());
        debug!("Favorite tap on {}", id);
        Ok(())
    }

    async fn set_shuffle(&mut self, enabled: bool) -> Result<()> {
        if self.queue.set_shuffle(enabled).await? {
            let queue = self.queue.state();
            self.reconcile(&queue, Intent::Follow).await?;
        }
        Ok(())
    }

    async fn set_repeat_mode(&mut self, mode: RepeatMode) -> Result<()> {
        if self.queue.set_repeat_mode(mode).await? {
            let queue = self.queue.state();
            self.reconcile(&queue, Intent::Follow).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queue reconciliation
    // ------------------------------------------------------------------

    /// Reconcile a queue emission that no caller is waiting on.
    async fn follow_queue(&mut self, queue: &QueueState) {
        match self.reconcile(queue, Intent::Follow).await {
            Ok(_) => {}
            Err(PlaybackError::Device(e)) => {
                self.on_device_error(format!("Failed to load queue: {e}"))
                    .await
            }
            Err(e) => warn!("Queue version {} not applied cleanly: {}", queue.version, e),
        }
        self.refresh().await;
    }

    /// Returns whether the device was reloaded.
    async fn reconcile(&mut self, queue: &QueueState, intent: Intent) -> Result<bool> {
        self.apply_modes(queue).await?;

        if self
            .applied
            .as_ref()
            .is_some_and(|applied| applied.version == queue.version)
        {
            if let Some(index) = queue.current_index {
                if self.device.snapshot().current_index != Some(index) {
                    debug!("Queue index moved to {}", index);
                    self.device.seek_to_item(index, 0).await?;
                    self.ticker.stop().await;
                }
            }
            return Ok(false);
        }

        self.load(queue, intent).await?;
        Ok(true)
    }

    async fn load(&mut self, queue: &QueueState, intent: Intent) -> Result<()> {
        let previous = self.applied.replace(Applied {
            version: queue.version,
            source: queue.source.clone(),
            shuffle_enabled: queue.shuffle_enabled,
        });
        self.ticker.stop().await;

        let snapshot = self.device.snapshot();
        if queue.is_empty() {
            if snapshot.item_count > 0 {
                info!("Queue cleared; unloading device");
                self.device.stop().await?;
                self.device.set_items(Vec::new(), 0).await?;
            }
            return Ok(());
        }

        // A shuffle toggle reorders the queue around the playing item; keep
        // its position and transport instead of starting over.
        let reordered = previous.is_some_and(|previous| {
            previous.source == queue.source && previous.shuffle_enabled != queue.shuffle_enabled
        }) && self.state.current_track_id() == queue.current_track().map(|t| t.id.as_str());

        let index = queue.current_index.unwrap_or(0);
        let items: Vec<RenderItem> = queue.queue.iter().map(RenderItem::from).collect();
        info!(
            "Loading queue version {} ({} items) at index {}",
            queue.version,
            items.len(),
            index
        );

        self.clear_error();
        self.clear_ended();
        self.device.set_items(items, index).await?;
        if reordered && snapshot.position_ms > 0 {
            self.device.seek(snapshot.position_ms).await?;
        }
        self.device.prepare().await?;

        let play = match intent {
            Intent::Play => false,
            Intent::Follow if reordered => snapshot.is_playing,
            Intent::Follow => self.autoplay_on_load,
        };
        if play {
            self.start_playback().await?;
        }
        Ok(())
    }

    async fn apply_modes(&mut self, queue: &QueueState) -> Result<()> {
        let snapshot = self.device.snapshot();
        if snapshot.repeat_mode != queue.repeat_mode {
            self.device.set_repeat_mode(queue.repeat_mode).await?;
        }
        if snapshot.shuffle_enabled != queue.shuffle_enabled {
            self.device.set_shuffle_enabled(queue.shuffle_enabled).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Device events
    // ------------------------------------------------------------------

    async fn on_device_event(&mut self, event: DeviceEvent) {
        debug!("Device event: {:?}", event);

        match event {
            DeviceEvent::ItemTransitioned { index, reason } => match reason {
                TransitionReason::Auto => self.mirror_index(index).await,
                TransitionReason::Repeat => {
                    // Same item from the top.
                    self.ticker.stop().await;
                }
                TransitionReason::Seek | TransitionReason::PlaylistChanged => {}
            },
            DeviceEvent::PlaybackStateChanged(DeviceStatus::Ended) => {
                self.on_queue_finished().await;
                return;
            }
            DeviceEvent::Error { message } => self.on_device_error(message).await,
            DeviceEvent::PlaybackStateChanged(_)
            | DeviceEvent::IsPlayingChanged(_)
            | DeviceEvent::MetadataChanged { .. } => {}
        }
        self.refresh().await;
    }

    async fn mirror_index(&mut self, index: usize) {
        if let Err(e) = self.queue.select_index(index).await {
            warn!("Could not mirror device index {} to queue: {}", index, e);
        }
    }

    /// The last item ended with nothing after it: park on the first item.
    async fn on_queue_finished(&mut self) {
        info!("Queue finished");
        self.ticker.stop().await;
        if let Err(e) = self.device.pause().await {
            warn!("Pause after queue end failed: {}", e);
        }
        if self.device.snapshot().item_count > 0 {
            if let Err(e) = self.device.seek_to_item(0, 0).await {
                warn!("Rewind after queue end failed: {}", e);
            }
        }
        self.mirror_index(0).await;

        self.refresh().await;
        self.state.status = PlaybackStatus::Ended;
        self.state.position_ms = 0;
        self.publish();
        self.emit(PlaybackEvent::Ended);
    }

    async fn on_device_error(&mut self, message: String) {
        warn!("Render device error: {}", message);
        self.ticker.stop().await;
        self.state.status = PlaybackStatus::Error;
        self.state.error = Some(message.clone());
        self.emit(PlaybackEvent::Error {
            track_id: self.state.current_track_id().map(str::to_string),
            message,
        });
    }

    /// Drop a sticky error status. Returns whether one was set.
    fn clear_error(&mut self) -> bool {
        if self.state.status != PlaybackStatus::Error {
            return false;
        }
        self.state.status = PlaybackStatus::Idle;
        self.state.error = None;
        true
    }

    /// Leave the parked end-of-queue status; the next refresh reads the
    /// device again.
    fn clear_ended(&mut self) {
        if self.state.status == PlaybackStatus::Ended {
            self.state.status = PlaybackStatus::Idle;
        }
    }

    // ------------------------------------------------------------------
    // Audio focus
    // ------------------------------------------------------------------

    async fn acquire_focus(&mut self) -> Result<()> {
        if self.focus.is_granted() {
            return Ok(());
        }
        let grant = self
            .focus_arbitrator
            .request(FocusUsage::Media, self.outbox.focus.clone())
            .await
            .map_err(PlaybackError::Focus)?;

        match grant {
            FocusGrant::Granted => {
                debug!("Audio focus granted");
                self.focus.granted();
                Ok(())
            }
            FocusGrant::Denied => {
                warn!("Audio focus denied; playback not started");
                self.emit(PlaybackEvent::FocusDenied);
                Err(PlaybackError::FocusDenied)
            }
        }
    }

    async fn abandon_focus(&mut self) -> Result<()> {
        self.focus.abandoned();
        self.focus_arbitrator
            .abandon()
            .await
            .map_err(PlaybackError::Focus)
    }

    async fn on_focus_change(&mut self, change: FocusChange) {
        info!("Audio focus change: {:?}", change);
        self.emit(PlaybackEvent::FocusChanged { change });

        let action = self.focus.on_change(change, self.device.snapshot().is_playing);
        if let Some(volume) = action.volume {
            match self.device.set_volume(volume).await {
                Ok(()) => self.emit(PlaybackEvent::VolumeChanged { volume }),
                Err(e) => warn!("Volume change failed: {}", e),
            }
        }
        if action.pause {
            if let Err(e) = self.device.pause().await {
                warn!("Pause on focus loss failed: {}", e);
            }
        }
        if action.resume {
            if let Err(e) = self.device.play().await {
                warn!("Resume on focus gain failed: {}", e);
            }
        }
        if action.abandon {
            if let Err(e) = self.focus_arbitrator.abandon().await {
                warn!("Abandoning focus failed: {}", e);
            }
        }
        self.refresh().await;
    }

    // ------------------------------------------------------------------
    // Background work
    // ------------------------------------------------------------------

    fn on_tick(&mut self, tick: Tick) {
        if self.ticker.is_current(&tick) {
            self.state.position_ms = tick.position_ms;
            self.publish();
        }
    }

    async fn on_favorite_flush(&mut self, flush: FavoriteFlush) {
        if self.favorites.settle(&flush) {
            self.write_favorite(flush.track_id);
        }
        self.refresh().await;
    }

    /// Hand the catalog write to a background task; transport keeps running
    /// while it is in flight.
    fn write_favorite(&mut self, track_id: String) {
        let stored = self
            .queue
            .find_track(&track_id)
            .is_some_and(|track| track.is_favorite);
        let value = self.favorites.begin_write(&track_id, stored);
        debug!("Writing favorite {} for {}", value, track_id);

        let queue = self.queue.clone();
        let written = self.outbox.written.clone();
        let token = self.tasks.child_token();
        core_async::task::spawn(async move {
            core_async::select! {
                biased;
                _ = token.cancelled() => {}
                result = queue.toggle_favorite(&track_id) => {
                    written.send(FavoriteWritten { track_id, value, result }).ok();
                }
            }
        });
    }

    async fn on_favorite_written(&mut self, written: FavoriteWritten) {
        self.favorites.finish_write(&written.track_id, written.value);
        match written.result {
            Ok(value) => info!("Track {} favorite stored as {}", written.track_id, value),
            Err(e) => warn!(
                "Favorite write for {} failed, restoring stored flag: {}",
                written.track_id, e
            ),
        }
        self.refresh().await;
    }

    fn load_artwork(&mut self) {
        self.artwork_generation += 1;
        self.state.artwork = None;

        let uri = self
            .state
            .current_track
            .as_ref()
            .and_then(|t| t.artwork_uri.clone());
        let (Some(loader), Some(uri)) = (self.artwork_loader.clone(), uri) else {
            return;
        };

        debug!("Loading artwork {}", redact_locator(&uri));
        let generation = self.artwork_generation;
        let loaded = self.outbox.artwork.clone();
        let token = self.tasks.child_token();
        core_async::task::spawn(async move {
            core_async::select! {
                biased;
                _ = token.cancelled() => {}
                result = loader.load(&uri) => {
                    loaded.send(ArtworkLoaded { generation, result }).ok();
                }
            }
        });
    }

    fn on_artwork(&mut self, loaded: ArtworkLoaded) {
        if loaded.generation != self.artwork_generation {
            return;
        }
        match loaded.result {
            Ok(artwork) => {
                self.state.artwork = Some(artwork);
                self.publish();
            }
            Err(e) => debug!("Artwork load failed: {}", e),
        }
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Re-derive the published state from the device and the queue, and keep
    /// the position ticker in step with the transport.
    async fn refresh(&mut self) {
        let snapshot = self.device.snapshot();
        let queue = self.queue.state();
        let was_playing = self.state.is_playing;
        let previous_track = self.state.current_track_id().map(str::to_string);

        let in_sync = self
            .applied
            .as_ref()
            .is_some_and(|applied| applied.version == queue.version);
        let index = if in_sync && snapshot.item_count > 0 {
            snapshot.current_index
        } else {
            queue.current_index
        };
        let mut track: Option<Track> = index.and_then(|i| queue.queue.get(i)).cloned();
        if let Some(track) = track.as_mut() {
            track.is_favorite = self.favorites.overlay(&track.id, track.is_favorite);
        }

        self.state.current_track = track;
        self.state.current_index = index;
        self.state.apply_device(&snapshot);
        self.state.shuffle_enabled = queue.shuffle_enabled;
        self.state.repeat_mode = queue.repeat_mode;
        self.state.has_next = queue.has_next();
        self.state.has_previous = queue.has_previous();

        let track_changed = self.state.current_track_id() != previous_track.as_deref();
        if track_changed {
            if let (Some(track), Some(index)) = (&self.state.current_track, index) {
                info!("Now on track {} at index {}", track.id, index);
                self.emit(PlaybackEvent::TrackChanged {
                    track_id: track.id.clone(),
                    index,
                });
            }
            self.load_artwork();
        }

        if self.state.is_playing != was_playing {
            match (self.state.is_playing, &self.state.current_track) {
                (true, Some(track)) => self.emit(PlaybackEvent::Started {
                    track_id: track.id.clone(),
                    title: track.title.clone(),
                }),
                (false, Some(track)) => self.emit(PlaybackEvent::Paused {
                    track_id: track.id.clone(),
                    position_ms: self.state.position_ms,
                }),
                _ => {}
            }
        }

        self.sync_ticker(track_changed).await;
        self.publish();
    }

    async fn sync_ticker(&mut self, track_changed: bool) {
        let should_run = self.state.is_playing
            && !self.state.is_live()
            && self.state.status != PlaybackStatus::Error;

        if (track_changed || !should_run) && self.ticker.is_running() {
            self.ticker.stop().await;
        }
        if should_run && !self.ticker.is_running() {
            self.ticker
                .restart(
                    self.state.position_ms,
                    self.state.duration_ms,
                    self.outbox.ticks.clone(),
                )
                .await;
        }
    }

    fn publish(&mut self) {
        if self.state_tx.borrow().same_content(&self.state) {
            return;
        }
        self.state.updated_at = self.clock.now();
        self.state_tx.send_replace(self.state.clone());
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Playback(event)).ok();
        }
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Cancel background work, settle owed favorite writes, then abandon
    /// focus, detach from the device and release it. All three release steps
    /// run even when an earlier one fails; the first failure is returned.
    async fn release(&mut self) -> Result<()> {
        info!("Releasing playback engine");

        let owed = self.favorites.drain();
        self.tasks.cancel();
        self.ticker.stop().await;
        for id in owed {
            if let Err(e) = self.queue.toggle_favorite(&id).await {
                warn!("Favorite write for {} lost at release: {}", id, e);
            }
        }

        let mut failure = None;
        if let Err(e) = self.abandon_focus().await {
            warn!("Abandoning focus during release failed: {}", e);
            failure.get_or_insert(e);
        }
        self.device.detach_listener();
        if let Err(e) = self.device.release().await {
            warn!("Releasing render device failed: {}", e);
            failure.get_or_insert(PlaybackError::Device(e));
        }

        self.state.is_playing = false;
        self.state.status = PlaybackStatus::Idle;
        self.publish();

        failure.map_or(Ok(()), Err)
    }
}

/// Cloneable handle to the playback actor.
#[derive(Clone)]
pub struct PlaybackHandle {
    commands: mpsc::Sender<PlaybackCommand>,
    state: watch::Receiver<PlaybackState>,
    queue: QueueHandle,
    shutdown: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PlaybackHandle {
    async fn request(
        &self,
        command: impl FnOnce(Reply<()>) -> PlaybackCommand,
    ) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| PlaybackError::EngineClosed)?;
        response.await.map_err(|_| PlaybackError::EngineClosed)?
    }

    /// Start or resume. Refused with [`PlaybackError::FocusDenied`] when
    /// audio focus cannot be acquired.
    #[instrument(skip(self))]
    pub async fn play(&self) -> Result<()> {
        self.request(|reply| PlaybackCommand::Play { reply }).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| PlaybackCommand::Pause { reply }).await
    }

    /// Stop the device and give up audio focus.
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| PlaybackCommand::Stop { reply }).await
    }

    /// Seek within the current item, clamped to its duration.
    pub async fn seek_to(&self, position_ms: i64) -> Result<()> {
        self.request(|reply| PlaybackCommand::SeekTo { position_ms, reply })
            .await
    }

    pub async fn fast_forward(&self) -> Result<()> {
        self.request(|reply| PlaybackCommand::FastForward { reply })
            .await
    }

    pub async fn rewind(&self) -> Result<()> {
        self.request(|reply| PlaybackCommand::Rewind { reply }).await
    }

    pub async fn skip_next(&self) -> Result<()> {
        self.request(|reply| PlaybackCommand::SkipNext { reply }).await
    }

    pub async fn skip_previous(&self) -> Result<()> {
        self.request(|reply| PlaybackCommand::SkipPrevious { reply })
            .await
    }

    /// Build a queue around `id` and play it.
    #[instrument(skip(self))]
    pub async fn play_from_id(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.request(|reply| PlaybackCommand::PlayFromId { id, reply })
            .await
    }

    /// Build the queue of `parent_id`'s children and play from `index`.
    #[instrument(skip(self))]
    pub async fn play_from_parent(&self, parent_id: &str, index: usize) -> Result<()> {
        let parent_id = parent_id.to_string();
        self.request(|reply| PlaybackCommand::PlayFromParent {
            parent_id,
            index,
            reply,
        })
        .await
    }

    /// Toggle a favorite. Returns once the tap is registered; the catalog
    /// write follows after the debounce window.
    pub async fn mark_favorite(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.request(|reply| PlaybackCommand::MarkFavorite { id, reply })
            .await
    }

    pub async fn set_shuffle(&self, enabled: bool) -> Result<()> {
        self.request(|reply| PlaybackCommand::SetShuffle { enabled, reply })
            .await
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.request(|reply| PlaybackCommand::SetRepeatMode { mode, reply })
            .await
    }

    pub fn has_next(&self) -> bool {
        self.queue.has_next()
    }

    pub fn has_previous(&self) -> bool {
        self.queue.has_previous()
    }

    pub fn state(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }

    pub fn current_track(&self) -> Option<Track> {
        self.state.borrow().current_track.clone()
    }

    pub fn queue(&self) -> &QueueHandle {
        &self.queue
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed() && !self.shutdown.is_cancelled()
    }

    /// Release focus and the device, then wait for the actor to exit.
    /// Releasing an already released engine is a no-op.
    #[instrument(skip(self))]
    pub async fn release(&self) -> Result<()> {
        let result = match self
            .request(|reply| PlaybackCommand::Release { reply })
            .await
        {
            Err(PlaybackError::EngineClosed) => Ok(()),
            other => other,
        };
        self.join().await;
        result
    }

    /// Stop the actor without waiting on a reply. Release still runs.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.join().await;
    }

    async fn join(&self) {
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("Playback engine task ended abnormally: {}", e);
            }
        }
    }
}
