//! # Session Bridge
//!
//! Actor that mirrors the playback engine into the host's media-session
//! protocol and routes controller commands back.
//!
//! ## Overview
//!
//! Inputs, in priority order:
//!
//! 1. shutdown
//! 2. [`PlaybackState`] emissions, rendered into transport, custom actions
//!    and metadata
//! 3. [`QueueState`] emissions, republished as the protocol queue
//! 4. controller commands from the protocol (or [`SessionHandle::submit`])
//! 5. release requests from [`SessionHandle`]s
//!
//! Command dispatch carries no playback rules of its own. Each command maps
//! onto one [`PlaybackHandle`] call; media keys are resolved to commands
//! first.

use crate::error::{Result, SessionError};
use crate::listeners::{ListenerId, ListenerRegistry, MediaStateListener};
use crate::snapshot;
use crate::state::SessionState;
use bridge_traits::notification::NotificationRenderer;
use bridge_traits::session::{
    CustomAction, CustomActionKind, MediaKey, MediaMetadata, QueueEntry, SessionCommand,
    SessionCommandSender, SessionProtocol, SessionToken,
};
use bridge_traits::time::Clock;
use core_async::sync::{mpsc, oneshot, watch, CancellationToken, Mutex};
use core_async::task::JoinHandle;
use core_playback::{PlaybackHandle, PlaybackState};
use core_queue::QueueState;
use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const CONTROL_BUFFER: usize = 4;

enum Control {
    Release {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Map a hardware key onto the command it stands for.
pub fn key_command(key: MediaKey, is_playing: bool) -> SessionCommand {
    match key {
        MediaKey::Play => SessionCommand::Play,
        MediaKey::Pause => SessionCommand::Pause,
        MediaKey::PlayPause if is_playing => SessionCommand::Pause,
        MediaKey::PlayPause => SessionCommand::Play,
        MediaKey::Stop => SessionCommand::Stop,
        MediaKey::Next => SessionCommand::SkipToNext,
        MediaKey::Previous => SessionCommand::SkipToPrevious,
        MediaKey::FastForward => SessionCommand::FastForward,
        MediaKey::Rewind => SessionCommand::Rewind,
    }
}

fn command_name(command: &SessionCommand) -> &'static str {
    match command {
        SessionCommand::Play => "play",
        SessionCommand::Pause => "pause",
        SessionCommand::Stop => "stop",
        SessionCommand::SeekTo(_) => "seek_to",
        SessionCommand::FastForward => "fast_forward",
        SessionCommand::Rewind => "rewind",
        SessionCommand::SkipToNext => "skip_next",
        SessionCommand::SkipToPrevious => "skip_previous",
        SessionCommand::PlayFromId(_) => "play_from_id",
        SessionCommand::PlayFromParent { .. } => "play_from_parent",
        SessionCommand::CustomAction(kind) => kind.as_str(),
        SessionCommand::MediaButton(_) => "media_button",
    }
}

/// Last values pushed to the protocol, for change detection.
#[derive(Default)]
struct Published {
    metadata: Option<MediaMetadata>,
    actions: Vec<CustomAction>,
    queue: Option<(Option<String>, Vec<QueueEntry>)>,
}

/// Last values reported to listeners.
#[derive(Default)]
struct Notified {
    track_id: Option<String>,
    is_favorite: bool,
    error: Option<String>,
}

/// Entry point for starting the session bridge.
pub struct SessionBridge {
    protocol: Arc<dyn SessionProtocol>,
    notifications: Option<Arc<dyn NotificationRenderer>>,
    playback: PlaybackHandle,
    clock: Arc<dyn Clock>,
    listeners: Arc<ListenerRegistry>,
    event_bus: Option<EventBus>,
    token: SessionToken,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    published: Published,
    notified: Notified,
    released: bool,
}

impl SessionBridge {
    /// Create the protocol session, attach command routing and the browse
    /// tree, and start the actor.
    #[instrument(skip(protocol, notifications, playback, clock, event_bus))]
    pub async fn start(
        protocol: Arc<dyn SessionProtocol>,
        notifications: Option<Arc<dyn NotificationRenderer>>,
        playback: PlaybackHandle,
        clock: Arc<dyn Clock>,
        tag: &str,
        event_bus: Option<EventBus>,
    ) -> Result<SessionHandle> {
        let token = protocol.create_session(tag).await?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        protocol.attach(command_tx.clone(), playback.queue().browser());
        protocol.set_active(true).await?;
        info!("Media session {} created for '{}'", token, tag);

        let state = SessionState {
            token: Some(token),
            active: true,
            ..SessionState::default()
        };
        let (state_tx, state_rx) = watch::channel(state.clone());
        let (control_tx, control_rx) = mpsc::channel(CONTROL_BUFFER);
        let listeners = Arc::new(ListenerRegistry::new());
        let shutdown = CancellationToken::new();

        let bridge = SessionBridge {
            protocol,
            notifications,
            playback,
            clock,
            listeners: Arc::clone(&listeners),
            event_bus,
            token,
            state,
            state_tx,
            published: Published::default(),
            notified: Notified::default(),
            released: false,
        };
        bridge.emit(SessionEvent::Activated {
            session: token.to_string(),
        });
        let task = core_async::task::spawn(bridge.run(command_rx, control_rx, shutdown.clone()));

        Ok(SessionHandle {
            control: control_tx,
            commands: command_tx,
            state: state_rx,
            listeners,
            token,
            shutdown,
            task: Arc::new(Mutex::new(Some(task))),
        })
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut control: mpsc::Receiver<Control>,
        shutdown: CancellationToken,
    ) {
        info!("Session bridge started");

        let mut playback_rx = self.playback.subscribe();
        let mut queue_rx = self.playback.queue().subscribe();
        let queue = queue_rx.borrow_and_update().clone();
        self.on_queue(&queue).await;
        let state = playback_rx.borrow_and_update().clone();
        self.on_playback(&state).await;

        let mut following_playback = true;
        let mut following_queue = true;
        loop {
            core_async::select! {
                biased;
                _ = shutdown.cancelled() => {
                    if let Err(e) = self.teardown().await {
                        warn!("Session teardown during shutdown failed: {}", e);
                    }
                    break;
                }
                changed = playback_rx.changed(), if following_playback => {
                    if changed.is_err() {
                        warn!("Playback engine closed; session keeps its last snapshot");
                        following_playback = false;
                        continue;
                    }
                    let state = playback_rx.borrow_and_update().clone();
                    self.on_playback(&state).await;
                }
                changed = queue_rx.changed(), if following_queue => {
                    if changed.is_err() {
                        following_queue = false;
                        continue;
                    }
                    let queue = queue_rx.borrow_and_update().clone();
                    self.on_queue(&queue).await;
                }
                Some(command) = commands.recv() => self.dispatch(command).await,
                request = control.recv() => match request {
                    Some(Control::Release { reply }) => {
                        reply.send(self.teardown().await).ok();
                        break;
                    }
                    None => {
                        if let Err(e) = self.teardown().await {
                            warn!("Session teardown after last handle dropped failed: {}", e);
                        }
                        break;
                    }
                },
            }
        }

        info!("Session bridge stopped");
    }

    async fn on_playback(&mut self, state: &PlaybackState) {
        let anchor_ms = self.clock.unix_timestamp_millis();
        let transport = snapshot::transport_state(state, anchor_ms);
        if let Err(e) = self.protocol.set_transport_state(transport.clone()).await {
            warn!("Failed to publish transport state: {}", e);
        }

        let actions = snapshot::custom_actions(state);
        if actions != self.published.actions {
            if let Err(e) = self.protocol.set_custom_actions(actions.clone()).await {
                warn!("Failed to publish custom actions: {}", e);
            }
            self.published.actions = actions;
        }

        let metadata = snapshot::metadata(state);
        if metadata != self.published.metadata {
            debug!(
                "Publishing metadata for {:?}",
                metadata.as_ref().map(|m| m.media_id.as_str())
            );
            if let Err(e) = self
                .protocol
                .set_metadata(metadata.clone().unwrap_or_default())
                .await
            {
                warn!("Failed to publish metadata: {}", e);
            }
            self.published.metadata = metadata.clone();
        }

        self.notify_listeners(state, transport.position_ms, anchor_ms, transport.speed);

        let next = SessionState {
            metadata,
            artwork: state.artwork.clone(),
            is_playing: state.is_playing,
            is_favorite: state.is_favorite(),
            ..self.state.clone()
        };
        self.update_state(next).await;
    }

    fn notify_listeners(
        &mut self,
        state: &PlaybackState,
        position_ms: Option<i64>,
        anchor_ms: i64,
        speed: f32,
    ) {
        let track_id = state.current_track_id().map(str::to_string);

        match &state.current_track {
            Some(track) if self.notified.track_id != track_id => {
                self.listeners.notify(|l| l.on_change_track(track));
                self.notified.is_favorite = track.is_favorite;
            }
            Some(track) if self.notified.is_favorite != track.is_favorite => {
                self.listeners
                    .notify(|l| l.on_favorite_track(&track.id, track.is_favorite));
                self.notified.is_favorite = track.is_favorite;
            }
            _ => {}
        }
        self.notified.track_id = track_id;

        match state.current_track_id() {
            Some(id) if state.is_playing => {
                self.listeners
                    .notify(|l| l.on_play_track(id, position_ms, anchor_ms, speed));
            }
            id => self.listeners.notify(|l| l.on_pause_track(id)),
        }

        if state.error != self.notified.error {
            if let Some(message) = &state.error {
                self.listeners.playback_error(message);
            }
            self.notified.error = state.error.clone();
        }
    }

    async fn on_queue(&mut self, queue: &QueueState) {
        let published = (
            self.playback.queue().queue_title(),
            snapshot::queue_entries(queue),
        );
        if self.published.queue.as_ref() == Some(&published) {
            return;
        }

        debug!("Publishing queue of {} items", published.1.len());
        if let Err(e) = self
            .protocol
            .set_queue(published.0.clone(), published.1.clone())
            .await
        {
            warn!("Failed to publish queue: {}", e);
        }
        self.published.queue = Some(published);
    }

    async fn dispatch(&mut self, command: SessionCommand) {
        let command = match command {
            SessionCommand::MediaButton(key) => {
                let is_playing = self.playback.state().is_playing;
                debug!("Media key {:?} while playing={}", key, is_playing);
                key_command(key, is_playing)
            }
            other => other,
        };

        debug!("Session command: {}", command_name(&command));
        self.emit(SessionEvent::CommandReceived {
            command: command_name(&command).to_string(),
        });

        if let Err(e) = self.execute(command).await {
            warn!("Session command failed: {}", e);
            if e.is_surfaced() {
                self.listeners.playback_error(&e.to_string());
            }
        }
    }

    async fn execute(&mut self, command: SessionCommand) -> Result<()> {
        match command {
            SessionCommand::Play => {
                self.playback.play().await?;
                self.set_active(true).await
            }
            SessionCommand::Pause => Ok(self.playback.pause().await?),
            SessionCommand::Stop => {
                self.playback.stop().await?;
                self.set_active(false).await
            }
            SessionCommand::SeekTo(position_ms) => {
                self.playback.seek_to(position_ms).await?;
                let state = self.playback.state();
                if let Some(id) = state.current_track_id().filter(|_| !state.is_live()) {
                    self.listeners
                        .notify(|l| l.on_seek_track(id, state.position_ms));
                }
                Ok(())
            }
            SessionCommand::FastForward => Ok(self.playback.fast_forward().await?),
            SessionCommand::Rewind => Ok(self.playback.rewind().await?),
            SessionCommand::SkipToNext => Ok(self.playback.skip_next().await?),
            SessionCommand::SkipToPrevious => Ok(self.playback.skip_previous().await?),
            SessionCommand::PlayFromId(id) => Ok(self.playback.play_from_id(&id).await?),
            SessionCommand::PlayFromParent { parent_id, index } => {
                Ok(self.playback.play_from_parent(&parent_id, index).await?)
            }
            SessionCommand::CustomAction(kind) => self.custom_action(kind).await,
            SessionCommand::MediaButton(key) => {
                warn!("Unresolved media key {:?}", key);
                Ok(())
            }
        }
    }

    async fn custom_action(&mut self, kind: CustomActionKind) -> Result<()> {
        let current = self.playback.state();
        match kind {
            CustomActionKind::ToggleFavorite => match current.current_track_id() {
                Some(id) => Ok(self.playback.mark_favorite(id).await?),
                None => {
                    debug!("Favorite toggle with nothing loaded");
                    Ok(())
                }
            },
            CustomActionKind::ToggleShuffle => {
                Ok(self.playback.set_shuffle(!current.shuffle_enabled).await?)
            }
            CustomActionKind::ToggleRepeat => Ok(self
                .playback
                .set_repeat_mode(current.repeat_mode.cycled())
                .await?),
        }
    }

    async fn set_active(&mut self, active: bool) -> Result<()> {
        if self.state.active == active {
            return Ok(());
        }
        self.protocol.set_active(active).await?;
        info!("Media session {} active={}", self.token, active);

        let session = self.token.to_string();
        self.emit(if active {
            SessionEvent::Activated { session }
        } else {
            SessionEvent::Deactivated { session }
        });

        let next = SessionState {
            active,
            ..self.state.clone()
        };
        self.update_state(next).await;
        Ok(())
    }

    async fn update_state(&mut self, next: SessionState) {
        if next == self.state {
            return;
        }
        self.state = next;
        self.state_tx.send_replace(self.state.clone());

        if let Some(renderer) = &self.notifications {
            if let Err(e) = renderer.render(self.state.notification()).await {
                warn!("Failed to render notification: {}", e);
            }
        }
    }

    /// Final pause, protocol release, playback release, notification clear.
    /// Runs once; later calls return `Ok`.
    async fn teardown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        info!("Tearing down media session {}", self.token);

        let mut failure: Option<SessionError> = None;

        self.listeners.notify(|l| l.on_pause_track(None));

        if let Err(e) = self.protocol.set_active(false).await {
            warn!("Failed to deactivate session: {}", e);
            failure.get_or_insert(e.into());
        }
        if let Err(e) = self.protocol.release().await {
            warn!("Failed to release session: {}", e);
            failure.get_or_insert(e.into());
        }
        self.emit(SessionEvent::Deactivated {
            session: self.token.to_string(),
        });

        if let Err(e) = self.playback.release().await {
            warn!("Failed to release playback: {}", e);
            failure.get_or_insert(e.into());
        }

        if let Some(renderer) = &self.notifications {
            if let Err(e) = renderer.clear().await {
                warn!("Failed to clear notification: {}", e);
                failure.get_or_insert(e.into());
            }
        }

        self.state.active = false;
        self.state_tx.send_replace(self.state.clone());
        self.emit(SessionEvent::Released);

        failure.map_or(Ok(()), Err)
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Session(event)).ok();
        }
    }
}

/// Cloneable handle to the session bridge.
#[derive(Clone)]
pub struct SessionHandle {
    control: mpsc::Sender<Control>,
    commands: SessionCommandSender,
    state: watch::Receiver<SessionState>,
    listeners: Arc<ListenerRegistry>,
    token: SessionToken,
    shutdown: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionHandle {
    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn register_listener(&self, listener: Arc<dyn MediaStateListener>) -> ListenerId {
        let id = self.listeners.register(listener);
        debug!("Registered media state {}", id);
        id
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    pub fn listeners(&self) -> Arc<ListenerRegistry> {
        Arc::clone(&self.listeners)
    }

    /// Queue a command as if a controller had sent it.
    pub fn submit(&self, command: SessionCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }

    pub fn is_running(&self) -> bool {
        !self.control.is_closed() && !self.shutdown.is_cancelled()
    }

    /// Tear the session down and wait for the actor to exit. Releasing twice
    /// is a no-op.
    #[instrument(skip(self))]
    pub async fn release(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        let result = match self.control.send(Control::Release { reply }).await {
            Ok(()) => response.await.unwrap_or(Ok(())),
            Err(_) => Ok(()),
        };
        self.join().await;
        result
    }

    /// Stop the actor without waiting on a reply. Teardown still runs.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.join().await;
    }

    async fn join(&self) {
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("Session bridge task ended abnormally: {}", e);
            }
        }
    }
}
