//! In-memory collaborator fakes.
//!
//! Each fake behaves like a well-mannered production collaborator (it emits
//! the events a real one would) and records what the core asked of it, so
//! scenario tests can assert on both sides.

use crate::{
    artwork::{Artwork, ArtworkLoader},
    catalog::{CatalogSnapshot, CatalogSource},
    device::{
        DeviceEvent, DeviceEventSender, DeviceSnapshot, DeviceStatus, RenderDevice, RenderItem,
        TransitionReason,
    },
    error::{BridgeError, Result},
    focus::{AudioFocusArbitrator, FocusChange, FocusChangeSender, FocusGrant, FocusUsage},
    media::{RepeatMode, Track},
    notification::{NotificationContent, NotificationRenderer},
    session::{
        CustomAction, MediaBrowser, MediaMetadata, QueueEntry, SessionCommand,
        SessionCommandSender, SessionProtocol, SessionToken, TransportState,
    },
    time::Clock,
};
use chrono::{DateTime, Utc};
use core_async::sync::watch;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

// ============================================================================
// Catalog
// ============================================================================

/// Catalog held in memory. Favorite writes mutate and republish.
pub struct InMemoryCatalog {
    snapshots: watch::Sender<CatalogSnapshot>,
    fail_writes: AtomicBool,
    fetches: AtomicUsize,
    favorite_writes: Mutex<Vec<(String, bool)>>,
}

impl InMemoryCatalog {
    pub fn new(items: Vec<Track>) -> Self {
        let (snapshots, _) = watch::channel(CatalogSnapshot::new(items));
        Self {
            snapshots,
            fail_writes: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            favorite_writes: Mutex::new(Vec::new()),
        }
    }

    /// Replace the contents and notify subscribers.
    pub fn publish(&self, items: Vec<Track>) {
        self.snapshots.send_replace(CatalogSnapshot::new(items));
    }

    pub fn items(&self) -> Vec<Track> {
        self.snapshots.borrow().items.clone()
    }

    /// Make subsequent `set_favorite` calls fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn favorite_writes(&self) -> Vec<(String, bool)> {
        self.favorite_writes.lock().clone()
    }
}

#[async_trait::async_trait]
impl CatalogSource for InMemoryCatalog {
    fn subscribe(&self) -> watch::Receiver<CatalogSnapshot> {
        self.snapshots.subscribe()
    }

    async fn fetch_all(&self) -> Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let items = self.items();
        self.publish(items);
        Ok(())
    }

    async fn set_favorite(&self, id: &str, value: bool) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed(format!(
                "favorite write for {id} failed"
            )));
        }
        let mut items = self.items();
        let track = items
            .iter_mut()
            .find(|track| track.id == id)
            .ok_or_else(|| BridgeError::Rejected(format!("unknown track {id}")))?;
        track.is_favorite = value;
        self.favorite_writes.lock().push((id.to_string(), value));
        self.publish(items);
        Ok(())
    }
}

// ============================================================================
// Render device
// ============================================================================

/// Calls observed by [`FakeRenderDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    SetItems { ids: Vec<String>, start_index: usize },
    Prepare,
    Play,
    Pause,
    Stop,
    Seek(i64),
    SeekToItem(usize, i64),
    SetVolume(f32),
    SetShuffle(bool),
    SetRepeat(RepeatMode),
    Release,
}

#[derive(Default)]
struct DeviceInner {
    snapshot: DeviceSnapshot,
    items: Vec<RenderItem>,
    listener: Option<DeviceEventSender>,
    released: bool,
}

/// Scriptable device. Transport calls update the snapshot and emit the
/// matching events; tests drive natural ends and failures explicitly.
pub struct FakeRenderDevice {
    inner: Mutex<DeviceInner>,
    calls: Mutex<Vec<DeviceCall>>,
    fail_release: AtomicBool,
    ready_after_seek: AtomicBool,
}

impl Default for FakeRenderDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRenderDevice {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DeviceInner::default()),
            calls: Mutex::new(Vec::new()),
            fail_release: AtomicBool::new(false),
            ready_after_seek: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn items(&self) -> Vec<RenderItem> {
        self.inner.lock().items.clone()
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().released
    }

    pub fn has_listener(&self) -> bool {
        self.inner.lock().listener.is_some()
    }

    pub fn fail_release(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }

    /// Leave `Ended` for `Ready` on an item seek, as real players do.
    pub fn ready_after_seek(&self, enabled: bool) {
        self.ready_after_seek.store(enabled, Ordering::SeqCst);
    }

    /// Move the playhead without emitting anything.
    pub fn set_position(&self, position_ms: i64) {
        self.inner.lock().snapshot.position_ms = position_ms;
    }

    /// Deliver an arbitrary event to the attached listener.
    pub fn emit(&self, event: DeviceEvent) {
        let inner = self.inner.lock();
        Self::send(&inner, event);
    }

    /// Simulate the active item playing to its natural end.
    pub fn finish_current(&self) {
        let mut inner = self.inner.lock();
        let Some(index) = inner.snapshot.current_index else {
            return;
        };
        let count = inner.items.len();
        let next = match inner.snapshot.repeat_mode {
            RepeatMode::One => Some((index, TransitionReason::Repeat)),
            _ if index + 1 < count => Some((index + 1, TransitionReason::Auto)),
            RepeatMode::All if count > 0 => Some((0, TransitionReason::Auto)),
            _ => None,
        };
        match next {
            Some((next, reason)) => {
                Self::enter_item(&mut inner, next);
                Self::send(&inner, DeviceEvent::ItemTransitioned { index: next, reason });
            }
            None => {
                inner.snapshot.status = DeviceStatus::Ended;
                inner.snapshot.position_ms = inner.snapshot.duration_ms.max(0);
                let was_playing = std::mem::replace(&mut inner.snapshot.is_playing, false);
                if was_playing {
                    Self::send(&inner, DeviceEvent::IsPlayingChanged(false));
                }
                Self::send(&inner, DeviceEvent::PlaybackStateChanged(DeviceStatus::Ended));
            }
        }
    }

    /// Simulate a fatal decode error.
    pub fn fail(&self, message: &str) {
        let mut inner = self.inner.lock();
        inner.snapshot.is_playing = false;
        inner.snapshot.status = DeviceStatus::Idle;
        Self::send(
            &inner,
            DeviceEvent::Error {
                message: message.to_string(),
            },
        );
    }

    fn record(&self, call: DeviceCall) {
        self.calls.lock().push(call);
    }

    fn send(inner: &DeviceInner, event: DeviceEvent) {
        if let Some(listener) = &inner.listener {
            let _ = listener.send(event);
        }
    }

    fn enter_item(inner: &mut DeviceInner, index: usize) {
        inner.snapshot.current_index = Some(index);
        inner.snapshot.position_ms = 0;
        inner.snapshot.buffered_ms = 0;
        inner.snapshot.duration_ms = inner
            .items
            .get(index)
            .map(|item| item.duration_ms)
            .unwrap_or(crate::media::UNKNOWN_DURATION);
    }

    fn ensure_alive(inner: &DeviceInner) -> Result<()> {
        if inner.released {
            return Err(BridgeError::NotAvailable("device released".to_string()));
        }
        Ok(())
    }

    fn set_playing(&self, playing: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::ensure_alive(&inner)?;
        if inner.snapshot.is_playing != playing {
            inner.snapshot.is_playing = playing;
            Self::send(&inner, DeviceEvent::IsPlayingChanged(playing));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RenderDevice for FakeRenderDevice {
    async fn set_items(&self, items: Vec<RenderItem>, start_index: usize) -> Result<()> {
        self.record(DeviceCall::SetItems {
            ids: items.iter().map(|item| item.id.clone()).collect(),
            start_index,
        });
        let mut inner = self.inner.lock();
        Self::ensure_alive(&inner)?;
        inner.snapshot.item_count = items.len();
        inner.items = items;
        inner.snapshot.status = DeviceStatus::Idle;
        if inner.items.is_empty() {
            inner.snapshot.current_index = None;
            inner.snapshot.duration_ms = crate::media::UNKNOWN_DURATION;
            inner.snapshot.position_ms = 0;
        } else {
            let index = start_index.min(inner.items.len() - 1);
            Self::enter_item(&mut inner, index);
        }
        Ok(())
    }

    async fn prepare(&self) -> Result<()> {
        self.record(DeviceCall::Prepare);
        let mut inner = self.inner.lock();
        Self::ensure_alive(&inner)?;
        if inner.items.is_empty() {
            return Ok(());
        }
        Self::send(&inner, DeviceEvent::PlaybackStateChanged(DeviceStatus::Buffering));
        inner.snapshot.status = DeviceStatus::Ready;
        Self::send(&inner, DeviceEvent::PlaybackStateChanged(DeviceStatus::Ready));
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.record(DeviceCall::Play);
        self.set_playing(true)
    }

    async fn pause(&self) -> Result<()> {
        self.record(DeviceCall::Pause);
        self.set_playing(false)
    }

    async fn stop(&self) -> Result<()> {
        self.record(DeviceCall::Stop);
        self.set_playing(false)?;
        let mut inner = self.inner.lock();
        inner.snapshot.status = DeviceStatus::Idle;
        inner.snapshot.buffered_ms = 0;
        Ok(())
    }

    async fn seek(&self, position_ms: i64) -> Result<()> {
        self.record(DeviceCall::Seek(position_ms));
        let mut inner = self.inner.lock();
        Self::ensure_alive(&inner)?;
        inner.snapshot.position_ms = position_ms.max(0);
        Ok(())
    }

    async fn seek_to_item(&self, index: usize, position_ms: i64) -> Result<()> {
        self.record(DeviceCall::SeekToItem(index, position_ms));
        let mut inner = self.inner.lock();
        Self::ensure_alive(&inner)?;
        if index >= inner.items.len() {
            return Err(BridgeError::Rejected(format!(
                "item {index} out of range ({} items)",
                inner.items.len()
            )));
        }
        let changed = inner.snapshot.current_index != Some(index);
        Self::enter_item(&mut inner, index);
        inner.snapshot.position_ms = position_ms.max(0);
        if inner.snapshot.status == DeviceStatus::Ended
            && self.ready_after_seek.load(Ordering::SeqCst)
        {
            inner.snapshot.status = DeviceStatus::Ready;
        }
        if changed {
            Self::send(
                &inner,
                DeviceEvent::ItemTransitioned {
                    index,
                    reason: TransitionReason::Seek,
                },
            );
        }
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        self.record(DeviceCall::SetVolume(volume));
        self.inner.lock().snapshot.volume = volume.clamp(0.0, 1.0);
        Ok(())
    }

    async fn set_shuffle_enabled(&self, enabled: bool) -> Result<()> {
        self.record(DeviceCall::SetShuffle(enabled));
        self.inner.lock().snapshot.shuffle_enabled = enabled;
        Ok(())
    }

    async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.record(DeviceCall::SetRepeat(mode));
        self.inner.lock().snapshot.repeat_mode = mode;
        Ok(())
    }

    fn snapshot(&self) -> DeviceSnapshot {
        self.inner.lock().snapshot.clone()
    }

    fn attach_listener(&self, events: DeviceEventSender) {
        self.inner.lock().listener = Some(events);
    }

    fn detach_listener(&self) {
        self.inner.lock().listener = None;
    }

    async fn release(&self) -> Result<()> {
        self.record(DeviceCall::Release);
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("release failed".to_string()));
        }
        let mut inner = self.inner.lock();
        inner.released = true;
        inner.snapshot.is_playing = false;
        inner.listener = None;
        Ok(())
    }
}

// ============================================================================
// Audio focus
// ============================================================================

/// Focus arbitrator that grants unless told otherwise.
pub struct FakeFocusArbitrator {
    grant: AtomicBool,
    holder: Mutex<Option<FocusChangeSender>>,
    requests: AtomicUsize,
    abandons: AtomicUsize,
}

impl Default for FakeFocusArbitrator {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFocusArbitrator {
    pub fn new() -> Self {
        Self {
            grant: AtomicBool::new(true),
            holder: Mutex::new(None),
            requests: AtomicUsize::new(0),
            abandons: AtomicUsize::new(0),
        }
    }

    pub fn denying() -> Self {
        let fake = Self::new();
        fake.set_grant(false);
        fake
    }

    pub fn set_grant(&self, grant: bool) {
        self.grant.store(grant, Ordering::SeqCst);
    }

    pub fn is_held(&self) -> bool {
        self.holder.lock().is_some()
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn abandon_count(&self) -> usize {
        self.abandons.load(Ordering::SeqCst)
    }

    /// Deliver a focus change to the current holder. Returns false if nobody
    /// holds focus. A `Loss` revokes the grant.
    pub fn emit(&self, change: FocusChange) -> bool {
        let mut holder = self.holder.lock();
        let delivered = holder
            .as_ref()
            .map(|sender| sender.send(change).is_ok())
            .unwrap_or(false);
        if change == FocusChange::Loss {
            *holder = None;
        }
        delivered
    }
}

#[async_trait::async_trait]
impl AudioFocusArbitrator for FakeFocusArbitrator {
    async fn request(
        &self,
        _usage: FocusUsage,
        on_change: FocusChangeSender,
    ) -> Result<FocusGrant> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.grant.load(Ordering::SeqCst) {
            return Ok(FocusGrant::Denied);
        }
        *self.holder.lock() = Some(on_change);
        Ok(FocusGrant::Granted)
    }

    async fn abandon(&self) -> Result<()> {
        self.abandons.fetch_add(1, Ordering::SeqCst);
        *self.holder.lock() = None;
        Ok(())
    }
}

// ============================================================================
// Session protocol
// ============================================================================

#[derive(Default)]
struct SessionRecord {
    tag: Option<String>,
    active: bool,
    released: bool,
    transport: Vec<TransportState>,
    metadata: Vec<MediaMetadata>,
    queues: Vec<(Option<String>, Vec<QueueEntry>)>,
    custom_actions: Vec<Vec<CustomAction>>,
    commands: Option<SessionCommandSender>,
    browser: Option<Arc<dyn MediaBrowser>>,
}

/// Protocol fake that records every publication and lets tests play the
/// controller role through [`send`](Self::send).
pub struct RecordingSessionProtocol {
    record: Mutex<SessionRecord>,
    revisions: watch::Sender<u64>,
}

impl Default for RecordingSessionProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSessionProtocol {
    pub fn new() -> Self {
        let (revisions, _) = watch::channel(0);
        Self {
            record: Mutex::new(SessionRecord::default()),
            revisions,
        }
    }

    /// Ticks once per publication.
    pub fn revisions(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }

    /// Inject a controller command. Returns false before `attach`.
    pub fn send(&self, command: SessionCommand) -> bool {
        self.record
            .lock()
            .commands
            .as_ref()
            .map(|sender| sender.send(command).is_ok())
            .unwrap_or(false)
    }

    pub fn browser(&self) -> Option<Arc<dyn MediaBrowser>> {
        self.record.lock().browser.clone()
    }

    pub fn tag(&self) -> Option<String> {
        self.record.lock().tag.clone()
    }

    pub fn is_active(&self) -> bool {
        self.record.lock().active
    }

    pub fn is_released(&self) -> bool {
        self.record.lock().released
    }

    pub fn last_transport(&self) -> Option<TransportState> {
        self.record.lock().transport.last().cloned()
    }

    pub fn transport_history(&self) -> Vec<TransportState> {
        self.record.lock().transport.clone()
    }

    pub fn last_metadata(&self) -> Option<MediaMetadata> {
        self.record.lock().metadata.last().cloned()
    }

    pub fn last_queue(&self) -> Option<(Option<String>, Vec<QueueEntry>)> {
        self.record.lock().queues.last().cloned()
    }

    pub fn last_custom_actions(&self) -> Option<Vec<CustomAction>> {
        self.record.lock().custom_actions.last().cloned()
    }

    fn bump(&self) {
        self.revisions.send_modify(|revision| *revision += 1);
    }
}

#[async_trait::async_trait]
impl SessionProtocol for RecordingSessionProtocol {
    async fn create_session(&self, tag: &str) -> Result<SessionToken> {
        self.record.lock().tag = Some(tag.to_string());
        Ok(SessionToken::new())
    }

    async fn set_active(&self, active: bool) -> Result<()> {
        self.record.lock().active = active;
        self.bump();
        Ok(())
    }

    async fn set_transport_state(&self, state: TransportState) -> Result<()> {
        self.record.lock().transport.push(state);
        self.bump();
        Ok(())
    }

    async fn set_metadata(&self, metadata: MediaMetadata) -> Result<()> {
        self.record.lock().metadata.push(metadata);
        self.bump();
        Ok(())
    }

    async fn set_queue(&self, title: Option<String>, items: Vec<QueueEntry>) -> Result<()> {
        self.record.lock().queues.push((title, items));
        self.bump();
        Ok(())
    }

    async fn set_custom_actions(&self, actions: Vec<CustomAction>) -> Result<()> {
        self.record.lock().custom_actions.push(actions);
        self.bump();
        Ok(())
    }

    fn attach(&self, commands: SessionCommandSender, browser: Arc<dyn MediaBrowser>) {
        let mut record = self.record.lock();
        record.commands = Some(commands);
        record.browser = Some(browser);
    }

    async fn release(&self) -> Result<()> {
        let mut record = self.record.lock();
        record.released = true;
        record.commands = None;
        record.browser = None;
        drop(record);
        self.bump();
        Ok(())
    }
}

// ============================================================================
// Notification, artwork, clock
// ============================================================================

#[derive(Default)]
pub struct RecordingNotificationRenderer {
    rendered: Mutex<Vec<NotificationContent>>,
    clears: AtomicUsize,
}

impl RecordingNotificationRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> Vec<NotificationContent> {
        self.rendered.lock().clone()
    }

    pub fn last(&self) -> Option<NotificationContent> {
        self.rendered.lock().last().cloned()
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl NotificationRenderer for RecordingNotificationRenderer {
    async fn render(&self, content: NotificationContent) -> Result<()> {
        self.rendered.lock().push(content);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Serves artwork from a fixed map; unknown uris fail.
#[derive(Default)]
pub struct FakeArtworkLoader {
    artwork: Mutex<HashMap<String, Artwork>>,
    loads: Mutex<Vec<String>>,
}

impl FakeArtworkLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: &str, data: &'static [u8]) {
        self.artwork
            .lock()
            .insert(uri.to_string(), Artwork::new(uri, data));
    }

    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().clone()
    }
}

#[async_trait::async_trait]
impl ArtworkLoader for FakeArtworkLoader {
    async fn load(&self, uri: &str) -> Result<Artwork> {
        self.loads.lock().push(uri.to_string());
        self.artwork
            .lock()
            .get(uri)
            .cloned()
            .ok_or_else(|| BridgeError::NotAvailable(format!("no artwork at {uri}")))
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn at_millis(millis: i64) -> Self {
        Self::new(DateTime::from_timestamp_millis(millis).unwrap_or_default())
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
