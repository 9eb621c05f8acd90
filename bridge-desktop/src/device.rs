//! Headless render device.
//!
//! Produces no sound. Each item's duration hint drives a timeline so that the
//! engine sees the same transitions, natural ends and repeats it would from a
//! real decoder.

use async_trait::async_trait;
use bridge_traits::{
    device::{
        DeviceEvent, DeviceEventSender, DeviceSnapshot, DeviceStatus, RenderDevice, RenderItem,
        TransitionReason,
    },
    error::{BridgeError, Result},
    media::{RepeatMode, UNKNOWN_DURATION},
};
use core_async::sync::CancellationToken;
use core_async::time::{sleep, Duration, Instant};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace, warn};

struct Timeline {
    items: Vec<RenderItem>,
    current: Option<usize>,
    status: DeviceStatus,
    /// Position at `anchor`, or the frozen position while paused.
    base_position_ms: i64,
    anchor: Option<Instant>,
    volume: f32,
    shuffle: bool,
    repeat: RepeatMode,
    listener: Option<DeviceEventSender>,
    end_timer: Option<CancellationToken>,
    released: bool,
}

impl Timeline {
    fn duration_ms(&self) -> i64 {
        self.current
            .and_then(|index| self.items.get(index))
            .map(|item| item.duration_ms)
            .unwrap_or(UNKNOWN_DURATION)
    }

    fn position_ms(&self) -> i64 {
        let elapsed = self
            .anchor
            .map(|anchor| anchor.elapsed().as_millis() as i64)
            .unwrap_or(0);
        let position = self.base_position_ms + elapsed;
        match self.duration_ms() {
            duration if duration > 0 => position.min(duration),
            _ => position,
        }
    }

    fn is_playing(&self) -> bool {
        self.anchor.is_some()
    }

    fn emit(&self, event: DeviceEvent) {
        if let Some(listener) = &self.listener {
            let _ = listener.send(event);
        }
    }

    fn freeze(&mut self) {
        self.base_position_ms = self.position_ms();
        self.anchor = None;
        if let Some(timer) = self.end_timer.take() {
            timer.cancel();
        }
    }

    fn enter(&mut self, index: usize, position_ms: i64) {
        self.current = Some(index);
        self.base_position_ms = position_ms.max(0);
        if self.anchor.is_some() {
            self.anchor = Some(Instant::now());
        }
    }
}

/// Silent, timeline-driven [`RenderDevice`].
#[derive(Clone)]
pub struct HeadlessRenderDevice {
    timeline: Arc<Mutex<Timeline>>,
}

impl Default for HeadlessRenderDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessRenderDevice {
    pub fn new() -> Self {
        Self {
            timeline: Arc::new(Mutex::new(Timeline {
                items: Vec::new(),
                current: None,
                status: DeviceStatus::Idle,
                base_position_ms: 0,
                anchor: None,
                volume: 1.0,
                shuffle: false,
                repeat: RepeatMode::None,
                listener: None,
                end_timer: None,
                released: false,
            })),
        }
    }

    fn check_alive(timeline: &Timeline) -> Result<()> {
        if timeline.released {
            return Err(BridgeError::NotAvailable(
                "headless device has been released".to_string(),
            ));
        }
        Ok(())
    }

    /// Arm a timer for the natural end of the active item.
    fn arm_end_timer(&self, timeline: &mut Timeline) {
        if let Some(timer) = timeline.end_timer.take() {
            timer.cancel();
        }
        if !timeline.is_playing() {
            return;
        }
        let duration = timeline.duration_ms();
        if duration <= 0 {
            return;
        }
        let remaining = (duration - timeline.position_ms()).max(0) as u64;
        let token = CancellationToken::new();
        timeline.end_timer = Some(token.clone());

        let device = self.clone();
        core_async::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep(Duration::from_millis(remaining)) => device.on_item_end(&token),
            }
        });
    }

    fn on_item_end(&self, token: &CancellationToken) {
        let mut timeline = self.timeline.lock();
        if token.is_cancelled() || timeline.released {
            return;
        }
        timeline.end_timer = None;
        let Some(index) = timeline.current else {
            return;
        };
        let count = timeline.items.len();
        let next = match timeline.repeat {
            RepeatMode::One => Some((index, TransitionReason::Repeat)),
            _ if index + 1 < count => Some((index + 1, TransitionReason::Auto)),
            RepeatMode::All => Some((0, TransitionReason::Auto)),
            RepeatMode::None => None,
        };

        match next {
            Some((next, reason)) => {
                trace!(from = index, to = next, ?reason, "Item finished");
                timeline.enter(next, 0);
                timeline.emit(DeviceEvent::ItemTransitioned {
                    index: next,
                    reason,
                });
                self.arm_end_timer(&mut timeline);
            }
            None => {
                debug!(index, "Reached end of item list");
                timeline.freeze();
                timeline.status = DeviceStatus::Ended;
                timeline.emit(DeviceEvent::IsPlayingChanged(false));
                timeline.emit(DeviceEvent::PlaybackStateChanged(DeviceStatus::Ended));
            }
        }
    }
}

#[async_trait]
impl RenderDevice for HeadlessRenderDevice {
    async fn set_items(&self, items: Vec<RenderItem>, start_index: usize) -> Result<()> {
        let mut timeline = self.timeline.lock();
        Self::check_alive(&timeline)?;
        let was_playing = timeline.is_playing();
        timeline.freeze();
        timeline.status = DeviceStatus::Idle;
        if was_playing {
            timeline.emit(DeviceEvent::IsPlayingChanged(false));
        }
        debug!(count = items.len(), start_index, "Items replaced");
        timeline.items = items;
        if timeline.items.is_empty() {
            timeline.current = None;
            timeline.base_position_ms = 0;
            return Ok(());
        }
        let index = start_index.min(timeline.items.len() - 1);
        timeline.enter(index, 0);
        timeline.emit(DeviceEvent::ItemTransitioned {
            index,
            reason: TransitionReason::PlaylistChanged,
        });
        Ok(())
    }

    async fn prepare(&self) -> Result<()> {
        let mut timeline = self.timeline.lock();
        Self::check_alive(&timeline)?;
        let Some(index) = timeline.current else {
            return Ok(());
        };
        timeline.status = DeviceStatus::Buffering;
        timeline.emit(DeviceEvent::PlaybackStateChanged(DeviceStatus::Buffering));

        let playable = timeline
            .items
            .get(index)
            .map(|item| !item.locator.is_empty())
            .unwrap_or(false);
        if !playable {
            warn!(index, "Item has no locator");
            timeline.status = DeviceStatus::Idle;
            timeline.emit(DeviceEvent::Error {
                message: format!("item {index} has no media locator"),
            });
            return Ok(());
        }

        timeline.status = DeviceStatus::Ready;
        timeline.emit(DeviceEvent::PlaybackStateChanged(DeviceStatus::Ready));
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        let mut timeline = self.timeline.lock();
        Self::check_alive(&timeline)?;
        if timeline.is_playing() || timeline.current.is_none() {
            return Ok(());
        }
        if timeline.status == DeviceStatus::Ended {
            timeline.base_position_ms = 0;
            timeline.status = DeviceStatus::Ready;
        }
        timeline.anchor = Some(Instant::now());
        timeline.emit(DeviceEvent::IsPlayingChanged(true));
        self.arm_end_timer(&mut timeline);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let mut timeline = self.timeline.lock();
        Self::check_alive(&timeline)?;
        if !timeline.is_playing() {
            return Ok(());
        }
        timeline.freeze();
        timeline.emit(DeviceEvent::IsPlayingChanged(false));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut timeline = self.timeline.lock();
        Self::check_alive(&timeline)?;
        let was_playing = timeline.is_playing();
        timeline.freeze();
        timeline.status = DeviceStatus::Idle;
        if was_playing {
            timeline.emit(DeviceEvent::IsPlayingChanged(false));
        }
        timeline.emit(DeviceEvent::PlaybackStateChanged(DeviceStatus::Idle));
        Ok(())
    }

    async fn seek(&self, position_ms: i64) -> Result<()> {
        let mut timeline = self.timeline.lock();
        Self::check_alive(&timeline)?;
        let Some(index) = timeline.current else {
            return Ok(());
        };
        timeline.enter(index, position_ms);
        self.arm_end_timer(&mut timeline);
        Ok(())
    }

    async fn seek_to_item(&self, index: usize, position_ms: i64) -> Result<()> {
        let mut timeline = self.timeline.lock();
        Self::check_alive(&timeline)?;
        if index >= timeline.items.len() {
            return Err(BridgeError::Rejected(format!(
                "item {index} out of range ({} items)",
                timeline.items.len()
            )));
        }
        let changed = timeline.current != Some(index);
        timeline.enter(index, position_ms);
        if timeline.status == DeviceStatus::Ended {
            timeline.status = DeviceStatus::Ready;
        }
        if changed {
            timeline.emit(DeviceEvent::ItemTransitioned {
                index,
                reason: TransitionReason::Seek,
            });
        }
        self.arm_end_timer(&mut timeline);
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        let mut timeline = self.timeline.lock();
        timeline.volume = volume.clamp(0.0, 1.0);
        trace!(volume = timeline.volume, "Volume set");
        Ok(())
    }

    async fn set_shuffle_enabled(&self, enabled: bool) -> Result<()> {
        self.timeline.lock().shuffle = enabled;
        Ok(())
    }

    async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.timeline.lock().repeat = mode;
        Ok(())
    }

    fn snapshot(&self) -> DeviceSnapshot {
        let timeline = self.timeline.lock();
        let position_ms = timeline.position_ms();
        DeviceSnapshot {
            status: timeline.status,
            is_playing: timeline.is_playing(),
            position_ms,
            duration_ms: timeline.duration_ms(),
            // Headless media is fully "buffered" up to the playhead.
            buffered_ms: position_ms,
            current_index: timeline.current,
            item_count: timeline.items.len(),
            volume: timeline.volume,
            shuffle_enabled: timeline.shuffle,
            repeat_mode: timeline.repeat,
        }
    }

    fn attach_listener(&self, events: DeviceEventSender) {
        self.timeline.lock().listener = Some(events);
    }

    fn detach_listener(&self) {
        self.timeline.lock().listener = None;
    }

    async fn release(&self) -> Result<()> {
        let mut timeline = self.timeline.lock();
        timeline.freeze();
        timeline.listener = None;
        timeline.items.clear();
        timeline.current = None;
        timeline.released = true;
        debug!("Headless device released");
        Ok(())
    }
}
