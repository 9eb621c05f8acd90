//! Playback engine tests against the fake device, focus arbitrator and catalog.

use async_trait::async_trait;
use bridge_traits::artwork::ArtworkLoader;
use bridge_traits::catalog::{CatalogSnapshot, CatalogSource};
use bridge_traits::device::{
    DeviceEventSender, DeviceSnapshot, DeviceStatus, RenderDevice, RenderItem,
};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::fakes::{
    DeviceCall, FakeArtworkLoader, FakeFocusArbitrator, FakeRenderDevice, InMemoryCatalog,
    ManualClock,
};
use bridge_traits::focus::FocusChange;
use bridge_traits::media::{RepeatMode, Track};
use core_async::sync::{broadcast, watch};
use core_async::time::{sleep, timeout, Duration, Instant};
use core_playback::{PlaybackEngine, PlaybackError, PlaybackHandle, PlaybackState, PlaybackStatus};
use core_queue::{QueueEngine, QueueHandle, SortCriterion};
use core_runtime::config::{BrowseLabels, EngineSettings};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use mockall::mock;
use std::sync::Arc;

fn song(id: &str) -> Track {
    Track::new(id, format!("Song {id}"))
        .with_parent("P")
        .with_artist("Band")
        .with_artwork(format!("https://img/{id}.png"))
        .with_media(format!("file:///music/{id}.mp3"))
        .with_duration(60_000)
}

fn catalog_items() -> Vec<Track> {
    vec![
        Track::new("P", "Parent Album"),
        song("A"),
        song("B"),
        song("C"),
        Track::new("radio", "Radio")
            .with_media("http://radio/live")
            .with_duration(-1),
    ]
}

fn settings() -> EngineSettings {
    EngineSettings {
        shuffle_seed: Some(3),
        ..EngineSettings::default()
    }
}

struct Rig {
    catalog: Arc<InMemoryCatalog>,
    device: Arc<FakeRenderDevice>,
    focus: Arc<FakeFocusArbitrator>,
    queue: QueueHandle,
    playback: PlaybackHandle,
    events: broadcast::Receiver<CoreEvent>,
}

struct RigOptions {
    focus: FakeFocusArbitrator,
    settings: EngineSettings,
    artwork: Option<Arc<FakeArtworkLoader>>,
}

impl Default for RigOptions {
    fn default() -> Self {
        Self {
            focus: FakeFocusArbitrator::new(),
            settings: settings(),
            artwork: None,
        }
    }
}

async fn rig_with(options: RigOptions) -> Rig {
    let catalog = Arc::new(InMemoryCatalog::new(catalog_items()));
    let device = Arc::new(FakeRenderDevice::new());
    let focus = Arc::new(options.focus);
    let clock = Arc::new(ManualClock::at_millis(5_000));
    let bus = EventBus::new(256);
    let events = bus.subscribe();

    let queue = QueueEngine::spawn(
        catalog.clone(),
        clock.clone(),
        &options.settings,
        BrowseLabels::default(),
        Some(bus.clone()),
    );
    // The catalog is applied once the queue answers its first command.
    queue.set_sort_criterion(SortCriterion::None).await.unwrap();

    let playback = PlaybackEngine::spawn(
        device.clone(),
        focus.clone(),
        options
            .artwork
            .map(|loader| loader as Arc<dyn ArtworkLoader>),
        queue.clone(),
        clock,
        &options.settings,
        Some(bus),
    );

    Rig {
        catalog,
        device,
        focus,
        queue,
        playback,
        events,
    }
}

async fn rig() -> Rig {
    rig_with(RigOptions::default()).await
}

async fn wait_until(
    rx: &mut watch::Receiver<PlaybackState>,
    what: impl FnMut(&PlaybackState) -> bool,
) -> PlaybackState {
    timeout(Duration::from_secs(5), rx.wait_for(what))
        .await
        .expect("timed out waiting for playback state")
        .expect("playback engine gone")
        .clone()
}

/// Focus changes and device events are handled before any later command, so
/// a no-op command is a barrier.
async fn round_trip(playback: &PlaybackHandle) {
    let mode = playback.state().repeat_mode;
    playback.set_repeat_mode(mode).await.unwrap();
}

fn current_id(state: &PlaybackState) -> Option<&str> {
    state.current_track_id()
}

#[tokio::test]
async fn play_from_parent_loads_and_plays() {
    let rig = rig().await;

    rig.playback.play_from_parent("P", 1).await.unwrap();

    let state = rig.playback.state();
    assert!(state.is_playing);
    assert_eq!(state.status, PlaybackStatus::Ready);
    assert_eq!(current_id(&state), Some("B"));
    assert_eq!(state.current_index, Some(1));
    assert_eq!(state.duration_ms, 60_000);
    assert!(state.has_next && state.has_previous);

    assert_eq!(
        rig.device.calls(),
        vec![
            DeviceCall::SetItems {
                ids: vec!["A".into(), "B".into(), "C".into()],
                start_index: 1,
            },
            DeviceCall::Prepare,
            DeviceCall::Play,
        ]
    );
    assert!(rig.focus.is_held());
    assert_eq!(rig.focus.request_count(), 1);
}

#[tokio::test]
async fn scenario_play_refused_without_focus() {
    let rig = rig_with(RigOptions {
        focus: FakeFocusArbitrator::denying(),
        ..RigOptions::default()
    })
    .await;
    let mut events = rig.events;

    let err = rig.playback.play().await.unwrap_err();
    assert!(matches!(err, PlaybackError::FocusDenied));
    assert!(err.is_surfaced());

    let state = rig.playback.state();
    assert!(!state.is_playing);
    assert_ne!(state.status, PlaybackStatus::Error);
    assert_eq!(state.error, None);
    assert!(!rig.device.calls().contains(&DeviceCall::Play));

    let mut denied = false;
    while let Ok(event) = events.try_recv() {
        denied |= event == CoreEvent::Playback(PlaybackEvent::FocusDenied);
    }
    assert!(denied);
}

#[tokio::test]
async fn play_with_nothing_loaded_starts_first_playable_track() {
    let rig = rig().await;

    rig.playback.play().await.unwrap();

    let state = rig.playback.state();
    assert!(state.is_playing);
    assert_eq!(current_id(&state), Some("A"));
    let queue = rig.queue.state();
    assert_eq!(queue.ids().collect::<Vec<_>>(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn play_from_parent_denied_focus_keeps_queue_loaded() {
    let rig = rig_with(RigOptions {
        focus: FakeFocusArbitrator::denying(),
        ..RigOptions::default()
    })
    .await;

    let err = rig.playback.play_from_parent("P", 0).await.unwrap_err();
    assert!(matches!(err, PlaybackError::FocusDenied));

    let state = rig.playback.state();
    assert_eq!(current_id(&state), Some("A"));
    assert!(!state.is_playing);

    rig.focus.set_grant(true);
    rig.playback.play().await.unwrap();
    assert!(rig.playback.state().is_playing);
}

#[tokio::test]
async fn scenario_fast_forward_near_end_skips_to_next() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 0).await.unwrap();

    rig.device.set_position(55_000);
    rig.playback.fast_forward().await.unwrap();

    let state = rig.playback.state();
    assert_eq!(current_id(&state), Some("B"));
    assert_eq!(state.position_ms, 0);
    assert_eq!(rig.queue.state().current_index, Some(1));
    assert!(rig.device.calls().contains(&DeviceCall::SeekToItem(1, 0)));
}

#[tokio::test]
async fn rewind_and_fast_forward_share_clamp_rules() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 1).await.unwrap();

    rig.device.set_position(30_000);
    rig.device.clear_calls();
    rig.playback.rewind().await.unwrap();
    assert_eq!(rig.device.calls(), vec![DeviceCall::Seek(15_000)]);

    rig.playback.fast_forward().await.unwrap();
    assert!(rig.device.calls().contains(&DeviceCall::Seek(30_000)));

    rig.device.set_position(5_000);
    rig.playback.rewind().await.unwrap();
    assert_eq!(current_id(&rig.playback.state()), Some("A"));
}

#[tokio::test]
async fn seek_is_clamped_to_duration() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 0).await.unwrap();
    rig.device.clear_calls();

    rig.playback.seek_to(90_000).await.unwrap();
    rig.playback.seek_to(-5).await.unwrap();

    assert_eq!(
        rig.device.calls(),
        vec![DeviceCall::Seek(60_000), DeviceCall::Seek(0)]
    );
}

#[tokio::test]
async fn scenario_transient_loss_resumes_only_if_playing() {
    let rig = rig().await;
    let mut state = rig.playback.subscribe();
    rig.playback.play_from_parent("P", 0).await.unwrap();

    assert!(rig.focus.emit(FocusChange::TransientLoss));
    wait_until(&mut state, |s| !s.is_playing).await;
    assert!(rig.focus.emit(FocusChange::Gain));
    let resumed = wait_until(&mut state, |s| s.is_playing).await;
    assert_eq!(current_id(&resumed), Some("A"));

    rig.playback.pause().await.unwrap();
    assert!(rig.focus.emit(FocusChange::TransientLoss));
    assert!(rig.focus.emit(FocusChange::Gain));
    round_trip(&rig.playback).await;
    assert!(!rig.playback.state().is_playing);
}

#[tokio::test]
async fn duck_lowers_volume_and_keeps_playing() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 0).await.unwrap();

    assert!(rig.focus.emit(FocusChange::TransientLossDuck));
    round_trip(&rig.playback).await;
    let state = rig.playback.state();
    assert!(state.is_playing);
    assert!((state.volume - 0.15).abs() < f32::EPSILON);

    assert!(rig.focus.emit(FocusChange::Gain));
    round_trip(&rig.playback).await;
    assert!((rig.playback.state().volume - 1.0).abs() < f32::EPSILON);
}

#[tokio::test]
async fn permanent_loss_pauses_and_requires_new_request() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 0).await.unwrap();

    assert!(rig.focus.emit(FocusChange::Loss));
    round_trip(&rig.playback).await;
    assert!(!rig.playback.state().is_playing);
    assert!(!rig.focus.is_held());

    rig.playback.play().await.unwrap();
    assert!(rig.playback.state().is_playing);
    assert_eq!(rig.focus.request_count(), 2);
}

#[tokio::test]
async fn play_during_transient_loss_asks_for_focus_again() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 0).await.unwrap();
    assert_eq!(rig.focus.request_count(), 1);

    assert!(rig.focus.emit(FocusChange::TransientLoss));
    round_trip(&rig.playback).await;
    assert!(!rig.playback.state().is_playing);

    rig.focus.set_grant(false);
    let err = rig.playback.play().await.unwrap_err();
    assert!(matches!(err, PlaybackError::FocusDenied));
    assert!(!rig.playback.state().is_playing);
    assert_eq!(rig.focus.request_count(), 2);

    rig.focus.set_grant(true);
    rig.playback.play().await.unwrap();
    assert!(rig.playback.state().is_playing);
    assert_eq!(rig.focus.request_count(), 3);
}

#[tokio::test]
async fn natural_end_advances_queue_index() {
    let rig = rig().await;
    let mut state = rig.playback.subscribe();
    rig.playback.play_from_parent("P", 0).await.unwrap();
    let version = rig.queue.state().version;

    rig.device.finish_current();
    let next = wait_until(&mut state, |s| s.current_track_id() == Some("B")).await;
    assert!(next.is_playing);

    round_trip(&rig.playback).await;
    let queue = rig.queue.state();
    assert_eq!(queue.current_index, Some(1));
    assert_eq!(queue.version, version);
    let loads = rig
        .device
        .calls()
        .into_iter()
        .filter(|call| matches!(call, DeviceCall::SetItems { .. }))
        .count();
    assert_eq!(loads, 1);
}

#[tokio::test]
async fn queue_end_parks_on_first_item() {
    let rig = rig().await;
    let mut state = rig.playback.subscribe();
    rig.playback.play_from_parent("P", 2).await.unwrap();

    rig.device.finish_current();
    let ended = wait_until(&mut state, |s| {
        s.status == PlaybackStatus::Ended && s.current_index == Some(0)
    })
    .await;
    assert!(!ended.is_playing);
    assert_eq!(ended.position_ms, 0);
    round_trip(&rig.playback).await;
    assert_eq!(rig.queue.state().current_index, Some(0));
    assert!(rig.device.calls().contains(&DeviceCall::SeekToItem(0, 0)));

    rig.device.clear_calls();
    rig.playback.play().await.unwrap();
    let state = rig.playback.state();
    assert!(state.is_playing);
    assert_eq!(state.status, PlaybackStatus::Ready);
    assert_eq!(current_id(&state), Some("A"));
    assert_eq!(rig.device.calls(), vec![DeviceCall::Prepare, DeviceCall::Play]);
}

#[tokio::test]
async fn queue_end_holds_while_the_device_reports_ready() {
    let rig = rig().await;
    rig.device.ready_after_seek(true);
    let mut state = rig.playback.subscribe();
    rig.playback.play_from_parent("P", 2).await.unwrap();

    rig.device.finish_current();
    wait_until(&mut state, |s| s.status == PlaybackStatus::Ended).await;
    // The rewind transition and the queue echo are both handled by now.
    round_trip(&rig.playback).await;
    round_trip(&rig.playback).await;

    assert_eq!(rig.device.snapshot().status, DeviceStatus::Ready);
    let parked = rig.playback.state();
    assert_eq!(parked.status, PlaybackStatus::Ended);
    assert_eq!(parked.current_index, Some(0));
    assert!(!parked.is_playing);

    rig.playback.skip_next().await.unwrap();
    let moved = rig.playback.state();
    assert_eq!(moved.status, PlaybackStatus::Ready);
    assert_eq!(current_id(&moved), Some("B"));
}

#[tokio::test]
async fn seek_after_queue_end_leaves_ended() {
    let rig = rig().await;
    rig.device.ready_after_seek(true);
    let mut state = rig.playback.subscribe();
    rig.playback.play_from_parent("P", 2).await.unwrap();

    rig.device.finish_current();
    wait_until(&mut state, |s| s.status == PlaybackStatus::Ended).await;
    rig.playback.seek_to(10_000).await.unwrap();

    let state = rig.playback.state();
    assert_eq!(state.status, PlaybackStatus::Ready);
    assert_eq!(state.position_ms, 10_000);
    assert!(!state.is_playing);
}

#[tokio::test]
async fn device_error_surfaces_and_skip_recovers() {
    let rig = rig().await;
    let mut state = rig.playback.subscribe();
    rig.playback.play_from_parent("P", 0).await.unwrap();

    rig.device.fail("decoder crashed");
    let failed = wait_until(&mut state, |s| s.status == PlaybackStatus::Error).await;
    assert_eq!(failed.error.as_deref(), Some("decoder crashed"));
    assert!(!failed.is_playing);

    rig.playback.skip_next().await.unwrap();
    let recovered = rig.playback.state();
    assert_eq!(recovered.status, PlaybackStatus::Ready);
    assert_eq!(recovered.error, None);
    assert!(recovered.is_playing);
    assert_eq!(current_id(&recovered), Some("B"));
}

#[tokio::test]
async fn skip_under_repeat_one_restarts_track() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 1).await.unwrap();
    rig.playback.set_repeat_mode(RepeatMode::One).await.unwrap();
    assert!(rig.device.calls().contains(&DeviceCall::SetRepeat(RepeatMode::One)));

    rig.device.set_position(40_000);
    rig.device.clear_calls();
    rig.playback.skip_next().await.unwrap();

    assert_eq!(rig.device.calls(), vec![DeviceCall::Seek(0)]);
    assert_eq!(current_id(&rig.playback.state()), Some("B"));
}

#[tokio::test]
async fn skip_at_boundary_is_a_no_op() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 0).await.unwrap();
    rig.device.clear_calls();

    rig.playback.skip_previous().await.unwrap();

    assert!(rig.device.calls().is_empty());
    assert!(!rig.playback.has_previous());
    assert!(rig.playback.has_next());
}

#[tokio::test]
async fn shuffle_reorders_without_restarting_current_track() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 1).await.unwrap();
    rig.device.set_position(20_000);
    rig.device.clear_calls();

    rig.playback.set_shuffle(true).await.unwrap();

    let state = rig.playback.state();
    assert!(state.shuffle_enabled);
    assert!(state.is_playing);
    assert_eq!(current_id(&state), Some("B"));

    let calls = rig.device.calls();
    assert!(calls.contains(&DeviceCall::SetShuffle(true)));
    assert!(calls.contains(&DeviceCall::Seek(20_000)));
    let (ids, start_index) = calls
        .iter()
        .find_map(|call| match call {
            DeviceCall::SetItems { ids, start_index } => Some((ids.clone(), *start_index)),
            _ => None,
        })
        .expect("queue reloaded");
    assert_eq!(ids[start_index], "B");
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn queue_built_elsewhere_follows_autoplay_setting() {
    let rig = rig_with(RigOptions {
        settings: EngineSettings {
            autoplay_on_load: false,
            ..settings()
        },
        ..RigOptions::default()
    })
    .await;
    let mut state = rig.playback.subscribe();

    rig.queue.build_queue_by_parent("P", 2).await.unwrap();
    let loaded = wait_until(&mut state, |s| s.current_track_id() == Some("C")).await;
    assert!(!loaded.is_playing);
    assert!(!rig.device.calls().contains(&DeviceCall::Play));

    rig.queue.clear().await.unwrap();
    wait_until(&mut state, |s| s.current_track.is_none()).await;
    assert!(rig.device.calls().contains(&DeviceCall::SetItems {
        ids: Vec::new(),
        start_index: 0,
    }));
}

#[tokio::test]
async fn unknown_id_is_not_found_and_changes_nothing() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 0).await.unwrap();
    let before = rig.playback.state();

    let err = rig.playback.play_from_id("missing").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_surfaced());

    let after = rig.playback.state();
    assert_eq!(after.current_track, before.current_track);
    assert_eq!(after.is_playing, before.is_playing);
}

#[tokio::test]
async fn live_track_has_no_position() {
    let rig = rig().await;

    rig.playback.play_from_id("radio").await.unwrap();

    let state = rig.playback.state();
    assert!(state.is_playing);
    assert!(state.is_live());
    assert_eq!(state.position_ms, -1);
    assert_eq!(state.duration_ms, -1);

    rig.device.clear_calls();
    rig.playback.seek_to(10_000).await.unwrap();
    assert!(rig.device.calls().is_empty());
}

#[tokio::test]
async fn stop_releases_focus() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 0).await.unwrap();

    rig.playback.stop().await.unwrap();

    let state = rig.playback.state();
    assert!(!state.is_playing);
    assert_eq!(state.status, PlaybackStatus::Idle);
    assert!(!rig.focus.is_held());
    assert_eq!(rig.focus.abandon_count(), 1);
    assert!(rig.device.calls().contains(&DeviceCall::Stop));
}

#[tokio::test(start_paused = true)]
async fn position_ticks_while_playing() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 0).await.unwrap();

    sleep(Duration::from_millis(3_500)).await;
    assert_eq!(rig.playback.state().position_ms, 3_000);

    rig.playback.pause().await.unwrap();
    let paused_at = rig.playback.state().position_ms;
    sleep(Duration::from_millis(5_000)).await;
    assert_eq!(rig.playback.state().position_ms, paused_at);
}

#[tokio::test(start_paused = true)]
async fn favorite_taps_are_debounced() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 0).await.unwrap();

    rig.playback.mark_favorite("A").await.unwrap();
    assert!(rig.playback.state().is_favorite());
    assert!(rig.catalog.favorite_writes().is_empty());

    sleep(Duration::from_millis(600)).await;
    assert_eq!(rig.catalog.favorite_writes(), vec![("A".to_string(), true)]);
    assert!(rig.playback.state().is_favorite());

    rig.playback.mark_favorite("A").await.unwrap();
    sleep(Duration::from_millis(100)).await;
    rig.playback.mark_favorite("A").await.unwrap();
    assert!(rig.playback.state().is_favorite());

    sleep(Duration::from_millis(600)).await;
    assert_eq!(rig.catalog.favorite_writes().len(), 1);
    assert!(rig.playback.state().is_favorite());
}

#[tokio::test(start_paused = true)]
async fn failed_favorite_write_restores_flag() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 0).await.unwrap();
    rig.catalog.fail_writes(true);

    rig.playback.mark_favorite("A").await.unwrap();
    assert!(rig.playback.state().is_favorite());

    sleep(Duration::from_millis(600)).await;
    assert!(!rig.playback.state().is_favorite());
}

/// Catalog whose favorite writes take a long time to land.
struct SlowCatalog {
    inner: InMemoryCatalog,
    delay: Duration,
}

#[async_trait]
impl CatalogSource for SlowCatalog {
    fn subscribe(&self) -> watch::Receiver<CatalogSnapshot> {
        self.inner.subscribe()
    }

    async fn fetch_all(&self) -> BridgeResult<()> {
        self.inner.fetch_all().await
    }

    async fn set_favorite(&self, id: &str, value: bool) -> BridgeResult<()> {
        sleep(self.delay).await;
        self.inner.set_favorite(id, value).await
    }
}

#[tokio::test(start_paused = true)]
async fn slow_favorite_write_does_not_hold_up_transport() {
    let catalog = Arc::new(SlowCatalog {
        inner: InMemoryCatalog::new(catalog_items()),
        delay: Duration::from_secs(10),
    });
    let clock = Arc::new(ManualClock::at_millis(0));
    let queue = QueueEngine::spawn(
        catalog.clone(),
        clock.clone(),
        &settings(),
        BrowseLabels::default(),
        None,
    );
    queue.set_sort_criterion(SortCriterion::None).await.unwrap();
    let playback = PlaybackEngine::spawn(
        Arc::new(FakeRenderDevice::new()),
        Arc::new(FakeFocusArbitrator::new()),
        None,
        queue.clone(),
        clock,
        &settings(),
        None,
    );
    playback.play_from_parent("P", 0).await.unwrap();

    playback.mark_favorite("A").await.unwrap();
    sleep(Duration::from_millis(600)).await;
    // Window closed, write still in flight: the flag holds its new value.
    assert!(catalog.inner.favorite_writes().is_empty());
    assert!(playback.state().is_favorite());

    let started = Instant::now();
    playback.pause().await.unwrap();
    playback.skip_next().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    let state = playback.state();
    assert!(!state.is_playing);
    assert_eq!(current_id(&state), Some("B"));

    sleep(Duration::from_secs(10)).await;
    assert_eq!(
        catalog.inner.favorite_writes(),
        vec![("A".to_string(), true)]
    );
    assert!(queue.find_track("A").unwrap().is_favorite);
}

#[tokio::test]
async fn favorite_on_unknown_track_is_rejected() {
    let rig = rig().await;
    let err = rig.playback.mark_favorite("missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn artwork_follows_current_track() {
    let loader = Arc::new(FakeArtworkLoader::new());
    loader.insert("https://img/A.png", b"png-a");
    let rig = rig_with(RigOptions {
        artwork: Some(loader.clone()),
        ..RigOptions::default()
    })
    .await;
    let mut state = rig.playback.subscribe();

    rig.playback.play_from_parent("P", 0).await.unwrap();
    let with_art = wait_until(&mut state, |s| s.artwork.is_some()).await;
    assert_eq!(
        with_art.artwork.map(|a| a.uri),
        Some("https://img/A.png".to_string())
    );

    // No artwork stored for B: the load fails quietly.
    rig.playback.skip_next().await.unwrap();
    round_trip(&rig.playback).await;
    let state = rig.playback.state();
    assert_eq!(current_id(&state), Some("B"));
    assert!(state.artwork.is_none());
    assert_eq!(
        loader.loads(),
        vec!["https://img/A.png".to_string(), "https://img/B.png".to_string()]
    );
}

#[tokio::test]
async fn release_runs_every_step_and_is_idempotent() {
    let rig = rig().await;
    rig.playback.play_from_parent("P", 0).await.unwrap();

    rig.playback.release().await.unwrap();

    assert!(!rig.focus.is_held());
    assert!(rig.device.is_released());
    assert!(!rig.device.has_listener());
    assert!(!rig.playback.is_running());

    rig.playback.release().await.unwrap();
    assert!(matches!(
        rig.playback.play().await,
        Err(PlaybackError::EngineClosed)
    ));
}

mock! {
    pub Device {}

    #[async_trait]
    impl RenderDevice for Device {
        async fn set_items(&self, items: Vec<RenderItem>, start_index: usize) -> BridgeResult<()>;
        async fn prepare(&self) -> BridgeResult<()>;
        async fn play(&self) -> BridgeResult<()>;
        async fn pause(&self) -> BridgeResult<()>;
        async fn stop(&self) -> BridgeResult<()>;
        async fn seek(&self, position_ms: i64) -> BridgeResult<()>;
        async fn seek_to_item(&self, index: usize, position_ms: i64) -> BridgeResult<()>;
        async fn set_volume(&self, volume: f32) -> BridgeResult<()>;
        async fn set_shuffle_enabled(&self, enabled: bool) -> BridgeResult<()>;
        async fn set_repeat_mode(&self, mode: RepeatMode) -> BridgeResult<()>;
        fn snapshot(&self) -> DeviceSnapshot;
        fn attach_listener(&self, events: DeviceEventSender);
        fn detach_listener(&self);
        async fn release(&self) -> BridgeResult<()>;
    }
}

#[tokio::test]
async fn failed_device_release_still_abandons_focus_and_detaches() {
    let mut device = MockDevice::new();
    device.expect_snapshot().returning(DeviceSnapshot::default);
    device.expect_attach_listener().times(1).return_const(());
    device.expect_detach_listener().times(1).return_const(());
    device
        .expect_release()
        .times(1)
        .returning(|| Err(BridgeError::OperationFailed("driver hung".to_string())));

    let catalog = Arc::new(InMemoryCatalog::new(catalog_items()));
    let focus = Arc::new(FakeFocusArbitrator::new());
    let clock = Arc::new(ManualClock::at_millis(0));
    let queue = QueueEngine::spawn(
        catalog,
        clock.clone(),
        &settings(),
        BrowseLabels::default(),
        None,
    );
    let playback = PlaybackEngine::spawn(
        Arc::new(device),
        focus.clone(),
        None,
        queue,
        clock,
        &settings(),
        None,
    );

    let err = playback.release().await.unwrap_err();
    assert!(matches!(err, PlaybackError::Device(_)));
    assert_eq!(focus.abandon_count(), 1);
}
