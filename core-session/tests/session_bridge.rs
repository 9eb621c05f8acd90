//! Session bridge tests driving the real queue and playback actors through the
//! recording protocol fake.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::fakes::{
    FakeFocusArbitrator, FakeRenderDevice, InMemoryCatalog, ManualClock,
    RecordingNotificationRenderer, RecordingSessionProtocol,
};
use bridge_traits::media::{RepeatMode, Track};
use bridge_traits::notification::NotificationRenderer;
use bridge_traits::session::{
    Capabilities, CustomAction, CustomActionKind, MediaBrowser, MediaKey, MediaMetadata,
    QueueEntry, SessionCommand, SessionCommandSender, SessionProtocol, SessionToken,
    TransportState, TransportStatus,
};
use core_async::sync::{broadcast, watch};
use core_async::time::{sleep, timeout, Duration};
use core_playback::{PlaybackEngine, PlaybackHandle};
use core_queue::{QueueEngine, SortCriterion, ROOT_ID};
use core_runtime::config::{BrowseLabels, EngineSettings};
use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
use core_session::snapshot::{ICON_HEART_FILLED, LABEL_REMOVE_FAVORITE};
use core_session::{MediaStateListener, SessionBridge, SessionError, SessionHandle};
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
        shuffle_seed: Some(7),
        favorite_debounce_ms: 100,
        ..EngineSettings::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Changed(String),
    Playing(String, Option<i64>),
    Paused(Option<String>),
    Seek(String, i64),
    Favorite(String, bool),
    Error(String),
}

struct Recorder {
    seen: watch::Sender<Vec<Seen>>,
}

impl Recorder {
    fn new() -> (Arc<Self>, watch::Receiver<Vec<Seen>>) {
        let (seen, rx) = watch::channel(Vec::new());
        (Arc::new(Self { seen }), rx)
    }

    fn push(&self, event: Seen) {
        self.seen.send_modify(|seen| seen.push(event));
    }
}

impl MediaStateListener for Recorder {
    fn on_change_track(&self, track: &Track) {
        self.push(Seen::Changed(track.id.clone()));
    }

    fn on_play_track(&self, track_id: &str, position_ms: Option<i64>, _anchor_ms: i64, speed: f32) {
        assert_eq!(speed, 1.0);
        self.push(Seen::Playing(track_id.to_string(), position_ms));
    }

    fn on_pause_track(&self, track_id: Option<&str>) {
        self.push(Seen::Paused(track_id.map(str::to_string)));
    }

    fn on_seek_track(&self, track_id: &str, position_ms: i64) {
        self.push(Seen::Seek(track_id.to_string(), position_ms));
    }

    fn on_favorite_track(&self, track_id: &str, is_favorite: bool) {
        self.push(Seen::Favorite(track_id.to_string(), is_favorite));
    }

    fn on_playback_error(&self, message: &str) {
        self.push(Seen::Error(message.to_string()));
    }
}

struct Rig {
    catalog: Arc<InMemoryCatalog>,
    device: Arc<FakeRenderDevice>,
    focus: Arc<FakeFocusArbitrator>,
    protocol: Arc<RecordingSessionProtocol>,
    notifications: Arc<RecordingNotificationRenderer>,
    playback: PlaybackHandle,
    session: SessionHandle,
    seen: watch::Receiver<Vec<Seen>>,
    events: broadcast::Receiver<CoreEvent>,
}

async fn rig_with(focus: FakeFocusArbitrator) -> Rig {
    let catalog = Arc::new(InMemoryCatalog::new(catalog_items()));
    let device = Arc::new(FakeRenderDevice::new());
    let focus = Arc::new(focus);
    let protocol = Arc::new(RecordingSessionProtocol::new());
    let notifications = Arc::new(RecordingNotificationRenderer::new());
    let clock = Arc::new(ManualClock::at_millis(42_000));
    let bus = EventBus::new(256);
    let events = bus.subscribe();

    let queue = QueueEngine::spawn(
        catalog.clone(),
        clock.clone(),
        &settings(),
        BrowseLabels::default(),
        Some(bus.clone()),
    );
    queue.set_sort_criterion(SortCriterion::None).await.unwrap();

    let playback = PlaybackEngine::spawn(
        device.clone(),
        focus.clone(),
        None,
        queue,
        clock.clone(),
        &settings(),
        Some(bus.clone()),
    );

    let session = SessionBridge::start(
        protocol.clone(),
        Some(notifications.clone() as Arc<dyn NotificationRenderer>),
        playback.clone(),
        clock,
        "head-unit",
        Some(bus),
    )
    .await
    .unwrap();

    let (recorder, seen) = Recorder::new();
    session.register_listener(recorder);

    Rig {
        catalog,
        device,
        focus,
        protocol,
        notifications,
        playback,
        session,
        seen,
        events,
    }
}

async fn rig() -> Rig {
    rig_with(FakeFocusArbitrator::new()).await
}

/// Wait until the protocol fake satisfies `check`.
async fn published(
    protocol: &RecordingSessionProtocol,
    check: impl Fn(&RecordingSessionProtocol) -> bool,
) {
    let mut revisions = protocol.revisions();
    timeout(Duration::from_secs(5), async {
        while !check(protocol) {
            revisions.changed().await.expect("protocol fake gone");
        }
    })
    .await
    .expect("timed out waiting for the protocol");
}

fn transport(protocol: &RecordingSessionProtocol) -> Option<TransportState> {
    protocol.last_transport()
}

fn is_playing(protocol: &RecordingSessionProtocol) -> bool {
    transport(protocol).is_some_and(|t| t.status == TransportStatus::Playing)
}

fn reached(protocol: &RecordingSessionProtocol, position_ms: i64) -> bool {
    protocol
        .transport_history()
        .iter()
        .any(|t| t.position_ms == Some(position_ms))
}

fn metadata_id(protocol: &RecordingSessionProtocol) -> Option<String> {
    protocol.last_metadata().map(|m| m.media_id)
}

async fn saw(rx: &mut watch::Receiver<Vec<Seen>>, expected: Seen) {
    timeout(Duration::from_secs(5), rx.wait_for(|seen| seen.contains(&expected)))
        .await
        .expect("timed out waiting for listener callback")
        .expect("recorder gone");
}

async fn play_album(rig: &Rig, index: usize) {
    rig.session
        .submit(SessionCommand::PlayFromParent {
            parent_id: "P".to_string(),
            index,
        })
        .unwrap();
    published(&rig.protocol, |p| is_playing(p)).await;
}

#[tokio::test]
async fn start_creates_active_session_with_browser() {
    let rig = rig().await;

    assert_eq!(rig.protocol.tag().as_deref(), Some("head-unit"));
    assert!(rig.protocol.is_active());
    assert!(rig.session.state().active);
    assert_eq!(rig.session.state().token, Some(rig.session.token()));

    published(&rig.protocol, |p| p.last_custom_actions().is_some()).await;
    let initial = transport(&rig.protocol).unwrap();
    assert_eq!(initial.status, TransportStatus::Paused);
    assert_eq!(initial.updated_at_ms, 42_000);

    let browser = rig.protocol.browser().unwrap();
    assert_eq!(browser.root_id(), ROOT_ID);
    let children: Vec<String> = browser
        .load_children("P")
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(children, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn playing_publishes_full_snapshot() {
    let mut rig = rig().await;
    play_album(&rig, 1).await;
    published(&rig.protocol, |p| metadata_id(p).as_deref() == Some("B")).await;

    let state = transport(&rig.protocol).unwrap();
    assert_eq!(state.position_ms, Some(0));
    assert_eq!(state.speed, 1.0);
    assert!(state.capabilities.contains(Capabilities::SEEK));
    assert!(state
        .capabilities
        .contains(Capabilities::SKIP_NEXT | Capabilities::SKIP_PREVIOUS));

    let metadata = rig.protocol.last_metadata().unwrap();
    assert_eq!(metadata.title, "Song B");
    assert_eq!(metadata.display_subtitle.as_deref(), Some("Band"));
    assert_eq!(metadata.artwork_uri.as_deref(), Some("https://img/B.png"));
    assert_eq!(metadata.duration_ms, 60_000);

    published(&rig.protocol, |p| {
        p.last_queue().is_some_and(|(_, items)| items.len() == 3)
    })
    .await;
    let (title, items) = rig.protocol.last_queue().unwrap();
    assert_eq!(title.as_deref(), Some("Parent Album"));
    let ids: Vec<&str> = items.iter().map(|i| i.media_id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);

    saw(&mut rig.seen, Seen::Changed("B".to_string())).await;
    saw(&mut rig.seen, Seen::Playing("B".to_string(), Some(0))).await;
}

#[tokio::test]
async fn first_item_has_no_previous_capability() {
    let rig = rig().await;
    play_album(&rig, 0).await;

    let state = transport(&rig.protocol).unwrap();
    assert!(state.capabilities.contains(Capabilities::SKIP_NEXT));
    assert!(!state.capabilities.contains(Capabilities::SKIP_PREVIOUS));
}

#[tokio::test]
async fn controller_seek_reaches_listeners() {
    let mut rig = rig().await;
    play_album(&rig, 1).await;

    rig.session.submit(SessionCommand::SeekTo(90_000)).unwrap();
    // Landed at the end of the 60s track.
    saw(&mut rig.seen, Seen::Seek("B".to_string(), 60_000)).await;

    rig.session
        .submit(SessionCommand::PlayFromId("radio".to_string()))
        .unwrap();
    published(&rig.protocol, |p| metadata_id(p).as_deref() == Some("radio")).await;
    rig.session.submit(SessionCommand::SeekTo(5_000)).unwrap();
    rig.session.submit(SessionCommand::Pause).unwrap();
    published(&rig.protocol, |p| !is_playing(p)).await;

    let seeks = rig
        .seen
        .borrow()
        .iter()
        .filter(|seen| matches!(seen, Seen::Seek(..)))
        .count();
    assert_eq!(seeks, 1);
}

#[tokio::test]
async fn play_pause_key_toggles_on_current_state() {
    let mut rig = rig().await;
    play_album(&rig, 0).await;

    rig.session
        .submit(SessionCommand::MediaButton(MediaKey::PlayPause))
        .unwrap();
    published(&rig.protocol, |p| !is_playing(p)).await;
    assert!(!rig.playback.state().is_playing);
    saw(&mut rig.seen, Seen::Paused(Some("A".to_string()))).await;

    rig.session
        .submit(SessionCommand::MediaButton(MediaKey::PlayPause))
        .unwrap();
    published(&rig.protocol, |p| is_playing(p)).await;

    let mut received = Vec::new();
    while let Ok(event) = rig.events.try_recv() {
        if let CoreEvent::Session(SessionEvent::CommandReceived { command }) = event {
            received.push(command);
        }
    }
    assert_eq!(received, vec!["play_from_parent", "pause", "play"]);
}

#[tokio::test]
async fn stop_deactivates_and_play_reactivates() {
    let rig = rig().await;
    play_album(&rig, 0).await;

    rig.session.submit(SessionCommand::Stop).unwrap();
    published(&rig.protocol, |p| !p.is_active()).await;
    assert!(!rig.focus.is_held());
    assert!(!rig.session.state().active);

    rig.session
        .submit(SessionCommand::MediaButton(MediaKey::Play))
        .unwrap();
    published(&rig.protocol, |p| p.is_active() && is_playing(p)).await;
    assert!(rig.focus.is_held());
}

#[tokio::test]
async fn transport_keys_map_to_playback() {
    let rig = rig().await;
    play_album(&rig, 0).await;

    rig.session
        .submit(SessionCommand::MediaButton(MediaKey::Next))
        .unwrap();
    published(&rig.protocol, |p| metadata_id(p).as_deref() == Some("B")).await;

    rig.session.submit(SessionCommand::SeekTo(30_000)).unwrap();
    published(&rig.protocol, |p| reached(p, 30_000)).await;

    rig.session
        .submit(SessionCommand::MediaButton(MediaKey::Rewind))
        .unwrap();
    published(&rig.protocol, |p| reached(p, 15_000)).await;

    rig.session
        .submit(SessionCommand::MediaButton(MediaKey::Previous))
        .unwrap();
    published(&rig.protocol, |p| metadata_id(p).as_deref() == Some("A")).await;
}

#[tokio::test]
async fn repeat_action_cycles_modes() {
    let rig = rig().await;
    play_album(&rig, 0).await;
    let mut state = rig.playback.subscribe();

    for expected in [RepeatMode::One, RepeatMode::All, RepeatMode::None] {
        rig.session
            .submit(SessionCommand::CustomAction(CustomActionKind::ToggleRepeat))
            .unwrap();
        timeout(
            Duration::from_secs(5),
            state.wait_for(|s| s.repeat_mode == expected),
        )
        .await
        .unwrap()
        .unwrap();
    }
}

#[tokio::test]
async fn shuffle_action_republishes_queue_in_play_order() {
    let rig = rig().await;
    play_album(&rig, 1).await;

    rig.session
        .submit(SessionCommand::CustomAction(CustomActionKind::ToggleShuffle))
        .unwrap();
    published(&rig.protocol, |p| {
        p.last_custom_actions()
            .is_some_and(|actions| actions[1].icon == "shuffle_on")
    })
    .await;

    let order: Vec<String> = rig.playback.queue().state().ids().map(str::to_string).collect();
    published(&rig.protocol, |p| {
        p.last_queue().is_some_and(|(_, items)| {
            items.iter().map(|i| i.media_id.clone()).collect::<Vec<_>>() == order
        })
    })
    .await;
    assert_eq!(order.len(), 3);
    assert_eq!(metadata_id(&rig.protocol).as_deref(), Some("B"));
}

#[tokio::test]
async fn favorite_action_flags_current_track() {
    let mut rig = rig().await;
    play_album(&rig, 0).await;

    rig.session
        .submit(SessionCommand::CustomAction(CustomActionKind::ToggleFavorite))
        .unwrap();
    saw(&mut rig.seen, Seen::Favorite("A".to_string(), true)).await;

    published(&rig.protocol, |p| {
        p.last_custom_actions()
            .is_some_and(|actions| actions[0].label == LABEL_REMOVE_FAVORITE)
    })
    .await;
    assert_eq!(
        rig.protocol.last_custom_actions().unwrap()[0].icon,
        ICON_HEART_FILLED
    );

    timeout(Duration::from_secs(5), async {
        while rig.catalog.favorite_writes().is_empty() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(rig.catalog.favorite_writes(), vec![("A".to_string(), true)]);
    assert!(rig.session.state().is_favorite);
}

#[tokio::test]
async fn denied_focus_is_reported_to_listeners() {
    let mut rig = rig_with(FakeFocusArbitrator::denying()).await;

    rig.session.submit(SessionCommand::PlayFromId("A".to_string())).unwrap();
    saw(&mut rig.seen, Seen::Error("Audio focus denied".to_string())).await;

    assert!(!rig.playback.state().is_playing);
    assert!(!is_playing(&rig.protocol));
}

#[tokio::test]
async fn unknown_id_is_not_reported() {
    let rig = rig().await;
    rig.session
        .submit(SessionCommand::PlayFromId("missing".to_string()))
        .unwrap();
    rig.session.submit(SessionCommand::PlayFromId("A".to_string())).unwrap();
    published(&rig.protocol, |p| is_playing(p)).await;

    let errors = rig
        .seen
        .borrow()
        .iter()
        .filter(|seen| matches!(seen, Seen::Error(_)))
        .count();
    assert_eq!(errors, 0);
}

#[tokio::test]
async fn device_error_reaches_protocol_and_listeners() {
    let mut rig = rig().await;
    play_album(&rig, 0).await;

    rig.device.fail("decoder crashed");
    published(&rig.protocol, |p| {
        transport(p).is_some_and(|t| t.status == TransportStatus::Error)
    })
    .await;
    assert_eq!(
        transport(&rig.protocol).unwrap().error_message.as_deref(),
        Some("decoder crashed")
    );
    saw(&mut rig.seen, Seen::Error("decoder crashed".to_string())).await;

    rig.session.submit(SessionCommand::SkipToNext).unwrap();
    published(&rig.protocol, |p| is_playing(p)).await;
    assert_eq!(metadata_id(&rig.protocol).as_deref(), Some("B"));
}

#[tokio::test]
async fn live_content_publishes_unknown_position() {
    let rig = rig().await;
    rig.session
        .submit(SessionCommand::PlayFromId("radio".to_string()))
        .unwrap();
    published(&rig.protocol, |p| {
        is_playing(p) && metadata_id(p).as_deref() == Some("radio")
    })
    .await;

    let state = transport(&rig.protocol).unwrap();
    assert_eq!(state.position_ms, None);
    assert!(!state.capabilities.contains(Capabilities::SEEK));
    assert!(!state.capabilities.contains(Capabilities::FAST_FORWARD));
    assert!(state.capabilities.contains(Capabilities::PLAY_PAUSE));
}

#[tokio::test]
async fn notification_follows_session_state() {
    let rig = rig().await;
    play_album(&rig, 2).await;
    published(&rig.protocol, |p| metadata_id(p).as_deref() == Some("C")).await;

    let mut state = rig.session.subscribe();
    timeout(
        Duration::from_secs(5),
        state.wait_for(|s| s.is_playing && s.metadata.is_some()),
    )
    .await
    .unwrap()
    .unwrap();

    let content = rig.notifications.last().unwrap();
    assert_eq!(content.session, Some(rig.session.token()));
    assert!(content.is_playing);
    assert_eq!(content.metadata.unwrap().media_id, "C");
}

#[tokio::test]
async fn listeners_can_be_removed() {
    let rig = rig().await;
    let (extra, extra_seen) = Recorder::new();
    let id = rig.session.register_listener(extra);
    assert!(rig.session.unregister_listener(id));
    assert!(!rig.session.unregister_listener(id));

    play_album(&rig, 0).await;
    assert!(extra_seen.borrow().is_empty());
    assert_eq!(rig.session.listeners().len(), 1);
}

#[tokio::test]
async fn release_tears_down_in_order() {
    let mut rig = rig().await;
    play_album(&rig, 0).await;

    rig.session.release().await.unwrap();

    saw(&mut rig.seen, Seen::Paused(None)).await;
    assert!(!rig.protocol.is_active());
    assert!(rig.protocol.is_released());
    assert!(!rig.playback.is_running());
    assert!(rig.device.is_released());
    assert!(!rig.focus.is_held());
    assert_eq!(rig.notifications.clear_count(), 1);
    assert!(!rig.session.is_running());
    assert!(!rig.session.state().active);

    rig.session.release().await.unwrap();
    assert_eq!(rig.notifications.clear_count(), 1);
    assert!(matches!(
        rig.session.submit(SessionCommand::Play),
        Err(SessionError::Closed)
    ));

    let mut released = false;
    while let Ok(event) = rig.events.try_recv() {
        released |= event == CoreEvent::Session(SessionEvent::Released);
    }
    assert!(released);
}

#[tokio::test]
async fn shutdown_still_tears_down() {
    let rig = rig().await;
    rig.session.shutdown().await;

    assert!(rig.protocol.is_released());
    assert!(rig.device.is_released());
    assert_eq!(rig.notifications.clear_count(), 1);
}

mock! {
    pub Protocol {}

    #[async_trait]
    impl SessionProtocol for Protocol {
        async fn create_session(&self, tag: &str) -> BridgeResult<SessionToken>;
        async fn set_active(&self, active: bool) -> BridgeResult<()>;
        async fn set_transport_state(&self, state: TransportState) -> BridgeResult<()>;
        async fn set_metadata(&self, metadata: MediaMetadata) -> BridgeResult<()>;
        async fn set_queue(&self, title: Option<String>, items: Vec<QueueEntry>) -> BridgeResult<()>;
        async fn set_custom_actions(&self, actions: Vec<CustomAction>) -> BridgeResult<()>;
        fn attach(&self, commands: SessionCommandSender, browser: Arc<dyn MediaBrowser>);
        async fn release(&self) -> BridgeResult<()>;
    }
}

#[tokio::test]
async fn failed_protocol_release_still_releases_playback() {
    let mut protocol = MockProtocol::new();
    protocol
        .expect_create_session()
        .times(1)
        .returning(|_| Ok(SessionToken::new()));
    protocol.expect_attach().times(1).return_const(());
    protocol.expect_set_active().returning(|_| Ok(()));
    protocol.expect_set_transport_state().returning(|_| Ok(()));
    protocol.expect_set_metadata().returning(|_| Ok(()));
    protocol.expect_set_queue().returning(|_, _| Ok(()));
    protocol.expect_set_custom_actions().returning(|_| Ok(()));
    protocol
        .expect_release()
        .times(1)
        .returning(|| Err(BridgeError::OperationFailed("binder died".to_string())));

    let catalog = Arc::new(InMemoryCatalog::new(catalog_items()));
    let device = Arc::new(FakeRenderDevice::new());
    let clock = Arc::new(ManualClock::at_millis(0));
    let queue = QueueEngine::spawn(
        catalog,
        clock.clone(),
        &settings(),
        BrowseLabels::default(),
        None,
    );
    let playback = PlaybackEngine::spawn(
        device.clone(),
        Arc::new(FakeFocusArbitrator::new()),
        None,
        queue,
        clock.clone(),
        &settings(),
        None,
    );

    let session = SessionBridge::start(Arc::new(protocol), None, playback.clone(), clock, "mock", None)
        .await
        .unwrap();

    let result = session.release().await;
    assert!(matches!(result, Err(SessionError::Protocol(_))));
    assert!(device.is_released());
    assert!(!playback.is_running());
}
