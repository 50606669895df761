use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;

use nearby_radar_lib::sim::{MemoryDirectory, SimulatedRadio};
use nearby_radar_lib::{
    ConversationRequest, GestureOutcome, LayoutConfig, NearbyController, RadarSettings,
    SelfIdentity, SessionState, Sighting, UserId, UserRecord,
};

type Controller = NearbyController<SimulatedRadio, MemoryDirectory>;

fn record(id: &str, token: &str) -> UserRecord {
    UserRecord {
        user_id: UserId::from(id),
        token: token.into(),
        display_name: id.to_uppercase(),
        photo_ref: None,
        is_verified: false,
    }
}

fn settings() -> RadarSettings {
    let mut settings = RadarSettings::default();
    settings.identity.token_suffix = "@app".into();
    settings.layout = LayoutConfig {
        seed: Some(42),
        ..LayoutConfig::default()
    };
    settings
}

fn controller(
    radio: &Arc<SimulatedRadio>,
    directory: &Arc<MemoryDirectory>,
    settings: RadarSettings,
) -> (Controller, mpsc::UnboundedReceiver<ConversationRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = NearbyController::new(
        Arc::clone(radio),
        Arc::clone(directory),
        SelfIdentity::new("quinn").with_device_id("dev-self"),
        settings,
        Arc::new(tx),
    );
    (controller, rx)
}

/// Let every runnable task finish before looking at state.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test(start_paused = true)]
async fn known_device_is_placed_and_stays_put_across_cycles() {
    let radio = Arc::new(SimulatedRadio::new());
    let directory = Arc::new(MemoryDirectory::new(vec![record("u1", "alice@app")]));
    let (controller, _requests) = controller(&radio, &directory, settings());

    controller.start().unwrap();
    settle().await;
    assert_eq!(controller.session().state(), SessionState::Scanning);
    assert_eq!(radio.advertised_token().as_deref(), Some("quinn@app"));

    radio.emit(Sighting::new("A", "alice", -40));
    radio.emit(Sighting::new("A", "alice", -42));
    radio.emit(Sighting::new("B", "bob", -70));
    settle().await;

    assert_eq!(controller.session().seen_this_cycle(), 2);
    assert_eq!(directory.exact_calls(), 2);

    let u1 = UserId::from("u1");
    let layout = controller.current_layout();
    assert_eq!(layout.len(), 1);
    assert!(layout.hidden.is_empty());
    let first = controller.position_of(&u1).unwrap();

    // 30 s cycle plus 1 s cooldown
    tokio::time::sleep(Duration::from_millis(31_500)).await;
    assert_eq!(radio.scan_starts(), 2);
    assert_eq!(controller.session().seen_this_cycle(), 0);

    radio.emit(Sighting::new("A", "alice", -41));
    settle().await;

    assert_eq!(controller.session().seen_this_cycle(), 1);
    assert_eq!(controller.visible_users().len(), 1);
    assert_eq!(controller.position_of(&u1), Some(first));

    controller.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn own_broadcast_never_reaches_the_directory() {
    let radio = Arc::new(SimulatedRadio::new());
    let directory = Arc::new(MemoryDirectory::new(vec![record("me", "quinn@app")]));
    let (controller, _requests) = controller(&radio, &directory, settings());

    controller.start().unwrap();
    settle().await;
    radio.emit(Sighting::new("dev-self", "whatever", -20));
    radio.emit(Sighting::new("other", "quinn", -20));
    settle().await;

    assert_eq!(directory.exact_calls(), 0);
    assert!(controller.current_layout().is_empty());
    controller.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn token_case_mismatch_resolves_through_fallback() {
    let radio = Arc::new(SimulatedRadio::new());
    let directory = Arc::new(MemoryDirectory::new(vec![record("u1", "alice@app")]));
    let (controller, _requests) = controller(&radio, &directory, settings());

    controller.start().unwrap();
    settle().await;
    radio.emit(Sighting::new("A", "Alice@app", -50));
    settle().await;

    assert_eq!(directory.list_calls(), 1);
    assert!(controller.position_of(&UserId::from("u1")).is_some());
    controller.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn results_landing_after_teardown_are_dropped() {
    let radio = Arc::new(SimulatedRadio::new());
    let directory = Arc::new(
        MemoryDirectory::new(vec![record("u1", "alice@app")])
            .with_latency(Duration::from_millis(500)),
    );
    let (controller, _requests) = controller(&radio, &directory, settings());

    controller.start().unwrap();
    settle().await;
    radio.emit(Sighting::new("A", "alice", -50));
    tokio::time::sleep(Duration::from_millis(100)).await;

    controller.teardown().await;
    assert!(!controller.is_running());
    assert_eq!(controller.session().state(), SessionState::Idle);
    assert_eq!(radio.active_scans(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(controller.visible_users().is_empty());
    assert!(controller.current_layout().is_empty());

    // A second teardown is harmless.
    controller.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn directory_queries_are_bounded() {
    let radio = Arc::new(SimulatedRadio::new());
    let records: Vec<UserRecord> = (0..6)
        .map(|i| record(&format!("u{i}"), &format!("user{i}@app")))
        .collect();
    let directory = Arc::new(
        MemoryDirectory::new(records).with_latency(Duration::from_millis(100)),
    );
    let mut settings = settings();
    settings.identity.max_in_flight_resolutions = 2;
    let (controller, _requests) = controller(&radio, &directory, settings);

    controller.start().unwrap();
    settle().await;
    for i in 0..6 {
        radio.emit(Sighting::new(format!("dev-{i}"), format!("user{i}"), -60));
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(directory.peak_in_flight(), 2);
    assert_eq!(controller.visible_users().len(), 6);
    let layout = controller.current_layout();
    assert_eq!(layout.len() + layout.hidden.len(), 6);
    controller.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn stale_users_drop_off_the_radar() {
    let radio = Arc::new(SimulatedRadio::new());
    let directory = Arc::new(MemoryDirectory::new(vec![record("u1", "alice@app")]));
    let (controller, _requests) = controller(&radio, &directory, settings());

    controller.start().unwrap();
    settle().await;
    let long_ago = Utc::now() - chrono::Duration::seconds(120);
    radio.emit(Sighting::new("A", "alice", -50).at(long_ago));
    settle().await;
    assert_eq!(controller.visible_users().len(), 1);

    // One sweep period is a quarter of the 31 s window.
    tokio::time::sleep(Duration::from_secs(9)).await;
    assert!(controller.visible_users().is_empty());
    assert!(controller.current_layout().is_empty());
    controller.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn scanning_waits_for_the_radio_to_power_on() {
    let radio = Arc::new(SimulatedRadio::new().powered_off());
    let directory = Arc::new(MemoryDirectory::new(vec![record("u1", "alice@app")]));
    let (controller, _requests) = controller(&radio, &directory, settings());

    controller.start().unwrap();
    settle().await;
    assert_eq!(controller.session().state(), SessionState::Idle);
    assert_eq!(radio.active_scans(), 0);

    radio.set_power(true);
    settle().await;
    assert_eq!(controller.session().state(), SessionState::Scanning);

    radio.emit(Sighting::new("A", "alice", -50));
    settle().await;
    assert!(controller.position_of(&UserId::from("u1")).is_some());
    controller.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn dragging_a_bubble_onto_the_anchor_opens_a_conversation() {
    let radio = Arc::new(SimulatedRadio::new());
    let directory = Arc::new(MemoryDirectory::new(vec![record("u1", "alice@app")]));
    let (controller, mut requests) = controller(&radio, &directory, settings());

    controller.start().unwrap();
    let mut layouts = controller.subscribe_layout();
    settle().await;
    radio.emit(Sighting::new("A", "alice", -50));
    layouts.changed().await.unwrap();

    let u1 = UserId::from("u1");
    assert!(controller.begin_gesture(&UserId::from("ghost"), Instant::now()).is_none());

    let t0 = Instant::now();
    let mut gesture = controller.begin_gesture(&u1, t0).unwrap();
    let anchor = gesture.anchor();
    gesture.move_to(anchor, t0 + Duration::from_millis(150));
    let outcome = gesture.release(anchor, t0 + Duration::from_millis(200)).unwrap();
    assert_eq!(outcome, GestureOutcome::Selected(u1.clone()));

    assert!(controller.complete_selection(&outcome, Some("hi".into())));
    assert!(!controller.complete_selection(&GestureOutcome::Tapped(u1.clone()), None));

    let request = requests.try_recv().unwrap();
    assert_eq!(request.user_id, u1);
    assert_eq!(request.first_message.as_deref(), Some("hi"));
    assert!(requests.try_recv().is_err());

    // The layout is untouched by the gesture.
    assert!(controller.position_of(&u1).is_some());
    controller.teardown().await;
}
