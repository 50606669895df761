use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::info;
use tokio::sync::mpsc;

use nearby_radar_lib::sim::{MemoryDirectory, SimulatedRadio};
use nearby_radar_lib::{
    init_logging, GestureOutcome, NearbyController, Position, RadarSettings, SelfIdentity,
    SettingsStore, Sighting, UserId, UserRecord,
};

fn record(id: &str, token: &str, name: &str) -> UserRecord {
    UserRecord {
        user_id: UserId::from(id),
        token: token.into(),
        display_name: name.into(),
        photo_ref: None,
        is_verified: true,
    }
}

fn load_settings() -> Result<RadarSettings> {
    let settings = match std::env::args().nth(1) {
        Some(path) => SettingsStore::new(PathBuf::from(path))
            .context("loading settings")?
            .radar(),
        None => RadarSettings::default(),
    };
    Ok(settings.with_env_overrides())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let mut settings = load_settings()?;
    if settings.identity.token_suffix.is_empty() {
        settings.identity.token_suffix = "@app".into();
    }

    let radio = Arc::new(SimulatedRadio::new());
    let directory = Arc::new(MemoryDirectory::new(vec![
        record("u-ada", "ada@app", "Ada"),
        record("u-grace", "grace@app", "Grace"),
        record("u-linus", "linus@app", "Linus"),
    ]));
    let (conversations, mut requests) = mpsc::unbounded_channel();

    let controller = NearbyController::new(
        Arc::clone(&radio),
        directory,
        SelfIdentity::new("quinn").with_device_id("dev-self"),
        settings,
        Arc::new(conversations),
    );
    controller.start()?;
    let mut layouts = controller.subscribe_layout();

    for sighting in [
        Sighting::new("dev-1", "ada", -48),
        Sighting::new("dev-1", "ada", -50),
        Sighting::new("dev-2", "Grace@App", -63),
        Sighting::new("dev-3", "linus@app", -71),
        Sighting::new("dev-4", "stranger", -80),
        Sighting::new("dev-self", "quinn@app", -30),
    ] {
        radio.emit(sighting);
    }

    while controller.current_layout().len() < 3 {
        tokio::time::timeout(Duration::from_secs(2), layouts.changed())
            .await
            .context("timed out waiting for the radar")??;
    }

    let layout = controller.current_layout();
    println!("{}", serde_json::to_string_pretty(&layout)?);

    let target = UserId::from("u-grace");
    let start = Instant::now();
    let mut gesture = controller
        .begin_gesture(&target, start)
        .context("grace is not on the radar")?;
    let anchor = gesture.anchor();
    let origin = layout.position_of(&target).unwrap_or(anchor);
    for step in 1..=5 {
        let t = step as f64 / 5.0;
        let pointer = Position::new(
            origin.x + (anchor.x - origin.x) * t,
            origin.y + (anchor.y - origin.y) * t,
        );
        if let Some(feedback) = gesture.move_to(pointer, start + Duration::from_millis(40 * step)) {
            info!("drag step {step}: {:?}", feedback.phase);
        }
    }
    let outcome = gesture
        .release(anchor, start + Duration::from_millis(260))
        .unwrap_or(GestureOutcome::Cancelled(target));
    controller.complete_selection(&outcome, Some("hey, I'm at the next table".into()));

    if let Ok(request) = requests.try_recv() {
        println!("{}", serde_json::to_string_pretty(&request)?);
    }

    controller.teardown().await;
    Ok(())
}
