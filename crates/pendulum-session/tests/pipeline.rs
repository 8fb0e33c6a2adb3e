//! Hub, filter and session controller wired together.

use approx::assert_abs_diff_eq;
use glam::Vec3;
use pendulum_config::{AppConfig, FilterConfig, MeasurementConfig};
use pendulum_control::ManualClock;
use pendulum_imu::recording::{format_event, replay};
use pendulum_imu::synthetic::{self, PendulumModel};
use pendulum_imu::types::{SensorEvent, SensorKind};
use pendulum_imu::{SampleSource, SensorHub};
use pendulum_link::MemoryLink;
use pendulum_session::{MemoryStore, SessionController, SessionPhase};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn still_pendulum_reads_zero_after_calibration() {
    let hub = Arc::new(SensorHub::spawn(FilterConfig::default()));
    let still = PendulumModel {
        amplitude: 0.0,
        ..PendulumModel::default()
    };
    tokio::spawn(synthetic::run(still, hub.sink(), 100));

    let store = Arc::new(MemoryStore::new());
    let link = Arc::new(MemoryLink::new());
    let mut controller = SessionController::new(
        hub.clone(),
        store.clone(),
        link.clone(),
        Arc::new(ManualClock::starting_at(0)),
        &AppConfig::default(),
    );

    let config = MeasurementConfig::defined(0.0, Duration::from_millis(1000));
    let session_id = controller.start(config, 3).await.unwrap();

    let mut status = controller.subscribe_status();
    status
        .wait_for(|s| s.phase == SessionPhase::Stopped)
        .await
        .unwrap();
    controller.stop().await.unwrap();

    let zero = controller.status().zero_offset.unwrap();
    assert_abs_diff_eq!(zero, 45.0, epsilon = 1.0);

    let saved = store.measurements_for_session(session_id);
    assert_eq!(saved.len(), 1);
    let columns = &saved[0].columns;
    assert!(columns.len() > 10);
    for (expected, index) in columns.discrete_indices.iter().enumerate() {
        assert_eq!(*index, expected as i64);
    }
    for angle in &columns.angles {
        assert_abs_diff_eq!(*angle, 0.0, epsilon = 1.0);
    }
    assert!(!link.sent().is_empty());
}

#[tokio::test]
async fn replayed_recording_reaches_the_hub() {
    let hub = SensorHub::spawn(FilterConfig::default());
    hub.enable();
    let mut rx = hub.subscribe();

    let g = 9.806_65;
    let events = [
        SensorEvent::new(SensorKind::Magnetometer, 10_000_000, Vec3::new(0.0, 30.0, 0.0)),
        SensorEvent::new(SensorKind::Accelerometer, 10_000_000, Vec3::new(0.0, 0.0, g)),
        SensorEvent::new(SensorKind::Gyroscope, 20_000_000, Vec3::ZERO),
        SensorEvent::new(SensorKind::Gyroscope, 30_000_000, Vec3::ZERO),
    ];
    let mut text: String = events.iter().map(format_event).collect();
    text.push_str("not,a,valid,line\n");

    let path = std::env::temp_dir().join(format!("pendulum-replay-{}.csv", std::process::id()));
    std::fs::write(&path, text).unwrap();

    let forwarded = replay(&path, hub.sink(), false).await.unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(forwarded, 4);

    let latest = *rx
        .wait_for(|s| s.map_or(false, |s| s.timestamp_ms == 30))
        .await
        .unwrap();
    let sample = latest.unwrap();
    // Lying flat: pitch is the mounting bias alone.
    assert_abs_diff_eq!(sample.pitch_degrees, 90.0, epsilon = 0.5);
    assert_eq!(sample.sampling_interval_ms, 10);
}
