use location_tracker::client::ClientError;
use location_tracker::sampler::{SampleSink, TrackerState, WatchConfig, sample_once, watch};
use location_tracker::source::{
    FixedPosition, Position, PositionError, PositionSource, ReplayTrack,
};
use parking_lot::Mutex;
use shared::models::{LocationSample, TrackReceipt, TrackingType};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Default)]
struct RecordingSink {
    samples: Mutex<Vec<LocationSample>>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.samples.lock().len()
    }
}

impl SampleSink for RecordingSink {
    async fn submit(&self, sample: LocationSample) -> Result<TrackReceipt, ClientError> {
        self.samples.lock().push(sample);
        Ok(TrackReceipt {
            id: Uuid::now_v7(),
            within_geofence: true,
            geofence_id: None,
        })
    }
}

struct NeverFixes;

impl PositionSource for NeverFixes {
    async fn current_position(&mut self) -> Result<Position, PositionError> {
        std::future::pending().await
    }
}

struct Denied;

impl PositionSource for Denied {
    async fn current_position(&mut self) -> Result<Position, PositionError> {
        Err(PositionError::PermissionDenied)
    }
}

const CONFIG: WatchConfig = WatchConfig {
    interval: Duration::from_secs(10),
    timeout: Duration::from_secs(5),
};

#[tokio::test(start_paused = true)]
async fn submits_on_every_tick_until_stopped() {
    let sink = Arc::new(RecordingSink::default());
    let state = TrackerState::default();
    let shutdown = CancellationToken::new();
    let user_id = Uuid::now_v7();

    let handle = tokio::spawn(watch(
        FixedPosition::new(12.9716, 77.5946, 8.0).unwrap(),
        Arc::clone(&sink),
        user_id,
        CONFIG,
        state.clone(),
        shutdown.clone(),
    ));

    // Ticks at 0s, 10s and 20s.
    sleep(Duration::from_secs(25)).await;
    let submitted = sink.count();
    assert!(submitted >= 3, "expected at least 3 submissions, got {submitted}");

    let samples = sink.samples.lock().clone();
    assert!(samples.iter().all(|s| s.user_id == user_id));
    assert!(samples
        .iter()
        .all(|s| s.tracking_type == TrackingType::Automatic));
    assert!(state.last_sample.read().is_some());
    assert!(state.last_submitted.read().is_some());

    shutdown.cancel();
    handle.await.unwrap();

    sleep(Duration::from_secs(60)).await;
    assert_eq!(sink.count(), submitted);
}

#[tokio::test(start_paused = true)]
async fn position_errors_are_recorded_and_nothing_is_submitted() {
    let sink = Arc::new(RecordingSink::default());
    let state = TrackerState::default();
    let shutdown = CancellationToken::new();

    let handle = tokio::spawn(watch(
        Denied,
        Arc::clone(&sink),
        Uuid::now_v7(),
        CONFIG,
        state.clone(),
        shutdown.clone(),
    ));

    sleep(Duration::from_secs(15)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(sink.count(), 0);
    assert!(state.last_attempt.read().is_some());
    assert_eq!(
        state.last_error.read().as_deref(),
        Some("location permission denied")
    );
}

#[tokio::test(start_paused = true)]
async fn one_shot_sample_times_out() {
    let result = sample_once(
        &mut NeverFixes,
        Uuid::now_v7(),
        TrackingType::Manual,
        Duration::from_secs(5),
    )
    .await;
    assert!(matches!(result, Err(PositionError::Timeout)));
}

#[tokio::test]
async fn one_shot_sample_is_manual() {
    let user_id = Uuid::now_v7();
    let mut source = FixedPosition::new(12.9716, 77.5946, 20.0).unwrap();
    let sample = sample_once(&mut source, user_id, TrackingType::Manual, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(sample.user_id, user_id);
    assert_eq!(sample.tracking_type, TrackingType::Manual);
    assert_eq!(sample.accuracy, 20.0);
}

#[tokio::test(start_paused = true)]
async fn finite_replay_stops_tracking_when_exhausted() {
    let track = ReplayTrack::parse(
        "{\"latitude\": 12.9716, \"longitude\": 77.5946, \"accuracy\": 8.0}\n\
         {\"latitude\": 12.9720, \"longitude\": 77.5950, \"accuracy\": 12.5}\n",
        false,
    )
    .unwrap();
    let sink = Arc::new(RecordingSink::default());
    let state = TrackerState::default();
    let shutdown = CancellationToken::new();

    let handle = tokio::spawn(watch(
        track,
        Arc::clone(&sink),
        Uuid::now_v7(),
        CONFIG,
        state.clone(),
        shutdown.clone(),
    ));

    timeout(Duration::from_secs(60), handle)
        .await
        .expect("watch should stop on its own")
        .unwrap();
    assert!(!shutdown.is_cancelled());

    // Let the last fire-and-forget submission land.
    sleep(Duration::from_millis(1)).await;
    let samples = sink.samples.lock().clone();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[1].accuracy, 12.5);
    assert!(state.last_error.read().is_none());
}
