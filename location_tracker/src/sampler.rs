use crate::client::ClientError;
use crate::source::{Position, PositionError, PositionSource};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use shared::models::{LocationSample, TrackReceipt, TrackingType};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Receives samples taken by the watch loop.
pub trait SampleSink: Send + Sync + 'static {
    fn submit(
        &self,
        sample: LocationSample,
    ) -> impl Future<Output = Result<TrackReceipt, ClientError>> + Send;
}

/// State shared with the health server.
#[derive(Clone, Default)]
pub struct TrackerState {
    pub last_sample: Arc<RwLock<Option<LocationSample>>>,
    pub last_attempt: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub last_submitted: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub last_error: Arc<RwLock<Option<String>>>,
}

#[derive(Debug, Clone, Copy)]
pub struct WatchConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

pub fn to_sample(position: &Position, user_id: Uuid, tracking_type: TrackingType) -> LocationSample {
    LocationSample {
        user_id,
        latitude: position.coordinate.latitude,
        longitude: position.coordinate.longitude,
        accuracy: position.accuracy,
        timestamp: position.timestamp,
        tracking_type,
    }
}

/// Reads one fresh fix, giving up after `limit`.
pub async fn read_position<S: PositionSource>(
    source: &mut S,
    limit: Duration,
) -> Result<Position, PositionError> {
    timeout(limit, source.current_position())
        .await
        .map_err(|_| PositionError::Timeout)?
}

pub async fn sample_once<S: PositionSource>(
    source: &mut S,
    user_id: Uuid,
    tracking_type: TrackingType,
    limit: Duration,
) -> Result<LocationSample, PositionError> {
    let position = read_position(source, limit).await?;
    Ok(to_sample(&position, user_id, tracking_type))
}

/// Samples on every tick and hands each sample to `sink` without waiting for the result.
/// Returns once `shutdown` is cancelled or the source is exhausted; nothing is submitted after
/// that.
pub async fn watch<S, K>(
    mut source: S,
    sink: Arc<K>,
    user_id: Uuid,
    config: WatchConfig,
    state: TrackerState,
    shutdown: CancellationToken,
) where
    S: PositionSource,
    K: SampleSink,
{
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(name: "tracking.started", %user_id, interval = ?config.interval, "continuous tracking started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        *state.last_attempt.write() = Some(Utc::now());
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            r = sample_once(&mut source, user_id, TrackingType::Automatic, config.timeout) => r,
        };
        let sample = match result {
            Ok(sample) => sample,
            Err(PositionError::Exhausted) => {
                info!(name: "tracking.source_exhausted", %user_id, "position source has no more fixes");
                break;
            }
            Err(e) => {
                warn!(name: "tracking.position_failed", error = %e, "could not read position");
                *state.last_error.write() = Some(e.to_string());
                continue;
            }
        };

        *state.last_sample.write() = Some(sample.clone());
        let sink = Arc::clone(&sink);
        let state = state.clone();
        tokio::spawn(async move {
            match sink.submit(sample).await {
                Ok(receipt) => {
                    debug!(name: "tracking.submitted", id = %receipt.id, within_geofence = receipt.within_geofence, "sample submitted");
                    *state.last_submitted.write() = Some(Utc::now());
                }
                Err(e) => {
                    warn!(name: "tracking.submit_failed", error = %e, "could not submit sample");
                    *state.last_error.write() = Some(e.to_string());
                }
            }
        });
    }

    info!(name: "tracking.stopped", %user_id, "continuous tracking stopped");
}
