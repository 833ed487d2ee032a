use crate::client::{ApiClient, ClientError};
use chrono::{DateTime, Utc};
use colored::Colorize;
use shared::models::{LiveLocation, LiveLocationsDto};
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::warn;

const OUTSIDE_LABEL: &str = "outside all geofences";

/// One line per user: a green dot inside a geofence, red outside.
pub fn format_location(location: &LiveLocation, now: DateTime<Utc>) -> String {
    let dot = if location.within_geofence {
        "●".green()
    } else {
        "●".red()
    };
    let place = match location.geofence_name.as_deref() {
        Some(name) if location.within_geofence => name,
        _ => OUTSIDE_LABEL,
    };
    let age = (now - location.timestamp)
        .to_std()
        .map(|d| Duration::from_secs(d.as_secs()))
        .unwrap_or_default();

    format!(
        "{dot} {}  {:.5}, {:.5}  ±{:.0} m  {place}  ({} ago, {})",
        location.user_id,
        location.latitude,
        location.longitude,
        location.accuracy,
        humantime::format_duration(age),
        location.tracking_type,
    )
}

pub fn render(feed: &LiveLocationsDto) -> String {
    if feed.locations.is_empty() {
        return format!(
            "no locations reported in the last {} minutes",
            feed.window_minutes
        );
    }
    feed.locations
        .iter()
        .map(|location| format_location(location, feed.requested_at))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fetches the feed immediately and then on every `poll_interval` until `shutdown` is cancelled.
/// A failed poll is logged and the next tick tries again.
pub async fn poll_live<F>(
    client: &ApiClient,
    window_minutes: Option<i64>,
    poll_interval: Duration,
    shutdown: CancellationToken,
    mut on_update: F,
) where
    F: FnMut(Result<&LiveLocationsDto, &ClientError>),
{
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match client.live(window_minutes).await {
            Ok(feed) => on_update(Ok(&feed)),
            Err(e) => {
                warn!(name: "live.poll_failed", error = %e, "could not fetch live locations");
                on_update(Err(&e));
            }
        }
    }
}
