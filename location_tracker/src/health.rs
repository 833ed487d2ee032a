use crate::sampler::TrackerState;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
struct HealthState {
    tracker: TrackerState,
    stale_after: TimeDelta,
}

pub async fn run_health_server(
    listen_addr: String,
    tracker: TrackerState,
    stale_after: TimeDelta,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    info!(name: "health.starting", listen_addr = %listen_addr, "starting health server");
    let app = Router::new()
        .route("/health", get(health_check))
        .with_state(HealthState {
            tracker,
            stale_after,
        });
    let listener = TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await?;
    Ok(())
}

async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    evaluate(&state.tracker, state.stale_after, Utc::now())
}

pub fn evaluate(
    tracker: &TrackerState,
    stale_after: TimeDelta,
    now: DateTime<Utc>,
) -> (StatusCode, String) {
    let last_attempt = *tracker.last_attempt.read();
    let last_submitted = *tracker.last_submitted.read();
    let last_error = tracker
        .last_error
        .read()
        .clone()
        .unwrap_or_else(|| "unknown".to_string());

    match (last_attempt, last_submitted) {
        (None, _) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "No attempted or successful location submissions".to_string(),
        ),
        (Some(last_attempt), None) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(
                "No location submitted yet. Last attempt: {last_attempt}. Last error: {last_error}"
            ),
        ),
        (Some(last_attempt), Some(last_submitted)) if now - last_submitted > stale_after => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(
                "No location submitted in the last {} seconds. Last submission: {last_submitted}. Last attempt: {last_attempt}. Last error: {last_error}",
                stale_after.num_seconds()
            ),
        ),
        (Some(_), Some(last_submitted)) => (
            StatusCode::OK,
            format!("Location last submitted: {last_submitted}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhealthy_until_first_submission() {
        let tracker = TrackerState::default();
        let now = Utc::now();
        let (status, _) = evaluate(&tracker, TimeDelta::seconds(60), now);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        *tracker.last_attempt.write() = Some(now);
        *tracker.last_error.write() = Some("timed out waiting for a position fix".to_string());
        let (status, body) = evaluate(&tracker, TimeDelta::seconds(60), now);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("timed out"));
    }

    #[test]
    fn stale_submissions_are_unhealthy() {
        let tracker = TrackerState::default();
        let now = Utc::now();
        *tracker.last_attempt.write() = Some(now);
        *tracker.last_submitted.write() = Some(now - TimeDelta::seconds(30));
        assert_eq!(
            evaluate(&tracker, TimeDelta::seconds(60), now).0,
            StatusCode::OK
        );

        *tracker.last_submitted.write() = Some(now - TimeDelta::seconds(90));
        assert_eq!(
            evaluate(&tracker, TimeDelta::seconds(60), now).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
