use crate::api::auth::{require_self_or_admin, require_staff};
use crate::api::db::queries;
use crate::api::error::ApiError;
use crate::api::extractors::params::{MaxDurationInterval, OneWeek};
use crate::metrics::Metrics;
use crate::state::{Db, Settings};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{TimeDelta, Utc};
use opentelemetry::KeyValue;
use serde::Deserialize;
use shared::geo::nearest_fence;
use shared::models::{
    Caller, LiveLocationsDto, LocationHistoryDto, LocationSample, TrackReceipt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_LIVE_WINDOW_MINUTES: i64 = 24 * 60;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveQuery {
    pub window_minutes: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub user_id: Uuid,
}

/// Records one sample and tags it with the closest active geofence containing it.
pub async fn track_location(
    State(Db { pool }): State<Db>,
    State(metrics): State<Metrics>,
    Extension(caller): Extension<Caller>,
    Json(sample): Json<LocationSample>,
) -> Result<(StatusCode, Json<TrackReceipt>), ApiError> {
    let point = sample.coordinate()?;
    require_self_or_admin(&caller, sample.user_id)?;

    let geofences = queries::list_geofences(&pool, Some(true)).await?;
    let matched = nearest_fence(&point, geofences.iter().map(|g| (g.id, g.circle())))
        .filter(|m| m.inside);

    let within_geofence = matched.is_some();
    let geofence_id = matched.map(|m| m.key);
    let id = queries::insert_sample(&pool, &sample, within_geofence, geofence_id).await?;

    let tracking_type = KeyValue::new("tracking_type", sample.tracking_type.as_str());
    metrics.location.recorded.add(1, &[tracking_type.clone()]);
    if !within_geofence {
        metrics.location.outside.add(1, &[tracking_type]);
    }
    debug!(name: "location.recorded", %id, user_id = %sample.user_id, within_geofence, "location sample recorded");

    Ok((
        StatusCode::CREATED,
        Json(TrackReceipt {
            id,
            within_geofence,
            geofence_id,
        }),
    ))
}

pub async fn get_live_locations(
    State(Db { pool }): State<Db>,
    State(settings): State<Settings>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<LiveQuery>,
) -> Result<Json<LiveLocationsDto>, ApiError> {
    require_staff(&caller)?;

    let window_minutes = params
        .window_minutes
        .unwrap_or(settings.live_window_minutes)
        .clamp(1, MAX_LIVE_WINDOW_MINUTES);
    let requested_at = Utc::now();
    let locations =
        queries::live_locations(&pool, requested_at - TimeDelta::minutes(window_minutes)).await?;

    Ok(Json(LiveLocationsDto {
        requested_at,
        window_minutes,
        locations,
    }))
}

pub async fn get_location_history(
    State(Db { pool }): State<Db>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<HistoryQuery>,
    interval: MaxDurationInterval<OneWeek>,
) -> Result<Json<LocationHistoryDto>, ApiError> {
    require_self_or_admin(&caller, params.user_id)?;

    let samples =
        queries::sample_history(&pool, params.user_id, interval.start, interval.end).await?;

    Ok(Json(LocationHistoryDto {
        user_id: params.user_id,
        start: interval.start,
        end: interval.end,
        samples,
    }))
}
