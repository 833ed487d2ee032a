use crate::api::auth::require_coach_or_admin;
use crate::api::db::queries::{self, CheckIn, CheckOut};
use crate::api::error::ApiError;
use crate::api::verification::{Verification, attendance_status, local_date, verify_presence};
use crate::metrics::Metrics;
use crate::state::{Db, Settings};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use opentelemetry::KeyValue;
use serde::Deserialize;
use shared::geo::{Coordinate, validate_accuracy};
use shared::models::{AttendanceRequest, Batch, Caller, CoachAttendance, Geofence, Role};
use sqlx::{Pool, Postgres};
use tracing::info;
use uuid::Uuid;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceQuery {
    pub coach_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
}

fn request_point(req: &AttendanceRequest) -> Result<Coordinate, ApiError> {
    validate_accuracy(req.accuracy)?;
    Ok(Coordinate::new(req.latitude, req.longitude)?)
}

async fn coach_batch(
    pool: &Pool<Postgres>,
    coach_id: Uuid,
    batch_id: Uuid,
) -> Result<Batch, ApiError> {
    let batch = queries::get_batch(pool, batch_id)
        .await?
        .ok_or(ApiError::NotFound("batch"))?;
    if batch.coach_id != coach_id {
        return Err(ApiError::Validation(
            "coach is not assigned to this batch".to_string(),
        ));
    }
    if !batch.is_active {
        return Err(ApiError::Validation("batch is inactive".to_string()));
    }
    Ok(batch)
}

/// The batch's own geofence when it has one, otherwise every active geofence.
async fn candidate_geofences(
    pool: &Pool<Postgres>,
    batch: &Batch,
) -> Result<Vec<Geofence>, ApiError> {
    match batch.geofence_id {
        Some(id) => Ok(queries::get_geofence(pool, id).await?.into_iter().collect()),
        None => Ok(queries::list_geofences(pool, Some(true)).await?),
    }
}

async fn verify(
    pool: &Pool<Postgres>,
    settings: &Settings,
    batch: &Batch,
    req: &AttendanceRequest,
) -> Result<Verification, ApiError> {
    let point = request_point(req)?;
    let candidates = candidate_geofences(pool, batch).await?;
    Ok(verify_presence(
        &point,
        req.accuracy,
        &candidates,
        settings.attendance.max_accuracy_meters,
    ))
}

pub async fn check_in(
    State(Db { pool }): State<Db>,
    State(settings): State<Settings>,
    State(metrics): State<Metrics>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<AttendanceRequest>,
) -> Result<(StatusCode, Json<CoachAttendance>), ApiError> {
    require_coach_or_admin(&caller, req.coach_id)?;
    request_point(&req)?;

    let batch = coach_batch(&pool, req.coach_id, req.batch_id).await?;
    let verification = verify(&pool, &settings, &batch, &req).await?;

    let now = Utc::now();
    let status = attendance_status(&verification, now, batch.start_time, &settings.attendance);
    let record = queries::insert_check_in(
        &pool,
        &CheckIn {
            coach_id: req.coach_id,
            batch_id: req.batch_id,
            date: local_date(now, settings.attendance.utc_offset_minutes),
            at: now,
            latitude: req.latitude,
            longitude: req.longitude,
            accuracy: req.accuracy,
            is_gps_verified: verification.is_gps_verified,
            geofence_verified: verification.geofence_verified,
            geofence_id: verification.geofence_id,
            distance_meters: verification.distance_meters,
            status,
        },
    )
    .await?;

    metrics
        .attendance
        .checkins
        .add(1, &[KeyValue::new("status", status.as_str())]);
    info!(
        name: "attendance.checked_in",
        coach_id = %record.coach_id,
        batch_id = %record.batch_id,
        status = status.as_str(),
        geofence_verified = record.geofence_verified,
        is_gps_verified = record.is_gps_verified,
        "coach checked in"
    );

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn check_out(
    State(Db { pool }): State<Db>,
    State(settings): State<Settings>,
    State(metrics): State<Metrics>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<AttendanceRequest>,
) -> Result<Json<CoachAttendance>, ApiError> {
    require_coach_or_admin(&caller, req.coach_id)?;
    request_point(&req)?;

    let batch = coach_batch(&pool, req.coach_id, req.batch_id).await?;
    let verification = verify(&pool, &settings, &batch, &req).await?;

    let now = Utc::now();
    let record = queries::close_attendance(
        &pool,
        &CheckOut {
            coach_id: req.coach_id,
            batch_id: req.batch_id,
            date: local_date(now, settings.attendance.utc_offset_minutes),
            at: now,
            latitude: req.latitude,
            longitude: req.longitude,
            accuracy: req.accuracy,
            geofence_verified: verification.geofence_verified,
        },
    )
    .await?
    .ok_or_else(|| ApiError::Conflict("no open check-in for this batch today".to_string()))?;

    metrics.attendance.checkouts.add(
        1,
        &[KeyValue::new(
            "geofence_verified",
            verification.geofence_verified,
        )],
    );
    info!(
        name: "attendance.checked_out",
        coach_id = %record.coach_id,
        batch_id = %record.batch_id,
        geofence_verified = verification.geofence_verified,
        "coach checked out"
    );

    Ok(Json(record))
}

/// Coaches see only their own rows; admins may filter by coach.
pub async fn list_attendance(
    State(Db { pool }): State<Db>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<AttendanceQuery>,
) -> Result<Json<Vec<CoachAttendance>>, ApiError> {
    let coach_id = match caller.role {
        Role::Admin => params.coach_id,
        Role::Coach => {
            if params.coach_id.is_some_and(|id| id != caller.user_id) {
                return Err(ApiError::Forbidden(
                    "coaches can only view their own attendance",
                ));
            }
            Some(caller.user_id)
        }
        Role::Student => return Err(ApiError::Forbidden("coach role required")),
    };

    Ok(Json(
        queries::list_attendance(&pool, coach_id, params.date).await?,
    ))
}
