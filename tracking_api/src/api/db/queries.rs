use chrono::{DateTime, NaiveDate, Utc};
use shared::models::{
    AttendanceStatus, Batch, Caller, Coach, CoachAttendance, Geofence, GeofencePatch,
    LiveLocation, LocationSample, NewBatch, NewCoach, NewGeofence, RecordedSample, Role,
};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Sql(sqlx::Error),
    #[error("illegal args for query: {0}")]
    IllegalArgs(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    MissingReference(String),
}

impl From<sqlx::Error> for QueryError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return QueryError::Conflict(db_err.message().to_string());
            }
            if db_err.is_foreign_key_violation() {
                return QueryError::MissingReference(db_err.message().to_string());
            }
        }
        QueryError::Sql(e)
    }
}

//
// Geofences
//

pub async fn list_geofences(
    pool: &Pool<Postgres>,
    active: Option<bool>,
) -> Result<Vec<Geofence>, QueryError> {
    Ok(sqlx::query_as::<_, Geofence>(
        r"
        SELECT id, name, description, center_latitude, center_longitude, radius_meters,
               is_active, created_at
        FROM geofences
        WHERE ($1::boolean IS NULL OR is_active = $1)
        ORDER BY created_at DESC
        ",
    )
    .bind(active)
    .fetch_all(pool)
    .await?)
}

pub async fn get_geofence(pool: &Pool<Postgres>, id: Uuid) -> Result<Option<Geofence>, QueryError> {
    Ok(sqlx::query_as::<_, Geofence>(
        r"
        SELECT id, name, description, center_latitude, center_longitude, radius_meters,
               is_active, created_at
        FROM geofences
        WHERE id = $1
        ",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

pub async fn insert_geofence(
    pool: &Pool<Postgres>,
    geofence: &NewGeofence,
) -> Result<Geofence, QueryError> {
    Ok(sqlx::query_as::<_, Geofence>(
        r"
        INSERT INTO geofences (id, name, description, center_latitude, center_longitude, radius_meters)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, name, description, center_latitude, center_longitude, radius_meters,
                  is_active, created_at
        ",
    )
    .bind(Uuid::now_v7())
    .bind(&geofence.name)
    .bind(&geofence.description)
    .bind(geofence.center_latitude)
    .bind(geofence.center_longitude)
    .bind(geofence.radius_meters)
    .fetch_one(pool)
    .await?)
}

pub async fn update_geofence(
    pool: &Pool<Postgres>,
    id: Uuid,
    patch: &GeofencePatch,
) -> Result<Option<Geofence>, QueryError> {
    Ok(sqlx::query_as::<_, Geofence>(
        r"
        UPDATE geofences
        SET name          = COALESCE($2, name),
            description   = COALESCE($3, description),
            radius_meters = COALESCE($4, radius_meters),
            is_active     = COALESCE($5, is_active)
        WHERE id = $1
        RETURNING id, name, description, center_latitude, center_longitude, radius_meters,
                  is_active, created_at
        ",
    )
    .bind(id)
    .bind(&patch.name)
    .bind(&patch.description)
    .bind(patch.radius_meters)
    .bind(patch.is_active)
    .fetch_optional(pool)
    .await?)
}

pub async fn delete_geofence(pool: &Pool<Postgres>, id: Uuid) -> Result<bool, QueryError> {
    let result = sqlx::query("DELETE FROM geofences WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

//
// Location samples
//

pub async fn insert_sample(
    pool: &Pool<Postgres>,
    sample: &LocationSample,
    within_geofence: bool,
    geofence_id: Option<Uuid>,
) -> Result<Uuid, QueryError> {
    let id = Uuid::now_v7();
    sqlx::query(
        r"
        INSERT INTO location_samples
            (id, user_id, latitude, longitude, accuracy, recorded_at, tracking_type,
             within_geofence, geofence_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ",
    )
    .bind(id)
    .bind(sample.user_id)
    .bind(sample.latitude)
    .bind(sample.longitude)
    .bind(sample.accuracy)
    .bind(sample.timestamp)
    .bind(sample.tracking_type.as_str())
    .bind(within_geofence)
    .bind(geofence_id)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Latest sample per user among those the server received at or after `since`.
pub async fn live_locations(
    pool: &Pool<Postgres>,
    since: DateTime<Utc>,
) -> Result<Vec<LiveLocation>, QueryError> {
    Ok(sqlx::query_as::<_, LiveLocation>(
        r#"
        SELECT DISTINCT ON (s.user_id)
               s.user_id,
               s.latitude,
               s.longitude,
               s.accuracy,
               s.recorded_at AS "timestamp",
               s.tracking_type,
               s.within_geofence,
               g.name AS geofence_name
        FROM location_samples s
        LEFT JOIN geofences g ON g.id = s.geofence_id
        WHERE s.received_at >= $1
        ORDER BY s.user_id, s.recorded_at DESC, s.received_at DESC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?)
}

pub async fn sample_history(
    pool: &Pool<Postgres>,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<RecordedSample>, QueryError> {
    if end <= start {
        return Err(QueryError::IllegalArgs(format!(
            "end must be greater than start. end = {end:?}. start = {start:?}"
        )));
    }

    Ok(sqlx::query_as::<_, RecordedSample>(
        r#"
        SELECT id, latitude, longitude, accuracy, recorded_at AS "timestamp", tracking_type,
               within_geofence, geofence_id
        FROM location_samples
        WHERE user_id = $1
          AND recorded_at >= $2
          AND recorded_at < $3
        ORDER BY recorded_at
        "#,
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?)
}

//
// Coaches and batches
//

pub async fn list_coaches(pool: &Pool<Postgres>) -> Result<Vec<Coach>, QueryError> {
    Ok(sqlx::query_as::<_, Coach>(
        "SELECT id, name, phone, is_active FROM coaches ORDER BY name",
    )
    .fetch_all(pool)
    .await?)
}

pub async fn insert_coach(pool: &Pool<Postgres>, coach: &NewCoach) -> Result<Coach, QueryError> {
    Ok(sqlx::query_as::<_, Coach>(
        r"
        INSERT INTO coaches (id, name, phone)
        VALUES ($1, $2, $3)
        RETURNING id, name, phone, is_active
        ",
    )
    .bind(Uuid::now_v7())
    .bind(&coach.name)
    .bind(&coach.phone)
    .fetch_one(pool)
    .await?)
}

pub async fn get_batch(pool: &Pool<Postgres>, id: Uuid) -> Result<Option<Batch>, QueryError> {
    Ok(sqlx::query_as::<_, Batch>(
        r"
        SELECT id, name, sport, coach_id, geofence_id, start_time, end_time, is_active
        FROM batches
        WHERE id = $1
        ",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

pub async fn list_batches(
    pool: &Pool<Postgres>,
    coach_id: Option<Uuid>,
) -> Result<Vec<Batch>, QueryError> {
    Ok(sqlx::query_as::<_, Batch>(
        r"
        SELECT id, name, sport, coach_id, geofence_id, start_time, end_time, is_active
        FROM batches
        WHERE ($1::uuid IS NULL OR coach_id = $1)
        ORDER BY name
        ",
    )
    .bind(coach_id)
    .fetch_all(pool)
    .await?)
}

pub async fn insert_batch(pool: &Pool<Postgres>, batch: &NewBatch) -> Result<Batch, QueryError> {
    Ok(sqlx::query_as::<_, Batch>(
        r"
        INSERT INTO batches (id, name, sport, coach_id, geofence_id, start_time, end_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, name, sport, coach_id, geofence_id, start_time, end_time, is_active
        ",
    )
    .bind(Uuid::now_v7())
    .bind(&batch.name)
    .bind(&batch.sport)
    .bind(batch.coach_id)
    .bind(batch.geofence_id)
    .bind(batch.start_time)
    .bind(batch.end_time)
    .fetch_one(pool)
    .await?)
}

//
// Coach attendance
//

pub struct CheckIn {
    pub coach_id: Uuid,
    pub batch_id: Uuid,
    pub date: NaiveDate,
    pub at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub is_gps_verified: bool,
    pub geofence_verified: bool,
    pub geofence_id: Option<Uuid>,
    pub distance_meters: Option<f64>,
    pub status: AttendanceStatus,
}

pub struct CheckOut {
    pub coach_id: Uuid,
    pub batch_id: Uuid,
    pub date: NaiveDate,
    pub at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub geofence_verified: bool,
}

const ATTENDANCE_COLUMNS: &str = "id, coach_id, batch_id, date, check_in_time, check_out_time, \
     is_gps_verified, geofence_verified, geofence_id, distance_meters, \
     check_out_geofence_verified, status";

/// Fails with [`QueryError::Conflict`] when the coach already checked in to the batch that day.
pub async fn insert_check_in(
    pool: &Pool<Postgres>,
    check_in: &CheckIn,
) -> Result<CoachAttendance, QueryError> {
    let query = format!(
        r"
        INSERT INTO coach_attendance
            (id, coach_id, batch_id, date, check_in_time, check_in_latitude, check_in_longitude,
             check_in_accuracy, is_gps_verified, geofence_verified, geofence_id, distance_meters,
             status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING {ATTENDANCE_COLUMNS}
        "
    );

    sqlx::query_as::<_, CoachAttendance>(&query)
        .bind(Uuid::now_v7())
        .bind(check_in.coach_id)
        .bind(check_in.batch_id)
        .bind(check_in.date)
        .bind(check_in.at)
        .bind(check_in.latitude)
        .bind(check_in.longitude)
        .bind(check_in.accuracy)
        .bind(check_in.is_gps_verified)
        .bind(check_in.geofence_verified)
        .bind(check_in.geofence_id)
        .bind(check_in.distance_meters)
        .bind(check_in.status.as_str())
        .fetch_one(pool)
        .await
        .map_err(|e| match QueryError::from(e) {
            QueryError::Conflict(_) => QueryError::Conflict(
                "coach has already checked in to this batch today".to_string(),
            ),
            other => other,
        })
}

/// Closes the day's open attendance row. Returns `None` when there is nothing to close.
pub async fn close_attendance(
    pool: &Pool<Postgres>,
    check_out: &CheckOut,
) -> Result<Option<CoachAttendance>, QueryError> {
    let query = format!(
        r"
        UPDATE coach_attendance
        SET check_out_time              = $5,
            check_out_latitude          = $6,
            check_out_longitude         = $7,
            check_out_accuracy          = $8,
            check_out_geofence_verified = $9
        WHERE coach_id = $1
          AND batch_id = $2
          AND date = $3
          AND check_out_time IS NULL
          AND check_in_time <= $4
        RETURNING {ATTENDANCE_COLUMNS}
        "
    );

    Ok(sqlx::query_as::<_, CoachAttendance>(&query)
        .bind(check_out.coach_id)
        .bind(check_out.batch_id)
        .bind(check_out.date)
        .bind(check_out.at)
        .bind(check_out.at)
        .bind(check_out.latitude)
        .bind(check_out.longitude)
        .bind(check_out.accuracy)
        .bind(check_out.geofence_verified)
        .fetch_optional(pool)
        .await?)
}

pub async fn list_attendance(
    pool: &Pool<Postgres>,
    coach_id: Option<Uuid>,
    date: Option<NaiveDate>,
) -> Result<Vec<CoachAttendance>, QueryError> {
    let query = format!(
        r"
        SELECT {ATTENDANCE_COLUMNS}
        FROM coach_attendance
        WHERE ($1::uuid IS NULL OR coach_id = $1)
          AND ($2::date IS NULL OR date = $2)
        ORDER BY check_in_time DESC
        LIMIT 500
        "
    );

    Ok(sqlx::query_as::<_, CoachAttendance>(&query)
        .bind(coach_id)
        .bind(date)
        .fetch_all(pool)
        .await?)
}

//
// API tokens. Only the SHA-256 of a token is stored.
//

pub async fn insert_token(
    pool: &Pool<Postgres>,
    token: &str,
    user_id: Uuid,
    role: Role,
) -> Result<(), QueryError> {
    sqlx::query(
        r"
        INSERT INTO api_tokens (token_hash, user_id, role)
        VALUES (encode(sha256(convert_to($1, 'UTF8')), 'hex'), $2, $3)
        ",
    )
    .bind(token)
    .bind(user_id)
    .bind(role.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_token(pool: &Pool<Postgres>, token: &str) -> Result<Option<Caller>, QueryError> {
    Ok(sqlx::query_as::<_, Caller>(
        r"
        SELECT user_id, role
        FROM api_tokens
        WHERE token_hash = encode(sha256(convert_to($1, 'UTF8')), 'hex')
          AND revoked_at IS NULL
        ",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?)
}

pub async fn revoke_token(pool: &Pool<Postgres>, token: &str) -> Result<bool, QueryError> {
    let result = sqlx::query(
        r"
        UPDATE api_tokens
        SET revoked_at = now()
        WHERE token_hash = encode(sha256(convert_to($1, 'UTF8')), 'hex')
          AND revoked_at IS NULL
        ",
    )
    .bind(token)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
