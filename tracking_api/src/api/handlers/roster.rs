use crate::api::auth::{require_admin, require_staff};
use crate::api::db::queries;
use crate::api::error::ApiError;
use crate::state::Db;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use shared::models::{Batch, Caller, Coach, NewBatch, NewCoach};
use tracing::info;
use uuid::Uuid;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchQuery {
    pub coach_id: Option<Uuid>,
}

pub async fn list_coaches(
    State(Db { pool }): State<Db>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<Coach>>, ApiError> {
    require_staff(&caller)?;
    Ok(Json(queries::list_coaches(&pool).await?))
}

pub async fn create_coach(
    State(Db { pool }): State<Db>,
    Extension(caller): Extension<Caller>,
    Json(coach): Json<NewCoach>,
) -> Result<(StatusCode, Json<Coach>), ApiError> {
    require_admin(&caller)?;
    if coach.name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }

    let created = queries::insert_coach(&pool, &coach).await?;
    info!(name: "coach.created", id = %created.id, "coach created");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_batches(
    State(Db { pool }): State<Db>,
    Query(params): Query<BatchQuery>,
) -> Result<Json<Vec<Batch>>, ApiError> {
    Ok(Json(queries::list_batches(&pool, params.coach_id).await?))
}

pub async fn create_batch(
    State(Db { pool }): State<Db>,
    Extension(caller): Extension<Caller>,
    Json(batch): Json<NewBatch>,
) -> Result<(StatusCode, Json<Batch>), ApiError> {
    require_admin(&caller)?;
    if batch.name.trim().is_empty() || batch.sport.trim().is_empty() {
        return Err(ApiError::Validation(
            "name and sport must not be empty".to_string(),
        ));
    }
    if let (Some(start), Some(end)) = (batch.start_time, batch.end_time)
        && end <= start
    {
        return Err(ApiError::Validation(
            "end time must be after start time".to_string(),
        ));
    }

    let created = queries::insert_batch(&pool, &batch).await?;
    info!(name: "batch.created", id = %created.id, coach_id = %created.coach_id, "batch created");
    Ok((StatusCode::CREATED, Json(created)))
}
