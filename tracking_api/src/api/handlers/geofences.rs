use crate::api::auth::require_admin;
use crate::api::db::queries;
use crate::api::error::ApiError;
use crate::metrics::Metrics;
use crate::state::Db;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use shared::geo::{Coordinate, validate_radius};
use shared::models::{
    Caller, ContainingGeofence, ContainmentQuery, Geofence, GeofencePatch, NewGeofence,
};
use tracing::info;
use uuid::Uuid;

const MAX_NAME_LEN: usize = 100;

#[derive(Deserialize)]
pub struct GeofenceListQuery {
    pub active: Option<bool>,
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }
    if trimmed.chars().count() >= MAX_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "name must be shorter than {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub async fn list_geofences(
    State(Db { pool }): State<Db>,
    Query(params): Query<GeofenceListQuery>,
) -> Result<Json<Vec<Geofence>>, ApiError> {
    Ok(Json(queries::list_geofences(&pool, params.active).await?))
}

pub async fn get_geofence(
    State(Db { pool }): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<Json<Geofence>, ApiError> {
    queries::get_geofence(&pool, id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("geofence"))
}

pub async fn create_geofence(
    State(Db { pool }): State<Db>,
    State(metrics): State<Metrics>,
    Extension(caller): Extension<Caller>,
    Json(mut geofence): Json<NewGeofence>,
) -> Result<(StatusCode, Json<Geofence>), ApiError> {
    require_admin(&caller)?;

    geofence.name = validate_name(&geofence.name)?;
    Coordinate::new(geofence.center_latitude, geofence.center_longitude)?;
    validate_radius(geofence.radius_meters)?;

    let created = queries::insert_geofence(&pool, &geofence).await?;
    metrics.geofences.created.add(1, &[]);
    info!(name: "geofence.created", id = %created.id, geofence_name = %created.name, radius_meters = created.radius_meters, "geofence created");

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_geofence(
    State(Db { pool }): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(mut patch): Json<GeofencePatch>,
) -> Result<Json<Geofence>, ApiError> {
    require_admin(&caller)?;

    if let Some(name) = patch.name.as_deref() {
        patch.name = Some(validate_name(name)?);
    }
    if let Some(radius) = patch.radius_meters {
        validate_radius(radius)?;
    }

    let updated = queries::update_geofence(&pool, id, &patch)
        .await?
        .ok_or(ApiError::NotFound("geofence"))?;
    info!(name: "geofence.updated", id = %updated.id, is_active = updated.is_active, "geofence updated");

    Ok(Json(updated))
}

pub async fn delete_geofence(
    State(Db { pool }): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_admin(&caller)?;

    if queries::delete_geofence(&pool, id).await? {
        info!(name: "geofence.deleted", %id, "geofence deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("geofence"))
    }
}

/// Active geofences containing the point, nearest first.
pub async fn containing_geofences(
    State(Db { pool }): State<Db>,
    Json(query): Json<ContainmentQuery>,
) -> Result<Json<Vec<ContainingGeofence>>, ApiError> {
    let point = Coordinate::new(query.latitude, query.longitude)?;

    let mut containing = queries::list_geofences(&pool, Some(true))
        .await?
        .into_iter()
        .filter_map(|g| {
            let circle = g.circle();
            circle.contains(&point).then(|| ContainingGeofence {
                id: g.id,
                distance_meters: circle.distance_from_center(&point),
                name: g.name,
            })
        })
        .collect::<Vec<_>>();
    containing.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));

    Ok(Json(containing))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(validate_name("  North turf ").unwrap(), "North turf");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(99)).is_ok());
        assert!(validate_name(&"x".repeat(100)).is_err());
    }
}
