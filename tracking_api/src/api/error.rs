use crate::api::db::queries::QueryError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Serialize, Serializer};
use shared::geo::CoordinateError;
use thiserror::Error;
use tracing::warn;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    #[serde(serialize_with = "serialize_status")]
    pub status_code: StatusCode,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid bearer token")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => {
                warn!(name: "auth.rejected", "request rejected without valid bearer token");
                ErrorMessage::from((StatusCode::UNAUTHORIZED, "missing or invalid bearer token"))
                    .into_response()
            }
            ApiError::Forbidden(reason) => {
                warn!(name: "auth.forbidden", reason, "caller lacks permission");
                ErrorMessage::from((StatusCode::FORBIDDEN, reason)).into_response()
            }
            ApiError::Validation(msg) => {
                warn!(name: "request.invalid", error = %msg, "invalid request");
                ErrorMessage::from((StatusCode::BAD_REQUEST, msg)).into_response()
            }
            ApiError::Coordinate(e) => {
                warn!(name: "request.invalid", error = %e, "invalid coordinates");
                ErrorMessage::from((StatusCode::BAD_REQUEST, e.to_string())).into_response()
            }
            ApiError::NotFound(what) => {
                ErrorMessage::from((StatusCode::NOT_FOUND, format!("{what} not found")))
                    .into_response()
            }
            ApiError::Conflict(msg) => {
                warn!(name: "request.conflict", error = %msg, "conflicting request");
                ErrorMessage::from((StatusCode::CONFLICT, msg)).into_response()
            }
            ApiError::Query(e) => match e {
                QueryError::Sql(e) => {
                    warn!(name: "db.error", error = ?e, "sql error");
                    ErrorMessage::from((StatusCode::INTERNAL_SERVER_ERROR, "")).into_response()
                }
                QueryError::IllegalArgs(e) => {
                    warn!(name: "db.illegal_args", error = %e, "illegal arguments for Db query");
                    ErrorMessage::from((StatusCode::BAD_REQUEST, e)).into_response()
                }
                QueryError::Conflict(e) => {
                    warn!(name: "db.conflict", error = %e, "unique constraint violated");
                    ErrorMessage::from((StatusCode::CONFLICT, e)).into_response()
                }
                QueryError::MissingReference(e) => {
                    warn!(name: "db.missing_reference", error = %e, "foreign key violated");
                    ErrorMessage::from((StatusCode::BAD_REQUEST, e)).into_response()
                }
            },
        }
    }
}

fn serialize_status<S>(value: &StatusCode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u16(value.as_u16())
}

impl From<(StatusCode, String)> for ErrorMessage {
    fn from((status_code, message): (StatusCode, String)) -> Self {
        Self {
            status_code,
            message,
        }
    }
}

impl From<(StatusCode, &str)> for ErrorMessage {
    fn from((status_code, message): (StatusCode, &str)) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ErrorMessage {
    fn into_response(self) -> Response {
        (self.status_code, Json(self)).into_response()
    }
}
