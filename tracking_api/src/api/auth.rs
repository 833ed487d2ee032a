use crate::api::error::ApiError;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use shared::models::{Caller, Role};
use uuid::Uuid;

const BEARER_PREFIX: &str = "Bearer ";

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Two v4 UUIDs, hex encoded: 244 random bits.
pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

pub fn require_admin(caller: &Caller) -> Result<(), ApiError> {
    if caller.role == Role::Admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden("admin role required"))
    }
}

pub fn require_staff(caller: &Caller) -> Result<(), ApiError> {
    match caller.role {
        Role::Admin | Role::Coach => Ok(()),
        Role::Student => Err(ApiError::Forbidden("staff role required")),
    }
}

/// Admins may act for anyone; everyone else only for themselves.
pub fn require_self_or_admin(caller: &Caller, user_id: Uuid) -> Result<(), ApiError> {
    if caller.role == Role::Admin || caller.user_id == user_id {
        Ok(())
    } else {
        Err(ApiError::Forbidden("cannot act on behalf of another user"))
    }
}

/// Attendance is only recorded by the coach themselves or by an admin.
pub fn require_coach_or_admin(caller: &Caller, coach_id: Uuid) -> Result<(), ApiError> {
    match caller.role {
        Role::Admin => Ok(()),
        Role::Coach if caller.user_id == coach_id => Ok(()),
        Role::Coach => Err(ApiError::Forbidden("coaches can only record their own attendance")),
        Role::Student => Err(ApiError::Forbidden("coach role required")),
    }
}
