use crate::api::auth::{bearer_token, generate_token, require_admin};
use crate::api::db::queries;
use crate::api::error::ApiError;
use crate::state::{Db, Settings};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use shared::models::{Caller, IssueToken, IssuedToken};
use tracing::info;

/// The plaintext token is only ever returned here.
pub async fn issue_token(
    State(Db { pool }): State<Db>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<IssueToken>,
) -> Result<(StatusCode, Json<IssuedToken>), ApiError> {
    require_admin(&caller)?;

    let token = generate_token();
    queries::insert_token(&pool, &token, req.user_id, req.role).await?;
    info!(name: "token.issued", user_id = %req.user_id, role = req.role.as_str(), "api token issued");

    Ok((
        StatusCode::CREATED,
        Json(IssuedToken {
            token,
            user_id: req.user_id,
            role: req.role,
        }),
    ))
}

pub async fn me(Extension(caller): Extension<Caller>) -> Json<Caller> {
    Json(caller)
}

pub async fn logout(
    State(Db { pool }): State<Db>,
    State(settings): State<Settings>,
    Extension(caller): Extension<Caller>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    if settings.admin_token.as_deref() == Some(token) {
        return Err(ApiError::Validation(
            "the bootstrap admin token cannot be revoked".to_string(),
        ));
    }

    if queries::revoke_token(&pool, token).await? {
        info!(name: "token.revoked", user_id = %caller.user_id, "api token revoked");
    }
    Ok(StatusCode::NO_CONTENT)
}
