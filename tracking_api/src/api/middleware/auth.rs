use axum::extract::{Request, State};
use axum::{middleware::Next, response::IntoResponse};

use crate::api::auth::bearer_token;
use crate::api::db::queries;
use crate::api::error::ApiError;
use crate::state::{Db, Settings};
use shared::models::{Caller, Role};
use uuid::Uuid;

/// Resolves the bearer token into a [`Caller`] and stores it in the request extensions.
pub async fn require_auth(
    State(db): State<Db>,
    State(settings): State<Settings>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let Some(token) = bearer_token(req.headers()) else {
        return Err(ApiError::Unauthorized);
    };

    let caller = if settings
        .admin_token
        .as_deref()
        .is_some_and(|admin| admin == token)
    {
        Caller {
            user_id: Uuid::nil(),
            role: Role::Admin,
        }
    } else {
        queries::find_token(&db.pool, token)
            .await?
            .ok_or(ApiError::Unauthorized)?
    };

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}
