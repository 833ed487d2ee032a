use crate::api::handlers::attendance::{check_in, check_out, list_attendance};
use crate::api::handlers::auth::{issue_token, logout, me};
use crate::api::handlers::geofences::{
    containing_geofences, create_geofence, delete_geofence, get_geofence, list_geofences,
    update_geofence,
};
use crate::api::handlers::location::{get_live_locations, get_location_history, track_location};
use crate::api::handlers::roster::{create_batch, create_coach, list_batches, list_coaches};
use crate::api::middleware::auth::require_auth;
use crate::state::AppState;
use axum::Router;
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .nest("/api", api_routes(&state))
        .nest("/mobile", mobile_routes(&state))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

fn api_routes(state: &AppState) -> Router<AppState> {
    Router::<AppState>::new()
        .route("/location/track", post(track_location))
        .route("/location/live", get(get_live_locations))
        .route("/location/history", get(get_location_history))
        .route("/geofences", get(list_geofences).post(create_geofence))
        .route("/geofences/contains", post(containing_geofences))
        .route(
            "/geofences/{id}",
            get(get_geofence)
                .patch(update_geofence)
                .delete(delete_geofence),
        )
        .route("/coach/checkin", post(check_in))
        .route("/coach/checkout", post(check_out))
        .route("/coach/attendance", get(list_attendance))
        .route("/coaches", get(list_coaches).post(create_coach))
        .route("/batches", get(list_batches).post(create_batch))
        .route("/tokens", post(issue_token))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

/// Paths used by the mobile app. Same handlers as `/api`.
fn mobile_routes(state: &AppState) -> Router<AppState> {
    Router::<AppState>::new()
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
        .route("/coach/checkin", post(check_in))
        .route("/coach/checkout", post(check_out))
        .route("/coach/attendance", get(list_attendance))
        .route("/location/track", post(track_location))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use serde_json::{Value, json};
    use shared::{ApiConfig, ApiSettings, AttendanceConfig, PostgresConfig};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    const ADMIN_TOKEN: &str = "test-admin-token";

    fn test_app() -> Router {
        let settings = ApiSettings {
            postgres: PostgresConfig {
                connection_string: "postgres://academy@localhost/academy".to_string(),
            },
            api: ApiConfig {
                admin_token: Some(ADMIN_TOKEN.to_string()),
                ..ApiConfig::default()
            },
            attendance: AttendanceConfig::default(),
        };
        let pool = PgPoolOptions::new()
            .connect_lazy(&settings.postgres.connection_string)
            .unwrap();
        app(AppState::new(pool, &settings))
    }

    fn admin_post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let response = test_app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let response = test_app()
            .oneshot(
                Request::get("/api/location/live")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["statusCode"], 401);
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_rejected_on_mobile_routes() {
        let response = test_app()
            .oneshot(
                Request::get("/mobile/auth/me")
                    .header(header::AUTHORIZATION, "Basic YWRtaW46YWRtaW4=")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bootstrap_token_resolves_to_admin() {
        let response = test_app()
            .oneshot(
                Request::get("/mobile/auth/me")
                    .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["role"], "admin");
    }

    #[tokio::test]
    async fn geofence_radius_out_of_range_is_bad_request() {
        let response = test_app()
            .oneshot(admin_post(
                "/api/geofences",
                json!({
                    "name": "Main ground",
                    "description": null,
                    "centerLatitude": 12.9716,
                    "centerLongitude": 77.5946,
                    "radiusMeters": 5.0
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["statusCode"], 400);
        assert!(body["message"].as_str().unwrap().contains("radius"));
    }

    #[tokio::test]
    async fn track_with_invalid_latitude_is_bad_request() {
        let response = test_app()
            .oneshot(admin_post(
                "/api/location/track",
                json!({
                    "userId": "0191f5f0-8a4c-7cc2-9c43-3f1c8e7b2a10",
                    "latitude": 91.0,
                    "longitude": 77.5946,
                    "accuracy": 12.0,
                    "timestamp": "2026-10-19T06:30:00Z",
                    "trackingType": "manual"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bootstrap_token_cannot_be_revoked() {
        let response = test_app()
            .oneshot(admin_post("/mobile/auth/logout", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
