use crate::metrics::Metrics;
use axum::extract::FromRef;
use shared::{ApiSettings, AttendanceConfig};
use sqlx::{Pool, Postgres};
use std::sync::Arc;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db: Db,
    pub settings: Settings,
    pub metrics: Metrics,
}

#[derive(Clone)]
pub struct Db {
    pub pool: Pool<Postgres>,
}

#[derive(Clone)]
pub struct Settings {
    pub live_window_minutes: i64,
    pub admin_token: Option<Arc<str>>,
    pub attendance: AttendanceConfig,
}

impl AppState {
    pub fn new(pool: Pool<Postgres>, settings: &ApiSettings) -> Self {
        Self {
            db: Db { pool },
            settings: Settings {
                live_window_minutes: settings.api.live_window_minutes,
                admin_token: settings.api.admin_token.as_deref().map(Arc::from),
                attendance: settings.attendance.clone(),
            },
            metrics: Metrics::default(),
        }
    }
}
