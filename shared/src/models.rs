//! Wire types shared by the tracking API and the tracker client. JSON is camelCase; row structs
//! map snake_case columns through `sqlx::FromRow`.

use crate::geo::{Circle, Coordinate, CoordinateError, validate_accuracy};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                match value.as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant { kind: $kind, value }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "lowercase")]
pub enum TrackingType {
    Manual,
    Automatic,
}

text_enum!(TrackingType, "tracking type", {
    Manual => "manual",
    Automatic => "automatic",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Unverified,
}

text_enum!(AttendanceStatus, "attendance status", {
    Present => "present",
    Late => "late",
    Unverified => "unverified",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Coach,
    Student,
}

text_enum!(Role, "role", {
    Admin => "admin",
    Coach => "coach",
    Student => "student",
});

/// A single device position reading, as posted to `/api/location/track`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub user_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
    pub tracking_type: TrackingType,
}

impl LocationSample {
    pub fn coordinate(&self) -> Result<Coordinate, CoordinateError> {
        validate_accuracy(self.accuracy)?;
        Coordinate::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct TrackReceipt {
    pub id: Uuid,
    pub within_geofence: bool,
    pub geofence_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct LiveLocation {
    pub user_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub tracking_type: TrackingType,
    pub within_geofence: bool,
    pub geofence_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct LiveLocationsDto {
    pub requested_at: DateTime<Utc>,
    pub window_minutes: i64,
    pub locations: Vec<LiveLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct RecordedSample {
    pub id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub tracking_type: TrackingType,
    pub within_geofence: bool,
    pub geofence_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct LocationHistoryDto {
    pub user_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub samples: Vec<RecordedSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub radius_meters: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Geofence {
    pub fn circle(&self) -> Circle {
        Circle {
            center: Coordinate {
                latitude: self.center_latitude,
                longitude: self.center_longitude,
            },
            radius_meters: self.radius_meters,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct NewGeofence {
    pub name: String,
    pub description: Option<String>,
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub radius_meters: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct GeofencePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub radius_meters: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct ContainmentQuery {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct ContainingGeofence {
    pub id: Uuid,
    pub name: String,
    pub distance_meters: f64,
}

/// Body of both check-in and check-out calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRequest {
    pub coach_id: Uuid,
    pub batch_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct CoachAttendance {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub batch_id: Uuid,
    pub date: NaiveDate,
    pub check_in_time: DateTime<Utc>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub is_gps_verified: bool,
    pub geofence_verified: bool,
    pub geofence_id: Option<Uuid>,
    pub distance_meters: Option<f64>,
    pub check_out_geofence_verified: Option<bool>,
    #[sqlx(try_from = "String")]
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct Coach {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct NewCoach {
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: Uuid,
    pub name: String,
    pub sport: String,
    pub coach_id: Uuid,
    pub geofence_id: Option<Uuid>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct NewBatch {
    pub name: String,
    pub sport: String,
    pub coach_id: Uuid,
    pub geofence_id: Option<Uuid>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct IssueToken {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub user_id: Uuid,
    pub role: Role,
}

/// The authenticated identity behind a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub role: Role,
}
