//! Presence verification for coach check-in and check-out.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta, Utc};
use shared::AttendanceConfig;
use shared::geo::{Coordinate, nearest_fence};
use shared::models::{AttendanceStatus, Geofence};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verification {
    pub is_gps_verified: bool,
    pub geofence_verified: bool,
    pub geofence_id: Option<Uuid>,
    pub distance_meters: Option<f64>,
}

/// `geofence_id` is only set when the point lies inside that fence; `distance_meters` always
/// refers to the nearest candidate center.
pub fn verify_presence(
    point: &Coordinate,
    accuracy: f64,
    candidates: &[Geofence],
    max_accuracy_meters: f64,
) -> Verification {
    let matched = nearest_fence(
        point,
        candidates
            .iter()
            .filter(|g| g.is_active)
            .map(|g| (g.id, g.circle())),
    );

    Verification {
        is_gps_verified: accuracy <= max_accuracy_meters,
        geofence_verified: matched.is_some_and(|m| m.inside),
        geofence_id: matched.filter(|m| m.inside).map(|m| m.key),
        distance_meters: matched.map(|m| m.distance_meters),
    }
}

pub fn attendance_status(
    verification: &Verification,
    checked_in_at: DateTime<Utc>,
    batch_start: Option<NaiveTime>,
    config: &AttendanceConfig,
) -> AttendanceStatus {
    if !(verification.is_gps_verified && verification.geofence_verified) {
        return AttendanceStatus::Unverified;
    }
    let Some(start) = batch_start else {
        return AttendanceStatus::Present;
    };

    let (deadline, wrapped_secs) =
        start.overflowing_add_signed(TimeDelta::minutes(config.late_grace_minutes));
    // A grace period running past midnight never marks anyone late.
    if wrapped_secs != 0 {
        return AttendanceStatus::Present;
    }

    let local = local_datetime(checked_in_at, config.utc_offset_minutes);
    if local.time() > deadline {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    }
}

/// Attendance dates follow the academy's local calendar.
pub fn local_date(at: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDate {
    local_datetime(at, utc_offset_minutes).date()
}

fn local_datetime(at: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDateTime {
    let offset = utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix());
    at.with_timezone(&offset).naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fence(latitude: f64, longitude: f64, radius_meters: f64, is_active: bool) -> Geofence {
        Geofence {
            id: Uuid::now_v7(),
            name: "Main ground".to_string(),
            description: None,
            center_latitude: latitude,
            center_longitude: longitude,
            radius_meters,
            is_active,
            created_at: Utc::now(),
        }
    }

    fn config() -> AttendanceConfig {
        AttendanceConfig {
            max_accuracy_meters: 50.0,
            late_grace_minutes: 10,
            utc_offset_minutes: 330,
        }
    }

    fn verified() -> Verification {
        Verification {
            is_gps_verified: true,
            geofence_verified: true,
            geofence_id: Some(Uuid::nil()),
            distance_meters: Some(5.0),
        }
    }

    #[test]
    fn inside_active_fence_with_good_accuracy_is_verified() {
        let ground = fence(12.9716, 77.5946, 100.0, true);
        let point = Coordinate::new(12.9720, 77.5946).unwrap();
        let v = verify_presence(&point, 12.0, std::slice::from_ref(&ground), 50.0);
        assert!(v.is_gps_verified);
        assert!(v.geofence_verified);
        assert_eq!(v.geofence_id, Some(ground.id));
        assert!(v.distance_meters.unwrap() < 50.0);
    }

    #[test]
    fn poor_accuracy_fails_gps_check_only() {
        let ground = fence(12.9716, 77.5946, 100.0, true);
        let point = Coordinate::new(12.9716, 77.5946).unwrap();
        let v = verify_presence(&point, 250.0, &[ground], 50.0);
        assert!(!v.is_gps_verified);
        assert!(v.geofence_verified);
    }

    #[test]
    fn outside_every_fence_reports_nearest_distance() {
        let near = fence(12.9800, 77.5946, 100.0, true);
        let far = fence(13.0800, 77.5946, 100.0, true);
        let point = Coordinate::new(12.9716, 77.5946).unwrap();
        let v = verify_presence(&point, 5.0, &[far, near], 50.0);
        assert!(!v.geofence_verified);
        assert_eq!(v.geofence_id, None);
        let d = v.distance_meters.unwrap();
        assert!((d - 934.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn inactive_fences_are_ignored() {
        let ground = fence(12.9716, 77.5946, 100.0, false);
        let point = Coordinate::new(12.9716, 77.5946).unwrap();
        let v = verify_presence(&point, 5.0, &[ground], 50.0);
        assert!(!v.geofence_verified);
        assert_eq!(v.distance_meters, None);
    }

    #[test]
    fn unverified_when_either_check_fails() {
        let mut v = verified();
        v.geofence_verified = false;
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
        assert_eq!(
            attendance_status(&v, at, None, &config()),
            AttendanceStatus::Unverified
        );

        let mut v = verified();
        v.is_gps_verified = false;
        assert_eq!(
            attendance_status(&v, at, None, &config()),
            AttendanceStatus::Unverified
        );
    }

    #[test]
    fn late_after_grace_period_in_local_time() {
        let start = NaiveTime::from_hms_opt(6, 0, 0);
        // 00:35 UTC is 06:05 at UTC+05:30.
        let on_time = Utc.with_ymd_and_hms(2026, 10, 19, 0, 35, 0).unwrap();
        // 00:41 UTC is 06:11.
        let late = Utc.with_ymd_and_hms(2026, 10, 19, 0, 41, 0).unwrap();

        assert_eq!(
            attendance_status(&verified(), on_time, start, &config()),
            AttendanceStatus::Present
        );
        assert_eq!(
            attendance_status(&verified(), late, start, &config()),
            AttendanceStatus::Late
        );
        assert_eq!(
            attendance_status(&verified(), late, None, &config()),
            AttendanceStatus::Present
        );
    }

    #[test]
    fn grace_period_past_midnight_is_never_late() {
        let start = NaiveTime::from_hms_opt(23, 55, 0);
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 18, 40, 0).unwrap();
        assert_eq!(
            attendance_status(&verified(), at, start, &config()),
            AttendanceStatus::Present
        );
    }

    #[test]
    fn local_date_uses_offset() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 20, 0, 0).unwrap();
        assert_eq!(
            local_date(at, 330),
            NaiveDate::from_ymd_opt(2026, 10, 20).unwrap()
        );
        assert_eq!(local_date(at, 0), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert_eq!(local_date(at, i32::MAX), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
    }
}
