use crate::source::Position;
use shared::models::AttendanceRequest;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum CheckInBlocked {
    #[error("select a coach before checking in")]
    MissingCoach,
    #[error("select a batch before checking in")]
    MissingBatch,
    #[error("capture a location before checking in")]
    MissingLocation,
}

/// Collects the pieces of a check-in or check-out. Submission is allowed only once all of them
/// are present.
#[derive(Debug, Clone, Default)]
pub struct CheckInForm {
    pub coach_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub location: Option<Position>,
}

impl CheckInForm {
    pub fn ready(&self) -> Result<AttendanceRequest, CheckInBlocked> {
        let coach_id = self.coach_id.ok_or(CheckInBlocked::MissingCoach)?;
        let batch_id = self.batch_id.ok_or(CheckInBlocked::MissingBatch)?;
        let location = self.location.ok_or(CheckInBlocked::MissingLocation)?;
        Ok(AttendanceRequest {
            coach_id,
            batch_id,
            latitude: location.coordinate.latitude,
            longitude: location.coordinate.longitude,
            accuracy: location.accuracy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::geo::Coordinate;

    fn position() -> Position {
        Position {
            coordinate: Coordinate::new(12.9716, 77.5946).unwrap(),
            accuracy: 15.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn reports_first_missing_piece() {
        let mut form = CheckInForm::default();
        assert_eq!(form.ready(), Err(CheckInBlocked::MissingCoach));

        form.coach_id = Some(Uuid::now_v7());
        form.location = Some(position());
        assert_eq!(form.ready(), Err(CheckInBlocked::MissingBatch));

        form.batch_id = Some(Uuid::now_v7());
        form.location = None;
        assert_eq!(form.ready(), Err(CheckInBlocked::MissingLocation));
    }

    #[test]
    fn complete_form_builds_request_from_snapshot() {
        let coach_id = Uuid::now_v7();
        let batch_id = Uuid::now_v7();
        let form = CheckInForm {
            coach_id: Some(coach_id),
            batch_id: Some(batch_id),
            location: Some(position()),
        };
        let req = form.ready().unwrap();
        assert_eq!(req.coach_id, coach_id);
        assert_eq!(req.batch_id, batch_id);
        assert_eq!(req.latitude, 12.9716);
        assert_eq!(req.accuracy, 15.0);
    }
}
