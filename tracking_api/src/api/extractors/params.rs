use crate::api::error::ErrorMessage;
use axum::{
    extract::{FromRequestParts, Query},
    http::{StatusCode, request::Parts},
};
use chrono::{DateTime, Utc};
use humantime;
use serde::Deserialize;
use std::marker::PhantomData;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RawInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A trait to provide a maximum duration for validation.
pub trait WithMaxDuration {
    const MAX_DURATION: Duration;
}

/// Marker for a 7 day maximum duration.
#[derive(Debug)]
pub struct OneWeek;
impl WithMaxDuration for OneWeek {
    const MAX_DURATION: Duration = Duration::from_secs(60 * 60 * 24 * 7);
}

/// Query-string interval that ensures:
/// 1) `start` is in the past
/// 2) `start` is prior to `end`
/// 3) the span does not exceed the maximum provided by the [`WithMaxDuration`] marker.
#[derive(Debug, Clone)]
pub struct MaxDurationInterval<T: WithMaxDuration> {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    _marker: PhantomData<T>,
}

impl<T: WithMaxDuration> MaxDurationInterval<T> {
    fn validate(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> Result<Self, String> {
        if end <= start {
            return Err("end must be greater than start".to_string());
        }
        if start > now {
            return Err("start must be in the past".to_string());
        }
        let max_duration = T::MAX_DURATION;
        if (end - start).num_seconds() > max_duration.as_secs() as i64 {
            return Err(format!(
                "end must be {} seconds or less after start ({})",
                max_duration.as_secs(),
                humantime::format_duration(max_duration)
            ));
        }
        Ok(Self {
            start,
            end,
            _marker: PhantomData,
        })
    }
}

impl<S, T> FromRequestParts<S> for MaxDurationInterval<T>
where
    S: Send + Sync,
    T: WithMaxDuration + Send + Sync,
{
    type Rejection = ErrorMessage;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<RawInterval>::from_request_parts(parts, state)
            .await
            .map_err(|e| ErrorMessage::from((StatusCode::BAD_REQUEST, e.to_string())))?;

        Self::validate(params.start, params.end, Utc::now())
            .map_err(|msg| ErrorMessage::from((StatusCode::BAD_REQUEST, msg)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn accepts_window_within_limit() {
        let now = Utc::now();
        let start = now - TimeDelta::days(2);
        let interval = MaxDurationInterval::<OneWeek>::validate(start, now, now).unwrap();
        assert_eq!(interval.start, start);
        assert_eq!(interval.end, now);
    }

    #[test]
    fn rejects_inverted_future_and_oversized_windows() {
        let now = Utc::now();
        assert_eq!(
            MaxDurationInterval::<OneWeek>::validate(now, now - TimeDelta::hours(1), now)
                .unwrap_err(),
            "end must be greater than start"
        );
        assert_eq!(
            MaxDurationInterval::<OneWeek>::validate(
                now + TimeDelta::hours(1),
                now + TimeDelta::hours(2),
                now
            )
            .unwrap_err(),
            "start must be in the past"
        );
        let err = MaxDurationInterval::<OneWeek>::validate(now - TimeDelta::days(8), now, now)
            .unwrap_err();
        assert!(err.starts_with("end must be 604800 seconds or less after start"));
    }
}
