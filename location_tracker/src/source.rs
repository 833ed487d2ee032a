//! Where position fixes come from. The tracker has no GPS of its own, so a fix is either a fixed
//! point given on the command line or the next record of a recorded track.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::geo::{Coordinate, CoordinateError, validate_accuracy};
use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub coordinate: Coordinate,
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    Unavailable(String),
    #[error("timed out waiting for a position fix")]
    Timeout,
    /// The source has no more fixes to give.
    #[error("recorded track is exhausted")]
    Exhausted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid track record on line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),
}

/// Produces fresh fixes. Implementations must not hand back a cached reading.
pub trait PositionSource: Send {
    fn current_position(&mut self) -> impl Future<Output = Result<Position, PositionError>> + Send;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedPosition {
    pub coordinate: Coordinate,
    pub accuracy: f64,
}

impl FixedPosition {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Result<Self, PositionError> {
        Ok(Self {
            coordinate: Coordinate::new(latitude, longitude)?,
            accuracy: validate_accuracy(accuracy)?,
        })
    }
}

impl PositionSource for FixedPosition {
    async fn current_position(&mut self) -> Result<Position, PositionError> {
        Ok(Position {
            coordinate: self.coordinate,
            accuracy: self.accuracy,
            timestamp: Utc::now(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TrackRecord {
    latitude: f64,
    longitude: f64,
    accuracy: f64,
}

/// Replays a JSON-lines file of `{"latitude", "longitude", "accuracy"}` records, one per fix.
#[derive(Debug)]
pub struct ReplayTrack {
    remaining: VecDeque<FixedPosition>,
    all: Vec<FixedPosition>,
    looping: bool,
}

impl ReplayTrack {
    pub async fn open(path: impl AsRef<Path>, looping: bool) -> Result<Self, PositionError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(&text, looping)
    }

    pub fn parse(text: &str, looping: bool) -> Result<Self, PositionError> {
        let mut all = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: TrackRecord = serde_json::from_str(line)
                .map_err(|source| PositionError::Parse {
                    line: idx + 1,
                    source,
                })?;
            all.push(FixedPosition::new(
                record.latitude,
                record.longitude,
                record.accuracy,
            )?);
        }
        Ok(Self {
            remaining: all.iter().copied().collect(),
            all,
            looping,
        })
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

impl PositionSource for ReplayTrack {
    async fn current_position(&mut self) -> Result<Position, PositionError> {
        if self.remaining.is_empty() && self.looping {
            self.remaining.extend(self.all.iter().copied());
        }
        let mut next = self
            .remaining
            .pop_front()
            .ok_or(PositionError::Exhausted)?;
        next.current_position().await
    }
}

/// The sources selectable from the command line.
#[derive(Debug)]
pub enum DeviceSource {
    Fixed(FixedPosition),
    Replay(ReplayTrack),
}

impl PositionSource for DeviceSource {
    async fn current_position(&mut self) -> Result<Position, PositionError> {
        match self {
            DeviceSource::Fixed(fixed) => fixed.current_position().await,
            DeviceSource::Replay(track) => track.current_position().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: &str = r#"
{"latitude": 12.9716, "longitude": 77.5946, "accuracy": 8.0}
{"latitude": 12.9720, "longitude": 77.5950, "accuracy": 12.5}
"#;

    #[tokio::test]
    async fn replay_yields_records_in_order_then_runs_out() {
        let mut track = ReplayTrack::parse(TRACK, false).unwrap();
        assert_eq!(track.len(), 2);

        let first = track.current_position().await.unwrap();
        assert_eq!(first.coordinate.latitude, 12.9716);
        let second = track.current_position().await.unwrap();
        assert_eq!(second.accuracy, 12.5);

        assert!(matches!(
            track.current_position().await,
            Err(PositionError::Exhausted)
        ));
    }

    #[tokio::test]
    async fn looping_replay_starts_over() {
        let mut track = ReplayTrack::parse(TRACK, true).unwrap();
        for _ in 0..2 {
            track.current_position().await.unwrap();
        }
        let again = track.current_position().await.unwrap();
        assert_eq!(again.coordinate.longitude, 77.5946);
    }

    #[test]
    fn replay_reports_bad_lines() {
        let err = ReplayTrack::parse("{\"latitude\": 1.0}\n", false).unwrap_err();
        assert!(matches!(err, PositionError::Parse { line: 1, .. }));

        let err = ReplayTrack::parse(
            "{\"latitude\": 95.0, \"longitude\": 0.0, \"accuracy\": 1.0}",
            false,
        )
        .unwrap_err();
        assert!(matches!(err, PositionError::Coordinate(_)));
    }

    #[test]
    fn fixed_position_validates_input() {
        assert!(FixedPosition::new(12.0, 77.0, 5.0).is_ok());
        assert!(FixedPosition::new(12.0, 181.0, 5.0).is_err());
        assert!(FixedPosition::new(12.0, 77.0, -1.0).is_err());
    }
}
