use location_tracker::checkin::CheckInBlocked;
use location_tracker::client::ClientError;
use location_tracker::geofence_form::DraftError;
use location_tracker::source::PositionError;
use shared::error::{ConfigError, InitializationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MainError {
    #[error(transparent)]
    Init(#[from] InitializationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    CheckIn(#[from] CheckInBlocked),
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error("no position source: pass --fix or --replay")]
    NoSource,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}
