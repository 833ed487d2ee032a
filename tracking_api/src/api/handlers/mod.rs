pub mod attendance;
pub mod auth;
pub mod geofences;
pub mod location;
pub mod roster;
