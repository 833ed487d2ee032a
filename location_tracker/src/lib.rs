pub mod checkin;
pub mod client;
pub mod geofence_form;
pub mod health;
pub mod live;
pub mod sampler;
pub mod source;
