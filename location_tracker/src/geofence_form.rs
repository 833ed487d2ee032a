use crate::source::Position;
use shared::geo::{Coordinate, MapViewport, snap_radius};
use shared::models::NewGeofence;
use thiserror::Error;

pub const DEFAULT_RADIUS_METERS: f64 = 100.0;

#[derive(Debug, Error, PartialEq)]
pub enum DraftError {
    #[error("a geofence needs a name")]
    MissingName,
    #[error("pick a center on the map or use the current position")]
    MissingCenter,
}

/// A geofence being drawn before it is submitted.
#[derive(Debug, Clone)]
pub struct GeofenceDraft {
    pub name: String,
    pub description: Option<String>,
    pub center: Option<Coordinate>,
    radius_meters: f64,
}

impl GeofenceDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            center: None,
            radius_meters: DEFAULT_RADIUS_METERS,
        }
    }

    pub fn radius_meters(&self) -> f64 {
        self.radius_meters
    }

    /// Slider input; clamped and snapped to the radius step.
    pub fn set_radius(&mut self, raw: f64) {
        self.radius_meters = snap_radius(raw);
    }

    pub fn click(&mut self, viewport: &MapViewport, x: f64, y: f64) {
        self.center = Some(viewport.point_at(x, y));
    }

    pub fn use_position(&mut self, position: &Position) {
        self.center = Some(position.coordinate);
    }

    pub fn submit(&self) -> Result<NewGeofence, DraftError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DraftError::MissingName);
        }
        let center = self.center.ok_or(DraftError::MissingCenter)?;
        Ok(NewGeofence {
            name: name.to_string(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            center_latitude: center.latitude,
            center_longitude: center.longitude,
            radius_meters: self.radius_meters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_follows_slider_rules() {
        let mut draft = GeofenceDraft::new("Nets");
        assert_eq!(draft.radius_meters(), DEFAULT_RADIUS_METERS);
        draft.set_radius(1_000.0);
        assert_eq!(draft.radius_meters(), 500.0);
        draft.set_radius(123.0);
        assert_eq!(draft.radius_meters(), 120.0);
        draft.set_radius(0.0);
        assert_eq!(draft.radius_meters(), 10.0);
    }

    #[test]
    fn click_sets_center_from_viewport() {
        let viewport = MapViewport {
            center: Coordinate::new(12.9716, 77.5946).unwrap(),
            width_px: 800,
            height_px: 600,
            degrees_per_pixel: 0.0001,
        };
        let mut draft = GeofenceDraft::new("Pool");
        draft.click(&viewport, 500.0, 300.0);

        let geofence = draft.submit().unwrap();
        assert!((geofence.center_latitude - 12.9716).abs() < 1e-9);
        assert!((geofence.center_longitude - 77.6046).abs() < 1e-9);
    }

    #[test]
    fn submit_requires_name_and_center() {
        let mut draft = GeofenceDraft::new("   ");
        assert_eq!(draft.submit().unwrap_err(), DraftError::MissingName);

        draft.name = "Court 2".to_string();
        assert_eq!(draft.submit().unwrap_err(), DraftError::MissingCenter);

        draft.center = Some(Coordinate::new(0.0, 0.0).unwrap());
        draft.description = Some("  ".to_string());
        let geofence = draft.submit().unwrap();
        assert_eq!(geofence.name, "Court 2");
        assert!(geofence.description.is_none());
    }
}
