use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius (IUGG).
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

pub const MIN_RADIUS_METERS: f64 = 10.0;
pub const MAX_RADIUS_METERS: f64 = 500.0;
pub const RADIUS_STEP_METERS: f64 = 10.0;

#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
    #[error("latitude {0} must be within [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} must be within [-180, 180]")]
    Longitude(f64),
    #[error("accuracy {0} must be a non-negative number of meters")]
    Accuracy(f64),
    #[error("radius {0} must be within [{MIN_RADIUS_METERS}, {MAX_RADIUS_METERS}] meters")]
    Radius(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Great-circle distance in meters using the haversine formula.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lng = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        // Rounding can push `a` marginally past 1 for antipodal points.
        let c = 2.0 * a.sqrt().min(1.0).asin();
        EARTH_RADIUS_METERS * c
    }
}

pub fn validate_accuracy(accuracy: f64) -> Result<f64, CoordinateError> {
    if accuracy.is_finite() && accuracy >= 0.0 {
        Ok(accuracy)
    } else {
        Err(CoordinateError::Accuracy(accuracy))
    }
}

pub fn validate_radius(radius_meters: f64) -> Result<f64, CoordinateError> {
    if radius_meters.is_finite() && (MIN_RADIUS_METERS..=MAX_RADIUS_METERS).contains(&radius_meters)
    {
        Ok(radius_meters)
    } else {
        Err(CoordinateError::Radius(radius_meters))
    }
}

/// Behaves like the radius slider: clamps to the allowed range and snaps to the nearest step.
pub fn snap_radius(radius_meters: f64) -> f64 {
    if radius_meters.is_nan() {
        return MIN_RADIUS_METERS;
    }
    let clamped = radius_meters.clamp(MIN_RADIUS_METERS, MAX_RADIUS_METERS);
    (clamped / RADIUS_STEP_METERS).round() * RADIUS_STEP_METERS
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Coordinate,
    pub radius_meters: f64,
}

impl Circle {
    pub fn distance_from_center(&self, point: &Coordinate) -> f64 {
        self.center.distance_to(point)
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        self.distance_from_center(point) <= self.radius_meters
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FenceMatch<K> {
    pub key: K,
    pub distance_meters: f64,
    pub inside: bool,
}

/// Picks the closest fence containing `point`. When none contains it, the fence with the
/// nearest center is returned with `inside == false`.
pub fn nearest_fence<K>(
    point: &Coordinate,
    fences: impl IntoIterator<Item = (K, Circle)>,
) -> Option<FenceMatch<K>> {
    let mut best: Option<FenceMatch<K>> = None;
    for (key, circle) in fences {
        let distance_meters = circle.distance_from_center(point);
        let candidate = FenceMatch {
            key,
            distance_meters,
            inside: distance_meters <= circle.radius_meters,
        };
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let better = match (candidate.inside, current.inside) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => candidate.distance_meters < current.distance_meters,
                };
                if better { Some(candidate) } else { Some(current) }
            }
        };
    }
    best
}

/// Rough map used when picking a geofence center by clicking. Pixel offsets from the viewport
/// center are converted with a fixed degrees-per-pixel factor; this is not a projection.
#[derive(Debug, Clone, Copy)]
pub struct MapViewport {
    pub center: Coordinate,
    pub width_px: u32,
    pub height_px: u32,
    pub degrees_per_pixel: f64,
}

/// Maps any longitude into `[-180, 180)`.
fn wrap_longitude(longitude: f64) -> f64 {
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}

impl MapViewport {
    pub fn point_at(&self, x: f64, y: f64) -> Coordinate {
        let dx = x - f64::from(self.width_px) / 2.0;
        let dy = y - f64::from(self.height_px) / 2.0;

        let latitude = (self.center.latitude - dy * self.degrees_per_pixel).clamp(-90.0, 90.0);
        let longitude = wrap_longitude(self.center.longitude + dx * self.degrees_per_pixel);

        Coordinate {
            latitude,
            longitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate::new(latitude, longitude).unwrap()
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert_eq!(
            Coordinate::new(90.5, 0.0),
            Err(CoordinateError::Latitude(90.5))
        );
        assert_eq!(
            Coordinate::new(0.0, -180.1),
            Err(CoordinateError::Longitude(-180.1))
        );
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn haversine_matches_known_distances() {
        // One degree of latitude is ~111.2 km on the mean sphere.
        let d = coord(0.0, 0.0).distance_to(&coord(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 10.0, "got {d}");

        // Bengaluru to Chennai, roughly 290 km.
        let blr = coord(12.9716, 77.5946);
        let maa = coord(13.0827, 80.2707);
        let d = blr.distance_to(&maa);
        assert!((d - 290_000.0).abs() < 5_000.0, "got {d}");

        assert_eq!(blr.distance_to(&blr), 0.0);
    }

    #[test]
    fn antipodal_distance_is_half_circumference() {
        let d = coord(0.0, 0.0).distance_to(&coord(0.0, 180.0));
        let half = std::f64::consts::PI * EARTH_RADIUS_METERS;
        assert!((d - half).abs() < 1.0);
    }

    #[test]
    fn circle_contains_points_on_and_inside_the_boundary() {
        let circle = Circle {
            center: coord(12.9716, 77.5946),
            radius_meters: 100.0,
        };
        // ~0.0009 degrees of latitude is ~100 m.
        assert!(circle.contains(&coord(12.9720, 77.5946)));
        assert!(!circle.contains(&coord(12.9736, 77.5946)));
        assert!(circle.contains(&circle.center));
    }

    #[test]
    fn nearest_fence_prefers_containing_fence() {
        let point = coord(12.9716, 77.5946);
        let big_far = Circle {
            center: coord(12.9730, 77.5946),
            radius_meters: 500.0,
        };
        let small_near = Circle {
            center: coord(12.9717, 77.5946),
            radius_meters: 20.0,
        };
        let outside_near = Circle {
            center: coord(12.97165, 77.5946),
            radius_meters: 1.0,
        };

        let m = nearest_fence(&point, [("big", big_far), ("small", small_near)]).unwrap();
        assert_eq!(m.key, "small");
        assert!(m.inside);

        let m = nearest_fence(&point, [("big", big_far), ("outside", outside_near)]).unwrap();
        assert_eq!(m.key, "big");
        assert!(m.inside);
    }

    #[test]
    fn nearest_fence_reports_closest_when_outside_all() {
        let point = coord(0.0, 0.0);
        let a = Circle {
            center: coord(0.01, 0.0),
            radius_meters: 10.0,
        };
        let b = Circle {
            center: coord(0.02, 0.0),
            radius_meters: 10.0,
        };
        let m = nearest_fence(&point, [(1, b), (2, a)]).unwrap();
        assert_eq!(m.key, 2);
        assert!(!m.inside);
        assert!((m.distance_meters - 1_112.0).abs() < 5.0);

        assert!(nearest_fence::<u8>(&point, []).is_none());
    }

    #[test]
    fn radius_validation_and_slider_snapping() {
        assert!(validate_radius(10.0).is_ok());
        assert!(validate_radius(500.0).is_ok());
        assert_eq!(validate_radius(9.9), Err(CoordinateError::Radius(9.9)));
        assert!(validate_radius(501.0).is_err());

        assert_eq!(snap_radius(3.0), 10.0);
        assert_eq!(snap_radius(10_000.0), 500.0);
        assert_eq!(snap_radius(44.0), 40.0);
        assert_eq!(snap_radius(45.0), 50.0);
        assert_eq!(snap_radius(f64::NAN), 10.0);
    }

    #[test]
    fn accuracy_must_be_non_negative() {
        assert_eq!(validate_accuracy(0.0), Ok(0.0));
        assert!(validate_accuracy(-1.0).is_err());
        assert!(validate_accuracy(f64::INFINITY).is_err());
    }

    #[test]
    fn viewport_maps_pixels_linearly() {
        let viewport = MapViewport {
            center: coord(12.0, 77.0),
            width_px: 400,
            height_px: 300,
            degrees_per_pixel: 0.0001,
        };
        assert_eq!(viewport.point_at(200.0, 150.0), coord(12.0, 77.0));

        let p = viewport.point_at(300.0, 50.0);
        assert!((p.latitude - 12.01).abs() < 1e-9);
        assert!((p.longitude - 77.01).abs() < 1e-9);
    }

    #[test]
    fn viewport_wraps_longitude_and_clamps_latitude() {
        let viewport = MapViewport {
            center: coord(89.99, 179.99),
            width_px: 100,
            height_px: 100,
            degrees_per_pixel: 0.01,
        };
        let p = viewport.point_at(100.0, 0.0);
        assert_eq!(p.latitude, 90.0);
        assert!((p.longitude - (-179.51)).abs() < 1e-9);
    }

    #[test]
    fn viewport_wraps_longitude_past_several_turns() {
        let viewport = MapViewport {
            center: coord(0.0, 0.0),
            width_px: 2000,
            height_px: 10,
            degrees_per_pixel: 1.0,
        };
        let east = viewport.point_at(2000.0, 5.0);
        assert!((east.longitude - (-80.0)).abs() < 1e-9);
        let west = viewport.point_at(0.0, 5.0);
        assert!((west.longitude - 80.0).abs() < 1e-9);
        assert!(Coordinate::new(east.latitude, east.longitude).is_ok());
    }
}
