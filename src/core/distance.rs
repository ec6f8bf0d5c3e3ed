use geo::{HaversineDistance, Point};

use crate::models::GeoPoint;

/// Distances are reported at decimeter resolution so every tier rounds identically
const STEPS_PER_METER: f64 = 10.0;

/// Great-circle distance in meters between two points
///
/// This is the single distance function used by every engine tier. Store-native
/// distances (PostGIS geography, Redis geo) only select candidates; the reported
/// `distanceMeters` and the tie-break ordering always come from here.
#[inline]
pub fn distance_meters(from: GeoPoint, to: GeoPoint) -> f64 {
    let a = Point::new(from.lng, from.lat);
    let b = Point::new(to.lng, to.lat);
    round_distance(a.haversine_distance(&b))
}

#[inline]
pub fn round_distance(meters: f64) -> f64 {
    (meters * STEPS_PER_METER).round() / STEPS_PER_METER
}

/// Convert kilometers to meters
#[inline]
pub fn km_to_meters(km: f64) -> f64 {
    km * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_london_paris() {
        let london = GeoPoint::new(51.5074, -0.1278);
        let paris = GeoPoint::new(48.8566, 2.3522);

        let distance = distance_meters(london, paris);
        assert!(
            (distance - 344_000.0).abs() < 10_000.0,
            "Distance should be ~344km, got {}",
            distance
        );
    }

    #[test]
    fn test_distance_is_symmetric_and_zero_at_origin() {
        let a = GeoPoint::new(19.4326, -99.1332);
        let b = GeoPoint::new(19.4500, -99.1000);
        assert_eq!(distance_meters(a, b), distance_meters(b, a));
        assert_eq!(distance_meters(a, a), 0.0);
    }

    #[test]
    fn test_distance_monotonic_along_meridian() {
        let origin = GeoPoint::new(0.0, 0.0);
        let near = distance_meters(origin, GeoPoint::new(0.01, 0.0));
        let far = distance_meters(origin, GeoPoint::new(0.02, 0.0));
        assert!(near < far);
    }

    #[test]
    fn test_rounding_resolution() {
        let rounded = round_distance(1234.5678);
        assert!((rounded - 1234.6).abs() < 1e-9);
    }
}
