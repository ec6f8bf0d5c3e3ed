use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::distance::km_to_meters;
use crate::models::domain::{GeoPoint, MatchQuery};

/// Request to match nearby signals
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MatchSignalRequest {
    #[validate(length(min = 1, max = 64))]
    pub category: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
    #[serde(default, alias = "radius_km", rename = "radiusKm")]
    #[validate(range(exclusive_min = 0.0))]
    pub radius_km: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub limit: Option<u16>,
}

impl MatchSignalRequest {
    /// Build a query, converting kilometers to meters and filling defaults
    pub fn to_query(&self, default_radius_km: f64, default_limit: usize) -> MatchQuery {
        let radius_km = self.radius_km.unwrap_or(default_radius_km);
        let limit = self.limit.map(usize::from).unwrap_or(default_limit);

        MatchQuery::new(
            self.category.trim(),
            GeoPoint::new(self.lat, self.lng),
            km_to_meters(radius_km),
        )
        .with_limit(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_defaults_and_conversion() {
        let req: MatchSignalRequest = serde_json::from_str(
            r#"{"category":"agriculture","lat":19.43,"lng":-99.13}"#,
        )
        .unwrap();
        let query = req.to_query(50.0, 10);
        assert_eq!(query.radius_meters, 50_000.0);
        assert_eq!(query.limit, 10);

        let req: MatchSignalRequest = serde_json::from_str(
            r#"{"category":"agriculture","lat":19.43,"lng":-99.13,"radiusKm":2.5,"limit":3}"#,
        )
        .unwrap();
        let query = req.to_query(50.0, 10);
        assert_eq!(query.radius_meters, 2_500.0);
        assert_eq!(query.limit, 3);
    }

    #[test]
    fn test_validation_rejects_bad_coordinates() {
        let req = MatchSignalRequest {
            category: "water".to_string(),
            lat: 120.0,
            lng: 0.0,
            radius_km: None,
            limit: None,
        };
        assert!(req.validate().is_err());
    }
}
