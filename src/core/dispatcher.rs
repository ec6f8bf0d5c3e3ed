use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use thiserror::Error;

use crate::core::engine::{elapsed_ms, Engine, PrimaryMatcher, SecondaryMatcher, TertiaryMatcher};
use crate::models::{EngineError, MatchQuery, MatchResult};

/// A query that no tier could ever answer; rejected before any engine runs
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("category must not be empty")]
    EmptyCategory,

    #[error("category must not have surrounding whitespace")]
    PaddedCategory,

    #[error("category exceeds {max} characters")]
    CategoryTooLong { max: usize },

    #[error("location ({lat}, {lng}) is not a valid coordinate")]
    InvalidLocation { lat: f64, lng: f64 },

    #[error("radius must be a positive number of meters, got {0}")]
    InvalidRadius(f64),

    #[error("radius {radius_meters}m exceeds the maximum of {max_meters}m")]
    RadiusTooLarge { radius_meters: f64, max_meters: f64 },

    #[error("limit must be between 1 and {max}, got {limit}")]
    InvalidLimit { limit: usize, max: usize },
}

/// Bounds applied to every query at the dispatcher boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryLimits {
    pub max_radius_meters: f64,
    pub max_limit: usize,
    pub max_category_len: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_radius_meters: 500_000.0,
            max_limit: 100,
            max_category_len: 64,
        }
    }
}

impl QueryLimits {
    pub fn validate(&self, query: &MatchQuery) -> Result<(), QueryError> {
        let category = query.category.trim();
        if category.is_empty() {
            return Err(QueryError::EmptyCategory);
        }
        // Matching compares categories exactly
        if category.len() != query.category.len() {
            return Err(QueryError::PaddedCategory);
        }
        if category.chars().count() > self.max_category_len {
            return Err(QueryError::CategoryTooLong {
                max: self.max_category_len,
            });
        }
        if !query.location.is_valid() {
            return Err(QueryError::InvalidLocation {
                lat: query.location.lat,
                lng: query.location.lng,
            });
        }
        if !query.radius_meters.is_finite() || query.radius_meters <= 0.0 {
            return Err(QueryError::InvalidRadius(query.radius_meters));
        }
        if query.radius_meters > self.max_radius_meters {
            return Err(QueryError::RadiusTooLarge {
                radius_meters: query.radius_meters,
                max_meters: self.max_radius_meters,
            });
        }
        if query.limit == 0 || query.limit > self.max_limit {
            return Err(QueryError::InvalidLimit {
                limit: query.limit,
                max: self.max_limit,
            });
        }
        Ok(())
    }
}

/// Single entry point for matching; encodes the cascade policy
///
/// Tiers run strictly in order, one at a time. The first non-empty result wins;
/// the tertiary result is returned whatever it contains.
pub struct MatchingDispatcher {
    cascade: [Engine; 3],
    limits: QueryLimits,
}

impl MatchingDispatcher {
    pub fn new(primary: PrimaryMatcher, secondary: SecondaryMatcher, tertiary: TertiaryMatcher) -> Self {
        Self {
            cascade: [primary.into(), secondary.into(), tertiary.into()],
            limits: QueryLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    /// Match a query against the tiers
    ///
    /// Only a malformed query is an error. Everything else, including every
    /// tier failing, resolves to a well-formed [`MatchResult`] whose latency is
    /// the sum over the tiers actually invoked.
    #[tracing::instrument(skip_all, fields(category = %query.category, radius_m = query.radius_meters))]
    pub async fn match_signal(&self, query: &MatchQuery) -> Result<MatchResult, QueryError> {
        self.limits.validate(query)?;

        let [primary, secondary, tertiary] = &self.cascade;
        let mut attempts = Vec::with_capacity(self.cascade.len());
        let mut total_latency = 0u64;

        for engine in [primary, secondary] {
            if matches!(engine, Engine::Secondary(_)) {
                tracing::info!("Falling back to secondary engine");
            }

            let mut result = run_tier(engine, query).await;
            total_latency += result.latency_ms;
            attempts.push(result.attempt());

            if !result.is_empty() {
                result.latency_ms = total_latency;
                result.attempts = attempts;
                return Ok(result);
            }
        }

        tracing::warn!("Primary and secondary engines empty, falling back to tertiary engine");
        let mut result = run_tier(tertiary, query).await;
        total_latency += result.latency_ms;
        attempts.push(result.attempt());

        result.latency_ms = total_latency;
        result.attempts = attempts;
        Ok(result)
    }
}

/// Run one tier, turning a panic inside it into an empty failed result
async fn run_tier(engine: &Engine, query: &MatchQuery) -> MatchResult {
    let start = Instant::now();
    match AssertUnwindSafe(engine.find_matches(query)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(engine = %engine.tier(), error = %message, "Engine panicked, treating as empty");
            MatchResult::failed(
                engine.tier(),
                EngineError::Unexpected {
                    engine: engine.tier(),
                    message,
                },
                elapsed_ms(start),
            )
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;

    fn query() -> MatchQuery {
        MatchQuery::new("agriculture", GeoPoint::new(19.4326, -99.1332), 10_000.0)
    }

    #[test]
    fn test_valid_query_passes() {
        assert!(QueryLimits::default().validate(&query()).is_ok());
    }

    #[test]
    fn test_rejects_malformed_queries() {
        let limits = QueryLimits::default();

        let mut q = query();
        q.category = "   ".to_string();
        assert_eq!(limits.validate(&q), Err(QueryError::EmptyCategory));

        let mut q = query();
        q.category = " agriculture".to_string();
        assert_eq!(limits.validate(&q), Err(QueryError::PaddedCategory));

        let mut q = query();
        q.category = "x".repeat(65);
        assert!(matches!(limits.validate(&q), Err(QueryError::CategoryTooLong { .. })));

        let mut q = query();
        q.location = GeoPoint::new(95.0, 0.0);
        assert!(matches!(limits.validate(&q), Err(QueryError::InvalidLocation { .. })));

        let mut q = query();
        q.radius_meters = 0.0;
        assert!(matches!(limits.validate(&q), Err(QueryError::InvalidRadius(_))));

        let mut q = query();
        q.radius_meters = f64::INFINITY;
        assert!(matches!(limits.validate(&q), Err(QueryError::InvalidRadius(_))));

        let mut q = query();
        q.radius_meters = 600_000.0;
        assert!(matches!(limits.validate(&q), Err(QueryError::RadiusTooLarge { .. })));

        let q = query().with_limit(0);
        assert!(matches!(limits.validate(&q), Err(QueryError::InvalidLimit { .. })));
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("tier exploded");
        assert_eq!(panic_message(boxed.as_ref()), "tier exploded");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
    }
}
