//! Signal Match - cascading geospatial matcher for location-based signals
//!
//! Queries a PostGIS store first, falls back to a Redis geo-index, and finally
//! to a durable signal log. Each tier's store call runs behind a circuit
//! breaker and a per-call timeout, and every tier ranks with the same
//! distance function and ordering.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{
    distance_meters, rank_matches, BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState,
    MatchingDispatcher, PrimaryMatcher, QueryError, SecondaryMatcher, TertiaryMatcher,
};
pub use models::{EngineTier, GeoPoint, MatchQuery, MatchResult, Signal, SignalMatch, SignalStatus};
