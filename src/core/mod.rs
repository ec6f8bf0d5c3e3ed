// Core algorithm exports
pub mod breaker;
pub mod dispatcher;
pub mod distance;
pub mod engine;
pub mod ranking;

pub use breaker::{BreakerConfig, BreakerError, BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitState, StateTransition};
pub use dispatcher::{MatchingDispatcher, QueryError, QueryLimits};
pub use distance::{distance_meters, km_to_meters};
pub use engine::{Engine, PrimaryMatcher, SecondaryMatcher, TertiaryMatcher};
pub use ranking::{compare_matches, is_ranked, rank_matches};
