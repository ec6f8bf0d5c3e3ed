// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    EngineError, EngineTier, GeoPoint, MatchQuery, MatchResult, Signal, SignalMatch, SignalStatus,
    TierAttempt,
};
pub use requests::MatchSignalRequest;
pub use responses::{ErrorResponse, HealthResponse, MatchSignalResponse};
