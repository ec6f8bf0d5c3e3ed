use serde::{Deserialize, Serialize};
use std::fmt;

/// A geographic point in degrees (WGS84)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both coordinates are finite and inside the WGS84 ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Lifecycle state of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Active,
    Expired,
    Fulfilled,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Active => "active",
            SignalStatus::Expired => "expired",
            SignalStatus::Fulfilled => "fulfilled",
        }
    }

    /// Parse a stored status string; unknown values yield `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(SignalStatus::Active),
            "expired" => Some(SignalStatus::Expired),
            "fulfilled" => Some(SignalStatus::Fulfilled),
            _ => None,
        }
    }
}

/// A geo-located offer or request, read-only to the matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub category: String,
    pub location: GeoPoint,
    pub priority: i32,
    pub status: SignalStatus,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Signal {
    pub fn is_active(&self) -> bool {
        self.status == SignalStatus::Active
    }
}

/// Input to the matcher: what to look for and where
#[derive(Debug, Clone, PartialEq)]
pub struct MatchQuery {
    pub category: String,
    pub location: GeoPoint,
    pub radius_meters: f64,
    pub limit: usize,
}

impl MatchQuery {
    pub const DEFAULT_LIMIT: usize = 10;

    /// Build a query; surrounding whitespace is stripped from the category
    pub fn new(category: impl Into<String>, location: GeoPoint, radius_meters: f64) -> Self {
        let category: String = category.into();
        Self {
            category: category.trim().to_string(),
            location,
            radius_meters,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// One ranked match: the signal and its shared-formula distance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMatch {
    pub signal: Signal,
    #[serde(rename = "distanceMeters")]
    pub distance_meters: f64,
}

/// Which tier produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineTier {
    Primary,
    Secondary,
    Tertiary,
}

impl EngineTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineTier::Primary => "primary",
            EngineTier::Secondary => "secondary",
            EngineTier::Tertiary => "tertiary",
        }
    }

    /// Name of the circuit breaker guarding this tier's store call
    pub fn breaker_name(&self) -> &'static str {
        match self {
            EngineTier::Primary => "engine.primary",
            EngineTier::Secondary => "engine.secondary",
            EngineTier::Tertiary => "engine.tertiary",
        }
    }
}

impl fmt::Display for EngineTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a tier could not complete normally
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("{engine} store call timed out after {timeout_ms}ms")]
    Timeout { engine: EngineTier, timeout_ms: u64 },

    #[error("{engine} store error: {message}")]
    Store { engine: EngineTier, message: String },

    #[error("{engine} engine failed unexpectedly: {message}")]
    Unexpected { engine: EngineTier, message: String },
}

/// Summary of one tier invocation inside a dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierAttempt {
    pub engine: EngineTier,
    #[serde(rename = "latencyMs")]
    pub latency_ms: u64,
    pub matches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output of one engine attempt or of the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matches: Vec<SignalMatch>,
    pub engine: EngineTier,
    pub latency_ms: u64,
    pub degraded: bool,
    pub error: Option<EngineError>,
    pub attempts: Vec<TierAttempt>,
}

impl MatchResult {
    pub fn found(engine: EngineTier, matches: Vec<SignalMatch>, latency_ms: u64) -> Self {
        Self {
            matches,
            engine,
            latency_ms,
            degraded: false,
            error: None,
            attempts: Vec::new(),
        }
    }

    pub fn failed(engine: EngineTier, error: EngineError, latency_ms: u64) -> Self {
        Self {
            matches: Vec::new(),
            engine,
            latency_ms,
            degraded: false,
            error: Some(error),
            attempts: Vec::new(),
        }
    }

    /// Empty result for a tier that was skipped (breaker open, store not configured)
    pub fn skipped(engine: EngineTier, latency_ms: u64) -> Self {
        Self {
            matches: Vec::new(),
            engine,
            latency_ms,
            degraded: true,
            error: None,
            attempts: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn attempt(&self) -> TierAttempt {
        TierAttempt {
            engine: self.engine,
            latency_ms: self.latency_ms,
            matches: self.matches.len(),
            error: self.error.as_ref().map(|e| e.to_string()),
        }
    }
}
