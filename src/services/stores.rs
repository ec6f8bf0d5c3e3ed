//! Contracts the engines expect from their backing stores.
//!
//! The production clients live next to this module; tests substitute
//! in-memory implementations.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{GeoPoint, MatchQuery, Signal};

/// Errors that can occur when talking to any backing store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store returned error: {0}")]
    Api(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// One hit from a geo-radius lookup
#[derive(Debug, Clone, PartialEq)]
pub struct GeoHit {
    pub id: String,
    /// Distance as reported by the index itself; used for candidate
    /// selection and logging only, never for ranking
    pub distance_meters: f64,
}

/// Durable, consistent geospatial store (primary tier)
#[async_trait]
pub trait SpatialStore: Send + Sync {
    /// Active signals of `query.category` within `query.radius_meters`,
    /// highest priority first
    async fn signals_within(&self, query: &MatchQuery) -> Result<Vec<Signal>, StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError>;
}

/// Distributed in-memory geo-index (secondary tier)
#[async_trait]
pub trait GeoIndex: Send + Sync {
    /// Nearest members within `radius_meters`, ascending by distance, at most `count`
    async fn radius_search(
        &self,
        center: GeoPoint,
        radius_meters: f64,
        count: usize,
    ) -> Result<Vec<GeoHit>, StoreError>;

    /// Stored records for `ids` in one round trip; positions line up with `ids`
    async fn fetch_signals(&self, ids: &[String]) -> Result<Vec<Option<Signal>>, StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError>;
}

/// Durable append-only log with a best-effort lookup (tertiary tier)
#[async_trait]
pub trait SignalLog: Send + Sync {
    async fn lookup(
        &self,
        category: &str,
        center: GeoPoint,
        radius_meters: f64,
        limit: usize,
    ) -> Result<Vec<Signal>, StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError>;
}
