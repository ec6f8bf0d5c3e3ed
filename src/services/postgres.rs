use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;

use crate::config::DatabaseSettings;
use crate::models::{GeoPoint, MatchQuery, Signal, SignalStatus};
use crate::services::stores::{SpatialStore, StoreError};

/// Rows fetched per requested match, so client-side re-ranking has headroom
/// when PostGIS and haversine disagree slightly at the radius edge
const CANDIDATE_OVERFETCH: usize = 2;

const SIGNALS_WITHIN: &str = r#"
    SELECT
        id,
        category,
        ST_Y(location::geometry) AS lat,
        ST_X(location::geometry) AS lng,
        priority,
        status,
        created_at,
        updated_at
    FROM signals
    WHERE category = $1
      AND status = 'active'
      AND ST_DWithin(location, ST_SetSRID(ST_MakePoint($2, $3), 4326)::geography, $4)
    ORDER BY
        priority DESC,
        ST_Distance(location, ST_SetSRID(ST_MakePoint($2, $3), 4326)::geography) ASC
    LIMIT $5
"#;

/// PostGIS-backed signal store for the primary tier
///
/// The pool is created lazily so the service can start (and cascade to the
/// lower tiers) while the database is unreachable.
pub struct PostgresSignalStore {
    pool: PgPool,
}

impl PostgresSignalStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a lazily-connecting pool from settings
    pub fn from_settings(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        tracing::info!(
            max_connections = settings.max_connections.unwrap_or(10),
            "Configuring PostgreSQL pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections.unwrap_or(10))
            .min_connections(settings.min_connections.unwrap_or(0))
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs.unwrap_or(5)))
            .idle_timeout(Duration::from_secs(settings.idle_timeout_secs.unwrap_or(600)))
            .test_before_acquire(true)
            .connect_lazy(&settings.url)?;

        Ok(Self { pool })
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn signal_from_row(row: &PgRow) -> Result<Signal, StoreError> {
    let status: String = row.try_get("status")?;
    let status = SignalStatus::parse(&status)
        .ok_or_else(|| StoreError::InvalidRecord(format!("unknown status '{}'", status)))?;

    Ok(Signal {
        id: row.try_get("id")?,
        category: row.try_get("category")?,
        location: GeoPoint::new(row.try_get("lat")?, row.try_get("lng")?),
        priority: row.try_get("priority")?,
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl SpatialStore for PostgresSignalStore {
    async fn signals_within(&self, query: &MatchQuery) -> Result<Vec<Signal>, StoreError> {
        let candidate_limit = query.limit.saturating_mul(CANDIDATE_OVERFETCH).max(1);

        let rows = sqlx::query(SIGNALS_WITHIN)
            .bind(&query.category)
            .bind(query.location.lng)
            .bind(query.location.lat)
            .bind(query.radius_meters)
            .bind(candidate_limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut signals = Vec::with_capacity(rows.len());
        for row in &rows {
            match signal_from_row(row) {
                Ok(signal) => signals.push(signal),
                Err(e) => tracing::warn!("Skipping malformed signal row: {}", e),
            }
        }

        tracing::debug!(
            category = %query.category,
            rows = rows.len(),
            "PostGIS returned candidate signals"
        );

        Ok(signals)
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}
