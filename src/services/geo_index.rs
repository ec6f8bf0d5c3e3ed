use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::config::CacheSettings;
use crate::models::{GeoPoint, Signal, SignalStatus};
use crate::services::stores::{GeoHit, GeoIndex, StoreError};

/// Redis key builder for the geo-index layout
pub struct GeoKey;

impl GeoKey {
    /// Sorted geo set holding every indexed signal id
    pub fn index() -> &'static str {
        "signals:geo"
    }

    /// Hash holding one signal's stored fields
    pub fn signal(id: &str) -> String {
        format!("signal:{}", id)
    }
}

/// Redis geo-index for the secondary tier
///
/// Radius lookups go through `GEOSEARCH`; record fetches are pipelined into a
/// single round trip, with a short-lived L1 cache in front so hot records skip
/// Redis entirely. The connection is established on first use.
pub struct RedisGeoIndex {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    l1_cache: moka::future::Cache<String, Signal>,
}

impl RedisGeoIndex {
    pub fn new(redis_url: &str, l1_size: u64, l1_ttl: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let l1_cache = moka::future::CacheBuilder::new(l1_size)
            .time_to_live(l1_ttl)
            .build();

        Ok(Self {
            client,
            connection: OnceCell::new(),
            l1_cache,
        })
    }

    pub fn from_settings(settings: &CacheSettings) -> Result<Self, StoreError> {
        Self::new(
            &settings.redis_url,
            settings.l1_cache_size.unwrap_or(1000),
            Duration::from_secs(settings.ttl_secs.unwrap_or(30)),
        )
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                tracing::info!("Connecting to Redis geo-index");
                ConnectionManager::new(self.client.clone()).await
            })
            .await?;
        Ok(manager.clone())
    }
}

fn field<'a>(hash: &'a HashMap<String, String>, name: &str) -> Result<&'a str, StoreError> {
    hash.get(name)
        .map(String::as_str)
        .ok_or_else(|| StoreError::InvalidRecord(format!("missing field '{}'", name)))
}

fn parse_number<T: std::str::FromStr>(hash: &HashMap<String, String>, name: &str) -> Result<T, StoreError> {
    field(hash, name)?
        .trim()
        .parse()
        .map_err(|_| StoreError::InvalidRecord(format!("field '{}' is not numeric", name)))
}

fn parse_timestamp(hash: &HashMap<String, String>, name: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    hash.get(name)
        .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&chrono::Utc))
}

/// Decode a `signal:{id}` hash; an empty hash means the key does not exist
pub fn signal_from_hash(id: &str, hash: &HashMap<String, String>) -> Result<Option<Signal>, StoreError> {
    if hash.is_empty() {
        return Ok(None);
    }

    let status_raw = field(hash, "status")?;
    let status = SignalStatus::parse(status_raw)
        .ok_or_else(|| StoreError::InvalidRecord(format!("unknown status '{}'", status_raw)))?;

    Ok(Some(Signal {
        id: hash.get("id").cloned().unwrap_or_else(|| id.to_string()),
        category: field(hash, "category")?.to_string(),
        location: GeoPoint::new(parse_number(hash, "lat")?, parse_number(hash, "lng")?),
        priority: parse_number(hash, "priority")?,
        status,
        created_at: parse_timestamp(hash, "createdAt"),
        updated_at: parse_timestamp(hash, "updatedAt"),
    }))
}

#[async_trait]
impl GeoIndex for RedisGeoIndex {
    async fn radius_search(
        &self,
        center: GeoPoint,
        radius_meters: f64,
        count: usize,
    ) -> Result<Vec<GeoHit>, StoreError> {
        let mut conn = self.connection().await?;

        let hits: Vec<(String, f64)> = redis::cmd("GEOSEARCH")
            .arg(GeoKey::index())
            .arg("FROMLONLAT")
            .arg(center.lng)
            .arg(center.lat)
            .arg("BYRADIUS")
            .arg(radius_meters)
            .arg("m")
            .arg("ASC")
            .arg("COUNT")
            .arg(count)
            .arg("WITHDIST")
            .query_async(&mut conn)
            .await?;

        tracing::trace!(hits = hits.len(), "GEOSEARCH complete");

        Ok(hits
            .into_iter()
            .map(|(id, distance_meters)| GeoHit { id, distance_meters })
            .collect())
    }

    async fn fetch_signals(&self, ids: &[String]) -> Result<Vec<Option<Signal>>, StoreError> {
        let mut found: Vec<Option<Signal>> = Vec::with_capacity(ids.len());
        let mut misses: Vec<usize> = Vec::new();

        for (idx, id) in ids.iter().enumerate() {
            let cached = self.l1_cache.get(id).await;
            if cached.is_none() {
                misses.push(idx);
            }
            found.push(cached);
        }

        if misses.is_empty() {
            tracing::trace!("L1 cache served all {} records", ids.len());
            return Ok(found);
        }

        let mut pipe = redis::pipe();
        for &idx in &misses {
            pipe.cmd("HGETALL").arg(GeoKey::signal(&ids[idx]));
        }

        let mut conn = self.connection().await?;
        let hashes: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        for (&idx, hash) in misses.iter().zip(hashes.iter()) {
            match signal_from_hash(&ids[idx], hash) {
                Ok(Some(signal)) => {
                    self.l1_cache.insert(ids[idx].clone(), signal.clone()).await;
                    found[idx] = Some(signal);
                }
                Ok(None) => tracing::debug!("Indexed signal {} has no record", ids[idx]),
                Err(e) => tracing::warn!("Dropping malformed record for {}: {}", ids[idx], e),
            }
        }

        Ok(found)
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_key_builder() {
        assert_eq!(GeoKey::index(), "signals:geo");
        assert_eq!(GeoKey::signal("abc"), "signal:abc");
    }

    #[test]
    fn test_signal_from_hash() {
        let record = hash(&[
            ("category", "agriculture"),
            ("lat", "19.4326"),
            ("lng", "-99.1332"),
            ("priority", "5"),
            ("status", "active"),
            ("createdAt", "2024-03-01T10:00:00Z"),
        ]);

        let signal = signal_from_hash("s1", &record).unwrap().unwrap();
        assert_eq!(signal.id, "s1");
        assert_eq!(signal.priority, 5);
        assert_eq!(signal.status, SignalStatus::Active);
        assert!(signal.created_at.is_some());
        assert!(signal.updated_at.is_none());
    }

    #[test]
    fn test_missing_and_malformed_hashes() {
        assert!(signal_from_hash("gone", &HashMap::new()).unwrap().is_none());

        let bad = hash(&[
            ("category", "agriculture"),
            ("lat", "north"),
            ("lng", "-99.1"),
            ("priority", "1"),
            ("status", "active"),
        ]);
        assert!(signal_from_hash("bad", &bad).is_err());
    }

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_radius_search_against_redis() {
        let index = RedisGeoIndex::new("redis://127.0.0.1:6379", 100, Duration::from_secs(5))
            .expect("Failed to create index");
        let hits = index
            .radius_search(GeoPoint::new(19.4326, -99.1332), 1000.0, 10)
            .await
            .unwrap();
        assert!(hits.len() <= 10);
    }
}
