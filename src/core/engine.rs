//! The three matching engines.
//!
//! Every engine follows the same contract: `find_matches` always resolves to a
//! [`MatchResult`]. Store failures, timeouts and open breakers are folded into
//! the result instead of being returned as errors.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::breaker::{BreakerError, BreakerRegistry};
use crate::core::distance::distance_meters;
use crate::core::ranking::rank_matches;
use crate::models::{EngineError, EngineTier, MatchQuery, MatchResult, Signal};
use crate::services::stores::{GeoIndex, SignalLog, SpatialStore, StoreError};

/// Candidates pulled from the geo-index before client-side re-ranking
pub const DEFAULT_SECONDARY_CANDIDATES: usize = 10;

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Run one store call under the tier's breaker and timeout
///
/// `Ok(None)` means the breaker short-circuited the call.
async fn guarded_call<T, F, Fut>(
    breakers: &BreakerRegistry,
    tier: EngineTier,
    timeout: Duration,
    call: F,
) -> Result<Option<T>, EngineError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let breaker = breakers.get_or_create(tier.breaker_name());

    let outcome = breaker
        .execute(|| async move {
            match tokio::time::timeout(timeout, call()).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(EngineError::Store {
                    engine: tier,
                    message: e.to_string(),
                }),
                Err(_) => Err(EngineError::Timeout {
                    engine: tier,
                    timeout_ms: timeout.as_millis() as u64,
                }),
            }
        })
        .await;

    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(BreakerError::Open { .. }) => Ok(None),
        Err(BreakerError::Inner(e)) => Err(e),
    }
}

/// Primary tier: one spatial query against the durable geospatial store
pub struct PrimaryMatcher {
    store: Arc<dyn SpatialStore>,
    breakers: Arc<BreakerRegistry>,
    timeout: Duration,
}

impl PrimaryMatcher {
    pub fn new(store: Arc<dyn SpatialStore>, breakers: Arc<BreakerRegistry>, timeout: Duration) -> Self {
        breakers.get_or_create(EngineTier::Primary.breaker_name());
        Self {
            store,
            breakers,
            timeout,
        }
    }

    pub async fn find_matches(&self, query: &MatchQuery) -> MatchResult {
        let tier = EngineTier::Primary;
        let start = Instant::now();
        tracing::info!(engine = %tier, category = %query.category, "Engine starting");

        let outcome = guarded_call(&self.breakers, tier, self.timeout, || {
            self.store.signals_within(query)
        })
        .await;
        let latency = elapsed_ms(start);

        match outcome {
            Ok(Some(signals)) => {
                let matches = rank_matches(query, signals);
                tracing::info!(engine = %tier, matches = matches.len(), latency_ms = latency, "Engine finished");
                MatchResult::found(tier, matches, latency)
            }
            Ok(None) => MatchResult::skipped(tier, latency),
            Err(e) => {
                tracing::error!(engine = %tier, error = %e, "Engine failed");
                MatchResult::failed(tier, e, latency)
            }
        }
    }
}

/// Secondary tier: geo-radius lookup plus one batched record fetch
pub struct SecondaryMatcher {
    index: Arc<dyn GeoIndex>,
    breakers: Arc<BreakerRegistry>,
    timeout: Duration,
    candidates: usize,
}

impl SecondaryMatcher {
    pub fn new(index: Arc<dyn GeoIndex>, breakers: Arc<BreakerRegistry>, timeout: Duration) -> Self {
        breakers.get_or_create(EngineTier::Secondary.breaker_name());
        Self {
            index,
            breakers,
            timeout,
            candidates: DEFAULT_SECONDARY_CANDIDATES,
        }
    }

    pub fn with_candidates(mut self, candidates: usize) -> Self {
        self.candidates = candidates.max(1);
        self
    }

    pub async fn find_matches(&self, query: &MatchQuery) -> MatchResult {
        let tier = EngineTier::Secondary;
        let start = Instant::now();
        tracing::info!(engine = %tier, category = %query.category, "Engine starting");

        let index = &self.index;
        let candidates = self.candidates;
        let outcome = guarded_call(&self.breakers, tier, self.timeout, || async move {
            let hits = index
                .radius_search(query.location, query.radius_meters, candidates)
                .await?;
            if hits.is_empty() {
                return Ok::<Vec<Signal>, StoreError>(Vec::new());
            }

            let ids: Vec<String> = hits.iter().map(|hit| hit.id.clone()).collect();
            let records = index.fetch_signals(&ids).await?;
            tracing::debug!(engine = %tier, hits = hits.len(), "Fetched indexed records");

            let mut signals: Vec<Signal> = Vec::with_capacity(hits.len());
            for (hit, record) in hits.iter().zip(records) {
                match record {
                    Some(signal) => {
                        tracing::trace!(
                            id = %hit.id,
                            index_distance_m = hit.distance_meters,
                            shared_distance_m = distance_meters(query.location, signal.location),
                            "Indexed distance drift"
                        );
                        signals.push(signal);
                    }
                    None => tracing::warn!(
                        engine = %tier,
                        id = %hit.id,
                        index_distance_m = hit.distance_meters,
                        "Indexed signal has no usable record, dropping"
                    ),
                }
            }
            Ok(signals)
        })
        .await;
        let latency = elapsed_ms(start);

        match outcome {
            Ok(Some(signals)) => {
                let matches = rank_matches(query, signals);
                tracing::info!(engine = %tier, matches = matches.len(), latency_ms = latency, "Engine finished");
                MatchResult::found(tier, matches, latency)
            }
            Ok(None) => MatchResult::skipped(tier, latency),
            Err(e) => {
                tracing::warn!(engine = %tier, error = %e, "Engine failed or not configured");
                MatchResult::failed(tier, e, latency)
            }
        }
    }
}

/// Tertiary tier: best-effort lookup against the durable log
///
/// Results from this tier are always marked degraded. Without a configured
/// log the tier answers with an empty degraded result.
pub struct TertiaryMatcher {
    log: Option<Arc<dyn SignalLog>>,
    breakers: Arc<BreakerRegistry>,
    timeout: Duration,
}

impl TertiaryMatcher {
    pub fn new(log: Option<Arc<dyn SignalLog>>, breakers: Arc<BreakerRegistry>, timeout: Duration) -> Self {
        breakers.get_or_create(EngineTier::Tertiary.breaker_name());
        Self {
            log,
            breakers,
            timeout,
        }
    }

    pub async fn find_matches(&self, query: &MatchQuery) -> MatchResult {
        let tier = EngineTier::Tertiary;
        let start = Instant::now();

        let Some(log) = &self.log else {
            tracing::warn!(engine = %tier, "No signal log configured, returning degraded empty result");
            return MatchResult::skipped(tier, elapsed_ms(start));
        };

        tracing::info!(engine = %tier, category = %query.category, "Engine starting");
        let outcome = guarded_call(&self.breakers, tier, self.timeout, || {
            log.lookup(&query.category, query.location, query.radius_meters, query.limit)
        })
        .await;
        let latency = elapsed_ms(start);

        let mut result = match outcome {
            Ok(Some(signals)) => MatchResult::found(tier, rank_matches(query, signals), latency),
            Ok(None) => MatchResult::skipped(tier, latency),
            Err(e) => {
                tracing::error!(engine = %tier, error = %e, "Engine failed");
                MatchResult::failed(tier, e, latency)
            }
        };
        result.degraded = true;

        tracing::info!(engine = %tier, matches = result.matches.len(), latency_ms = latency, "Engine finished");
        result
    }
}

/// The closed set of matching engines
pub enum Engine {
    Primary(PrimaryMatcher),
    Secondary(SecondaryMatcher),
    Tertiary(TertiaryMatcher),
}

impl Engine {
    pub fn tier(&self) -> EngineTier {
        match self {
            Engine::Primary(_) => EngineTier::Primary,
            Engine::Secondary(_) => EngineTier::Secondary,
            Engine::Tertiary(_) => EngineTier::Tertiary,
        }
    }

    pub async fn find_matches(&self, query: &MatchQuery) -> MatchResult {
        match self {
            Engine::Primary(m) => m.find_matches(query).await,
            Engine::Secondary(m) => m.find_matches(query).await,
            Engine::Tertiary(m) => m.find_matches(query).await,
        }
    }
}

impl From<PrimaryMatcher> for Engine {
    fn from(m: PrimaryMatcher) -> Self {
        Engine::Primary(m)
    }
}

impl From<SecondaryMatcher> for Engine {
    fn from(m: SecondaryMatcher) -> Self {
        Engine::Secondary(m)
    }
}

impl From<TertiaryMatcher> for Engine {
    fn from(m: TertiaryMatcher) -> Self {
        Engine::Tertiary(m)
    }
}
