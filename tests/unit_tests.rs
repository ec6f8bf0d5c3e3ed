// Unit tests for Signal Match

use signal_match::core::{
    compare_matches, distance::round_distance, is_ranked, km_to_meters, rank_matches, BreakerConfig, BreakerError,
    BreakerRegistry, CircuitBreaker, CircuitState, QueryLimits, StateTransition,
};
use signal_match::models::{
    EngineError, EngineTier, GeoPoint, MatchQuery, MatchResult, MatchSignalRequest, MatchSignalResponse, Signal,
    SignalMatch, SignalStatus,
};
use signal_match::distance_meters;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use validator::Validate;

fn signal_at(id: &str, lat: f64, lng: f64, priority: i32) -> Signal {
    Signal {
        id: id.to_string(),
        category: "agriculture".to_string(),
        location: GeoPoint::new(lat, lng),
        priority,
        status: SignalStatus::Active,
        created_at: None,
        updated_at: None,
    }
}

fn query_at(lat: f64, lng: f64, radius_meters: f64) -> MatchQuery {
    MatchQuery::new("agriculture", GeoPoint::new(lat, lng), radius_meters)
}

// ---------------------------------------------------------------------------
// Distance
// ---------------------------------------------------------------------------

#[test]
fn test_distance_zero() {
    let p = GeoPoint::new(40.7128, -74.0060);
    assert_eq!(distance_meters(p, p), 0.0);
}

#[test]
fn test_distance_manhattan_to_brooklyn() {
    // Manhattan to Brooklyn is approximately 5-15 km
    let manhattan = GeoPoint::new(40.7580, -73.9855);
    let brooklyn = GeoPoint::new(40.6782, -73.9442);

    let distance = distance_meters(manhattan, brooklyn);
    assert!(distance > 5_000.0 && distance < 15_000.0);
}

#[test]
fn test_distance_one_degree_of_latitude() {
    let distance = distance_meters(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
    assert!((distance - 111_195.0).abs() < 100.0);
}

#[test]
fn test_distance_resolution() {
    assert_eq!(round_distance(1999.96), 2000.0);
    assert_eq!(round_distance(12.34), 12.3);
    assert_eq!(km_to_meters(2.5), 2_500.0);
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

#[test]
fn test_rank_priority_then_distance() {
    let query = query_at(19.4326, -99.1332, 10_000.0);
    let signals = vec![
        signal_at("near-low", 19.4336, -99.1332, 1),
        signal_at("far-high", 19.4726, -99.1332, 8),
        signal_at("near-high", 19.4346, -99.1332, 8),
    ];

    let ranked = rank_matches(&query, signals);
    let ids: Vec<&str> = ranked.iter().map(|m| m.signal.id.as_str()).collect();
    assert_eq!(ids, vec!["near-high", "far-high", "near-low"]);
    assert!(is_ranked(&ranked));
}

#[test]
fn test_rank_drops_out_of_radius_inactive_and_other_categories() {
    let query = query_at(19.4326, -99.1332, 5_000.0);

    let mut expired = signal_at("expired", 19.4330, -99.1332, 9);
    expired.status = SignalStatus::Expired;
    let mut other = signal_at("other", 19.4330, -99.1332, 9);
    other.category = "water".to_string();
    let far = signal_at("far", 19.6, -99.1332, 9);
    let kept = signal_at("kept", 19.4330, -99.1332, 1);

    let ranked = rank_matches(&query, vec![expired, other, far, kept]);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].signal.id, "kept");
}

#[test]
fn test_rank_respects_limit_and_dedupes() {
    let query = query_at(0.0, 0.0, 50_000.0).with_limit(2);
    let signals = vec![
        signal_at("a", 0.01, 0.0, 3),
        signal_at("a", 0.01, 0.0, 3),
        signal_at("b", 0.02, 0.0, 3),
        signal_at("c", 0.03, 0.0, 3),
    ];

    let ranked = rank_matches(&query, signals);
    let ids: Vec<&str> = ranked.iter().map(|m| m.signal.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn test_equal_priority_and_distance_break_ties_by_id() {
    let a = SignalMatch {
        signal: signal_at("a", 0.0, 0.0, 2),
        distance_meters: 100.0,
    };
    let b = SignalMatch {
        signal: signal_at("b", 0.0, 0.0, 2),
        distance_meters: 100.0,
    };
    assert_eq!(compare_matches(&a, &b), std::cmp::Ordering::Less);
    assert!(!is_ranked(&[b, a]));
}

// ---------------------------------------------------------------------------
// Circuit breaker
// ---------------------------------------------------------------------------

fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
    CircuitBreaker::new(
        "test",
        BreakerConfig::default()
            .with_failure_threshold(threshold)
            .with_reset_timeout(Duration::from_millis(reset_ms)),
    )
}

async fn fail(cb: &CircuitBreaker) {
    let _ = cb.execute(|| async { Err::<(), _>("boom") }).await;
}

#[tokio::test]
async fn test_breaker_full_lifecycle() {
    let cb = breaker(3, 50);

    fail(&cb).await;
    fail(&cb).await;
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.failure_count(), 2);

    fail(&cb).await;
    assert_eq!(cb.state(), CircuitState::Open);

    // Open: the operation is never invoked
    let mut invoked = false;
    let result = cb
        .execute(|| {
            invoked = true;
            async { Ok::<_, &str>(1) }
        })
        .await;
    assert!(matches!(result, Err(BreakerError::Open { .. })));
    assert!(!invoked);

    tokio::time::sleep(Duration::from_millis(80)).await;

    // First call after the timeout is the half-open trial
    let result = cb.execute(|| async { Ok::<_, &str>(7) }).await;
    assert_eq!(result.unwrap(), 7);
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.failure_count(), 0);
}

#[tokio::test]
async fn test_breaker_failed_trial_reopens() {
    let cb = breaker(3, 50);
    for _ in 0..3 {
        fail(&cb).await;
    }
    tokio::time::sleep(Duration::from_millis(80)).await;

    fail(&cb).await;
    assert_eq!(cb.state(), CircuitState::Open);

    let result = cb.execute(|| async { Ok::<_, &str>(()) }).await;
    assert!(matches!(result, Err(BreakerError::Open { .. })));
}

#[tokio::test]
async fn test_breaker_success_resets_failure_count() {
    let cb = breaker(3, 50);
    fail(&cb).await;
    fail(&cb).await;

    cb.execute(|| async { Ok::<_, &str>(()) }).await.unwrap();
    assert_eq!(cb.failure_count(), 0);

    fail(&cb).await;
    fail(&cb).await;
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_breaker_fallback_when_open() {
    let cb = breaker(1, 60_000);
    fail(&cb).await;
    assert_eq!(cb.state(), CircuitState::Open);

    let value = cb
        .execute_with_fallback(|| async { Ok::<_, &str>("live") }, || async { "fallback" })
        .await;
    assert_eq!(value, "fallback");
}

#[tokio::test]
async fn test_registry_shares_breakers_and_reports_transitions() {
    let seen: Arc<Mutex<Vec<StateTransition>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let registry = BreakerRegistry::new(BreakerConfig::default().with_failure_threshold(3))
        .with_state_change_hook(Arc::new(move |t: &StateTransition| sink.lock().unwrap().push(t.clone())));

    let a = registry.get_or_create("engine.primary");
    let b = registry.get_or_create("engine.primary");
    assert!(Arc::ptr_eq(&a, &b));

    for _ in 0..3 {
        fail(&a).await;
    }
    assert_eq!(b.state(), CircuitState::Open);

    let transitions = seen.lock().unwrap();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].from, CircuitState::Closed);
    assert_eq!(transitions[0].to, CircuitState::Open);
    assert_eq!(transitions[0].name, "engine.primary");

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].state, CircuitState::Open);
    assert!(snapshot[0].last_failure_at.is_some());
}

// ---------------------------------------------------------------------------
// Requests, validation and responses
// ---------------------------------------------------------------------------

#[test]
fn test_request_validation() {
    let valid = MatchSignalRequest {
        category: "agriculture".to_string(),
        lat: 19.4326,
        lng: -99.1332,
        radius_km: Some(10.0),
        limit: Some(5),
    };
    assert!(valid.validate().is_ok());

    let mut zero_radius = valid.clone();
    zero_radius.radius_km = Some(0.0);
    assert!(zero_radius.validate().is_err());

    let mut zero_limit = valid.clone();
    zero_limit.limit = Some(0);
    assert!(zero_limit.validate().is_err());
}

#[test]
fn test_query_limits_from_request() {
    let req = MatchSignalRequest {
        category: "  agriculture ".to_string(),
        lat: 19.4326,
        lng: -99.1332,
        radius_km: Some(600.0),
        limit: None,
    };
    let query = req.to_query(50.0, 10);
    assert_eq!(query.category, "agriculture");
    assert!(QueryLimits::default().validate(&query).is_err());
}

#[test]
fn test_match_response_shape() {
    let mut result = MatchResult::failed(
        EngineTier::Primary,
        EngineError::Timeout {
            engine: EngineTier::Primary,
            timeout_ms: 800,
        },
        800,
    );
    result.attempts = vec![result.attempt()];

    let json = serde_json::to_value(MatchSignalResponse::new("req-1".to_string(), result)).unwrap();
    assert_eq!(json["requestId"], "req-1");
    assert_eq!(json["engine"], "primary");
    assert_eq!(json["latencyMs"], 800);
    assert_eq!(json["matches"].as_array().unwrap().len(), 0);
    assert_eq!(json["attempts"][0]["error"], "primary store call timed out after 800ms");
}
