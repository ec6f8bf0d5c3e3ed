use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use validator::Validate;

use crate::config::MatchingSettings;
use crate::core::{BreakerRegistry, MatchingDispatcher};
use crate::models::{ErrorResponse, HealthResponse, MatchSignalRequest, MatchSignalResponse};
use crate::services::SpatialStore;

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<MatchingDispatcher>,
    pub breakers: Arc<BreakerRegistry>,
    pub primary_store: Arc<dyn SpatialStore>,
    pub matching: MatchingSettings,
}

/// Configure all signal-matching routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/signals/match", web::post().to(match_signals))
        .route("/breakers", web::get().to(breaker_status));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let primary_healthy = tokio::time::timeout(HEALTH_PROBE_TIMEOUT, state.primary_store.health_check())
        .await
        .ok()
        .and_then(Result::ok)
        .unwrap_or(false);

    let status = if primary_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        breakers: state.breakers.snapshot(),
    })
}

/// Circuit breaker status endpoint
async fn breaker_status(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.breakers.snapshot())
}

/// Match signals endpoint
///
/// POST /api/v1/signals/match
///
/// Request body:
/// ```json
/// {
///   "category": "agriculture",
///   "lat": 19.4326,
///   "lng": -99.1332,
///   "radiusKm": 10,
///   "limit": 10
/// }
/// ```
async fn match_signals(state: web::Data<AppState>, req: web::Json<MatchSignalRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for match request: {:?}", errors);
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    let query = req.to_query(state.matching.default_radius_km, state.matching.default_limit);
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("match_request", request_id = %request_id);

    match state.dispatcher.match_signal(&query).instrument(span).await {
        Ok(result) => {
            tracing::info!(
                request_id = %request_id,
                engine = %result.engine,
                matches = result.matches.len(),
                latency_ms = result.latency_ms,
                "Match request served"
            );
            HttpResponse::Ok().json(MatchSignalResponse::new(request_id, result))
        }
        Err(e) => HttpResponse::BadRequest().json(ErrorResponse {
            error: "Invalid query".to_string(),
            message: e.to_string(),
            status_code: 400,
        }),
    }
}
