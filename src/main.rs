use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use signal_match::config::{LoggingSettings, Settings};
use signal_match::core::{BreakerRegistry, MatchingDispatcher, PrimaryMatcher, SecondaryMatcher, TertiaryMatcher};
use signal_match::routes::{self, AppState};
use signal_match::services::{HttpSignalLog, PostgresSignalStore, RedisGeoIndex, SignalLog, SpatialStore};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_logging(logging: &LoggingSettings) {
    // LOG_LEVEL / LOG_FORMAT win over the config file
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| logging.level.clone());
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| logging.format.clone());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    init_logging(&settings.logging);
    info!("Starting signal matching service...");

    let breakers = Arc::new(
        BreakerRegistry::new(settings.breaker.breaker_config()),
    );
    info!(
        failure_threshold = settings.breaker.failure_threshold,
        reset_timeout_ms = settings.breaker.reset_timeout_ms,
        "Circuit breaker registry initialized"
    );

    // Primary: PostGIS
    let postgres = PostgresSignalStore::from_settings(&settings.database)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    if settings.database.run_migrations {
        if let Err(e) = postgres.migrate().await {
            warn!("Migrations not applied, primary tier may be unavailable: {}", e);
        }
    }
    let primary_store: Arc<dyn SpatialStore> = Arc::new(postgres);

    // Secondary: Redis geo-index
    let geo_index = RedisGeoIndex::from_settings(&settings.cache)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    info!(
        l1_size = settings.cache.l1_cache_size.unwrap_or(1000),
        "Redis geo-index configured"
    );

    // Tertiary: durable signal log (optional)
    let signal_log: Option<Arc<dyn SignalLog>> = match HttpSignalLog::from_settings(&settings.signal_log) {
        Ok(Some(log)) => Some(Arc::new(log)),
        Ok(None) => {
            warn!("No signal log endpoint configured, tertiary tier will answer empty");
            None
        }
        Err(e) => {
            error!("Failed to build signal log client, tertiary tier disabled: {}", e);
            None
        }
    };

    let matching = settings.matching.clone();
    let dispatcher = MatchingDispatcher::new(
        PrimaryMatcher::new(Arc::clone(&primary_store), Arc::clone(&breakers), matching.primary_timeout()),
        SecondaryMatcher::new(Arc::new(geo_index), Arc::clone(&breakers), matching.secondary_timeout())
            .with_candidates(matching.secondary_candidates),
        TertiaryMatcher::new(signal_log, Arc::clone(&breakers), matching.tertiary_timeout()),
    )
    .with_limits(matching.query_limits());

    info!("Matching dispatcher initialized: {:?}", dispatcher.limits());

    let app_state = AppState {
        dispatcher: Arc::new(dispatcher),
        breakers,
        primary_store,
        matching,
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
