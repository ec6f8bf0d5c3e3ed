// Route exports
pub mod signals;

use actix_web::web;

pub use signals::AppState;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(signals::configure),
    );
}
