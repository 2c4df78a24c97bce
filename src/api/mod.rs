//! API endpoint modules.

pub mod audit;
pub mod extractions;
pub mod files;
pub mod health;
pub mod openapi;
pub mod previews;

use actix_web::web;

pub use health::configure_health_routes;
pub use openapi::ApiDoc;

/// Every `/api/v1` route.
pub fn configure_api_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(configure_health_routes)
        .configure(files::configure_routes)
        .configure(extractions::configure_routes)
        .configure(previews::configure_routes)
        .configure(audit::configure_routes);
}
