use actix_web::middleware::DefaultHeaders;
use actix_web::web;

use crate::web::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/therapist").route(web::route().to(handlers::therapist)))
        .route("/health", web::get().to(handlers::health_check));
}

/// CORS headers attached to every response, errors included.
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add(("Access-Control-Allow-Headers", "Content-Type,x-app-secret"))
}
