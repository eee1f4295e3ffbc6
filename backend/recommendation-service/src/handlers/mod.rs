pub mod interactions;
pub mod recommendations;

use actix_web::{get, web, HttpResponse};
use serde_json::json;
use std::sync::Arc;

use crate::db::InteractionRecorder;
use crate::metrics;
use crate::services::RecomputeOrchestrator;

pub use interactions::{record_interaction, InteractionRequest};
pub use recommendations::{clear_recommendations, get_recommendations, get_runs, recompute, LimitQuery};

pub struct AppState {
    pub orchestrator: Arc<RecomputeOrchestrator>,
    pub interactions: Arc<dyn InteractionRecorder>,
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok", "service": "recommendation-service" }))
}

#[get("/metrics")]
pub async fn metrics_endpoint() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::render())
}

/// Register every route; shared by `main` and the HTTP tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(metrics_endpoint)
        .service(
            web::scope("/api/v1")
                .service(recompute)
                .service(get_runs)
                .service(get_recommendations)
                .service(clear_recommendations)
                .service(record_interaction),
        );
}
