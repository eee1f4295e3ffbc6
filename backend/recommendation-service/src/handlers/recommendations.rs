use actix_web::{delete, get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AppState;
use crate::error::{AppError, Result};
use crate::models::{CachedRecommendation, StoredModelRun, UserId};
use crate::services::recompute::DEFAULT_LIMIT;
use crate::services::{RecomputeOutcome, RejectReason};

const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub user_id: UserId,
    pub items: Vec<CachedRecommendation>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct RunsResponse {
    pub user_id: UserId,
    pub runs: Vec<StoredModelRun>,
}

#[post("/recommendations/{user_id}/recompute")]
pub async fn recompute(
    path: web::Path<UserId>,
    query: web::Query<LimitQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let outcome = state.orchestrator.recompute(user_id, query.limit).await?;

    match outcome {
        RecomputeOutcome::Committed { .. } => Ok(HttpResponse::Ok().json(outcome)),
        RecomputeOutcome::InProgress => Ok(HttpResponse::Accepted().json(outcome)),
        RecomputeOutcome::Rejected {
            reason: RejectReason::UserNotFound,
        } => Err(AppError::NotFound(format!("User {user_id} not found"))),
        RecomputeOutcome::Rejected {
            reason: RejectReason::RoleNotPermitted,
        } => Err(AppError::Authorization(format!(
            "User {user_id} is not eligible for recommendations"
        ))),
    }
}

#[get("/recommendations/{user_id}")]
pub async fn get_recommendations(
    path: web::Path<UserId>,
    query: web::Query<LimitQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let limit = query.limit.min(MAX_LIMIT);

    let items = state.orchestrator.get_cached(user_id, limit).await?;
    debug!(user_id = user_id, count = items.len(), "Serving cached recommendations");

    Ok(HttpResponse::Ok().json(RecommendationsResponse {
        user_id,
        count: items.len(),
        items,
    }))
}

#[get("/recommendations/{user_id}/runs")]
pub async fn get_runs(path: web::Path<UserId>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let runs = state.orchestrator.runs(user_id).await?;

    Ok(HttpResponse::Ok().json(RunsResponse { user_id, runs }))
}

#[delete("/recommendations/{user_id}")]
pub async fn clear_recommendations(
    path: web::Path<UserId>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    state.orchestrator.clear(user_id).await?;

    Ok(HttpResponse::NoContent().finish())
}
