use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::{RecommendationReason, SimilarUser, StoredRecommendation};
use crate::services::{RecommendationService, RecommendationStrategy};

/// Recommendation handler state
pub struct RecommendationHandlerState {
    pub service: Arc<RecommendationService>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub limit: Option<usize>,
    pub strategy: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SaveRecommendationsRequest {
    pub recommendations: Vec<SaveRecommendationEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SaveRecommendationEntry {
    pub product_id: String,
    pub score: f64,
    pub reason: Option<RecommendationReason>,
}

#[derive(Debug, Serialize)]
pub struct SaveRecommendationsResponse {
    pub user_id: String,
    pub saved: usize,
    pub generated_at: String,
}

#[derive(Debug, Serialize)]
pub struct SimilarUsersResponse {
    pub user_id: String,
    pub users: Vec<SimilarUser>,
    pub count: usize,
}

/// GET /api/v1/recommendations/{user_id}
///
/// Query: `limit` (clamped to [1, max]), `strategy` (default `hybrid`).
/// Hybrid lists come from the cache while fresh; other strategies are live.
#[get("/api/v1/recommendations/{user_id}")]
pub async fn get_recommendations(
    path: web::Path<String>,
    query: web::Query<RecommendationQuery>,
    state: web::Data<RecommendationHandlerState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let limit = state.service.engine().config().clamp_limit(query.limit);
    let strategy = match query.strategy.as_deref() {
        Some(raw) => raw.parse::<RecommendationStrategy>()?,
        None => RecommendationStrategy::default(),
    };

    debug!(
        "Recommendations request: user={}, limit={}, strategy={}",
        user_id, limit, strategy
    );

    let response = state
        .service
        .get_with_strategy(&user_id, limit, strategy)
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /api/v1/recommendations/{user_id}/regenerate
#[post("/api/v1/recommendations/{user_id}/regenerate")]
pub async fn regenerate_recommendations(
    path: web::Path<String>,
    query: web::Query<LimitQuery>,
    state: web::Data<RecommendationHandlerState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let limit = state.service.engine().config().clamp_limit(query.limit);

    let response = state.service.regenerate(&user_id, limit).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /api/v1/recommendations/{user_id}
///
/// Body: `{ "recommendations": [{ "product_id": "...", "score": 1.5 }] }`
#[post("/api/v1/recommendations/{user_id}")]
pub async fn save_recommendations(
    path: web::Path<String>,
    body: web::Json<SaveRecommendationsRequest>,
    state: web::Data<RecommendationHandlerState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let entries: Vec<StoredRecommendation> = body
        .into_inner()
        .recommendations
        .into_iter()
        .map(|e| StoredRecommendation {
            product_id: e.product_id,
            score: e.score,
            reason: e.reason,
        })
        .collect();

    let record = state.service.save(&user_id, entries).await?;
    Ok(HttpResponse::Created().json(SaveRecommendationsResponse {
        user_id: record.user_id,
        saved: record.recommendations.len(),
        generated_at: record.generated_at.to_rfc3339(),
    }))
}

/// GET /api/v1/users/{user_id}/similar
#[get("/api/v1/users/{user_id}/similar")]
pub async fn get_similar_users(
    path: web::Path<String>,
    query: web::Query<LimitQuery>,
    state: web::Data<RecommendationHandlerState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    if user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user_id must not be empty".into()));
    }
    let limit = state.service.engine().config().clamp_limit(query.limit);

    let users = state.service.similar_users(&user_id, limit).await?;
    Ok(HttpResponse::Ok().json(SimilarUsersResponse {
        count: users.len(),
        user_id,
        users,
    }))
}
