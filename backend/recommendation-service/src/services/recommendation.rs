//! Cache-fronted access to the engine.
//!
//! Hybrid lists are cached per user and served while fresh; anything else is
//! computed live. A request that cannot produce anything still succeeds with
//! an empty list and an explanatory message.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{RecommendationEngine, RecommendationStrategy};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{
    RecommendationReason, RecommendationRecord, RecommendedProduct, SimilarUser,
    StoredRecommendation,
};
use crate::store::RecommendationCache;

pub const NO_RECOMMENDATIONS_MESSAGE: &str =
    "No recommendations available yet. Interact with more products to get personalized recommendations.";

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationResponse {
    pub user_id: String,
    pub recommendations: Vec<RecommendedProduct>,
    pub generated_at: DateTime<Utc>,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RecommendationResponse {
    fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            recommendations: Vec::new(),
            generated_at: Utc::now(),
            cached: false,
            message: Some(NO_RECOMMENDATIONS_MESSAGE.to_string()),
        }
    }
}

pub struct RecommendationService {
    engine: Arc<RecommendationEngine>,
    cache: Arc<dyn RecommendationCache>,
    max_age: Duration,
}

impl RecommendationService {
    pub fn new(engine: Arc<RecommendationEngine>, cache: Arc<dyn RecommendationCache>) -> Self {
        let max_age = engine.config().cache_max_age();
        Self {
            engine,
            cache,
            max_age,
        }
    }

    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    /// Cached hybrid recommendations, regenerated when missing or stale.
    pub async fn get_recommendations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<RecommendationResponse> {
        self.ensure_user(user_id).await?;

        match self.cache.get(user_id).await {
            Ok(Some(record)) if record.is_fresh(Utc::now(), self.max_age) => {
                metrics::record_cache_lookup("hit");
                info!(user_id = %user_id, "Serving cached recommendations");
                return Ok(self.hydrate(record, limit).await);
            }
            Ok(Some(_)) => {
                metrics::record_cache_lookup("stale");
                info!(user_id = %user_id, "Cached recommendations are stale, regenerating");
            }
            Ok(None) => {
                metrics::record_cache_lookup("miss");
            }
            Err(e) => {
                metrics::record_cache_lookup("error");
                warn!(user_id = %user_id, error = %e, "Cache read failed, regenerating");
            }
        }

        Ok(self.generate_and_store(user_id, limit).await)
    }

    /// Hybrid goes through the cache; other strategies are computed live.
    pub async fn get_with_strategy(
        &self,
        user_id: &str,
        limit: usize,
        strategy: RecommendationStrategy,
    ) -> Result<RecommendationResponse> {
        if strategy == RecommendationStrategy::Hybrid {
            return self.get_recommendations(user_id, limit).await;
        }

        self.ensure_user(user_id).await?;
        match self.engine.recommend(user_id, limit, strategy).await {
            Ok(recommendations) => Ok(self.live_response(user_id, recommendations, Utc::now())),
            Err(e) => {
                error!(user_id = %user_id, strategy = strategy.as_str(), error = %e, "Recommendation generation failed");
                Ok(RecommendationResponse::empty(user_id))
            }
        }
    }

    /// Forced regeneration, ignoring freshness.
    pub async fn regenerate(&self, user_id: &str, limit: usize) -> Result<RecommendationResponse> {
        self.ensure_user(user_id).await?;
        Ok(self.generate_and_store(user_id, limit).await)
    }

    /// Manual upsert of a user's list.
    pub async fn save(
        &self,
        user_id: &str,
        recommendations: Vec<StoredRecommendation>,
    ) -> Result<RecommendationRecord> {
        validate_entries(&recommendations)?;
        self.ensure_user(user_id).await?;

        let record = self.cache.put(user_id, recommendations).await?;
        info!(
            user_id = %user_id,
            count = record.recommendations.len(),
            "Recommendations saved"
        );
        Ok(record)
    }

    pub async fn similar_users(&self, user_id: &str, limit: usize) -> Result<Vec<SimilarUser>> {
        self.ensure_user(user_id).await?;
        self.engine.find_similar_users(user_id, limit).await
    }

    async fn ensure_user(&self, user_id: &str) -> Result<()> {
        match self.engine.stores().users.find_by_id(user_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("User {} not found", user_id))),
        }
    }

    /// The cached list is always built at `max_limit` so later requests with a
    /// larger limit are not capped by an earlier, smaller one.
    async fn generate_and_store(&self, user_id: &str, limit: usize) -> RecommendationResponse {
        let cache_size = self.engine.config().max_limit.max(limit);
        let mut recommendations = match self.engine.hybrid(user_id, cache_size).await {
            Ok(recommendations) => recommendations,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Recommendation generation failed");
                return RecommendationResponse::empty(user_id);
            }
        };

        if recommendations.is_empty() {
            return RecommendationResponse::empty(user_id);
        }

        let stored: Vec<StoredRecommendation> =
            recommendations.iter().map(StoredRecommendation::from).collect();
        let generated_at = match self.cache.put(user_id, stored).await {
            Ok(record) => record.generated_at,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to cache recommendations");
                Utc::now()
            }
        };

        recommendations.truncate(limit);
        self.live_response(user_id, recommendations, generated_at)
    }

    fn live_response(
        &self,
        user_id: &str,
        recommendations: Vec<RecommendedProduct>,
        generated_at: DateTime<Utc>,
    ) -> RecommendationResponse {
        if recommendations.is_empty() {
            return RecommendationResponse::empty(user_id);
        }
        RecommendationResponse {
            user_id: user_id.to_string(),
            recommendations,
            generated_at,
            cached: false,
            message: None,
        }
    }

    /// Re-attach product details to a cached record. Products that vanished
    /// from the catalog keep their entry without details.
    async fn hydrate(&self, record: RecommendationRecord, limit: usize) -> RecommendationResponse {
        let entries: Vec<StoredRecommendation> =
            record.recommendations.into_iter().take(limit).collect();
        let ids: Vec<String> = entries.iter().map(|e| e.product_id.clone()).collect();

        let mut products: HashMap<String, _> = match self.engine.stores().products.find_by_ids(&ids).await {
            Ok(products) => products.into_iter().map(|p| (p.id.clone(), p)).collect(),
            Err(e) => {
                warn!(user_id = %record.user_id, error = %e, "Product lookup failed for cached recommendations");
                HashMap::new()
            }
        };

        let recommendations: Vec<RecommendedProduct> = entries
            .into_iter()
            .map(|entry| RecommendedProduct {
                product: products.remove(&entry.product_id),
                product_id: entry.product_id,
                score: entry.score,
                reason: entry.reason.unwrap_or(RecommendationReason::Manual),
            })
            .collect();

        RecommendationResponse {
            user_id: record.user_id,
            message: recommendations
                .is_empty()
                .then(|| NO_RECOMMENDATIONS_MESSAGE.to_string()),
            recommendations,
            generated_at: record.generated_at,
            cached: true,
        }
    }
}

fn validate_entries(entries: &[StoredRecommendation]) -> Result<()> {
    for (index, entry) in entries.iter().enumerate() {
        if entry.product_id.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "recommendations[{}]: product_id must not be empty",
                index
            )));
        }
        if !entry.score.is_finite() || entry.score < 0.0 {
            return Err(AppError::Validation(format!(
                "recommendations[{}]: score must be a finite, non-negative number",
                index
            )));
        }
    }
    Ok(())
}
