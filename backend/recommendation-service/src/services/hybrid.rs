//! Hybrid aggregation of user-based and item-based recommendations.
//!
//! Both sub-recommenders run concurrently on ceil(limit × share) slots. The
//! user-based list is the base; an item-based product already present adds
//! its score × dampening, a new one enters at its own score.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{ItemBasedRecommender, PopularityFallback, Recommender, Stores, UserBasedRecommender};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::metrics;
use crate::models::{normalize_scores, rank_by_score, RecommendedProduct};

pub struct HybridRecommender {
    stores: Stores,
    user_based: Arc<UserBasedRecommender>,
    item_based: Arc<ItemBasedRecommender>,
    popularity: Arc<PopularityFallback>,
    user_based_share: f64,
    item_based_share: f64,
    item_merge_dampening: f64,
    normalize: bool,
    timeout: Duration,
}

impl HybridRecommender {
    pub fn new(
        stores: Stores,
        user_based: Arc<UserBasedRecommender>,
        item_based: Arc<ItemBasedRecommender>,
        popularity: Arc<PopularityFallback>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            stores,
            user_based,
            item_based,
            popularity,
            user_based_share: config.user_based_share,
            item_based_share: config.item_based_share,
            item_merge_dampening: config.item_merge_dampening,
            normalize: config.normalize_scores,
            timeout: config.generation_timeout(),
        }
    }

    /// Full hybrid computation bounded by the generation timeout.
    ///
    /// On expiry the popularity chain answers without exclusions.
    pub async fn generate(&self, user_id: &str, limit: usize) -> Result<Vec<RecommendedProduct>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        match tokio::time::timeout(self.timeout, self.compute(user_id, limit)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    user_id = %user_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Hybrid generation timed out, serving popular products"
                );
                metrics::record_stage_failure("hybrid_timeout");
                self.popularity.get_popular(limit, &HashSet::new()).await
            }
        }
    }

    async fn compute(&self, user_id: &str, limit: usize) -> Result<Vec<RecommendedProduct>> {
        let interaction_count = match self.stores.interactions.count_by_user(user_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Interaction count failed, treating as cold start");
                metrics::record_stage_failure("interaction_count");
                0
            }
        };

        if interaction_count == 0 {
            info!(user_id = %user_id, "Cold start, serving popular products");
            return self.popularity.get_popular(limit, &HashSet::new()).await;
        }

        let user_limit = share_of(limit, self.user_based_share);
        let item_limit = share_of(limit, self.item_based_share);

        let (user_result, item_result) = tokio::join!(
            self.user_based.recommend(user_id, user_limit),
            self.item_based.recommend(user_id, item_limit)
        );

        let mut user_recs = settled("user_based", user_id, user_result);
        let mut item_recs = settled("item_based", user_id, item_result);

        if self.normalize {
            normalize_scores(&mut user_recs);
            normalize_scores(&mut item_recs);
        }

        info!(
            user_id = %user_id,
            user_based = user_recs.len(),
            item_based = item_recs.len(),
            "Merging hybrid candidates"
        );

        let mut merged = merge(user_recs, item_recs, self.item_merge_dampening);
        rank_by_score(&mut merged);
        merged.truncate(limit);

        if merged.is_empty() {
            let exclude = self
                .stores
                .interacted_products(user_id)
                .await
                .unwrap_or_default();
            return self.popularity.get_popular(limit, &exclude).await;
        }

        Ok(merged)
    }
}

#[async_trait]
impl Recommender for HybridRecommender {
    async fn recommend(&self, user_id: &str, limit: usize) -> Result<Vec<RecommendedProduct>> {
        self.generate(user_id, limit).await
    }
}

fn share_of(limit: usize, share: f64) -> usize {
    (limit as f64 * share).ceil() as usize
}

/// A failed sub-recommender contributes nothing to the merge.
fn settled(
    stage: &'static str,
    user_id: &str,
    result: Result<Vec<RecommendedProduct>>,
) -> Vec<RecommendedProduct> {
    result.unwrap_or_else(|e| {
        warn!(user_id = %user_id, stage = stage, error = %e, "Sub-recommender failed");
        metrics::record_stage_failure(stage);
        Vec::new()
    })
}

/// User-based entries first; item-based entries either top up an existing
/// score (dampened) or join at their own score.
pub(crate) fn merge(
    user_based: Vec<RecommendedProduct>,
    item_based: Vec<RecommendedProduct>,
    dampening: f64,
) -> Vec<RecommendedProduct> {
    let mut merged: Vec<RecommendedProduct> = Vec::with_capacity(user_based.len() + item_based.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for rec in user_based {
        match index.get(&rec.product_id) {
            Some(&i) => merged[i].score += rec.score,
            None => {
                index.insert(rec.product_id.clone(), merged.len());
                merged.push(rec);
            }
        }
    }

    for rec in item_based {
        match index.get(&rec.product_id) {
            Some(&i) => merged[i].score += rec.score * dampening,
            None => {
                index.insert(rec.product_id.clone(), merged.len());
                merged.push(rec);
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Interaction, Product, RecommendationReason};
    use crate::services::similarity::SimilarityEngine;
    use crate::services::weighting::InteractionWeights;
    use crate::store::{MemoryInteractionStore, MemoryProductStore, MemoryUserStore, MockInteractionStore};
    use crate::error::AppError;
    use crate::store::InteractionStore;
    use chrono::Utc;

    fn rec(id: &str, score: f64, reason: RecommendationReason) -> RecommendedProduct {
        RecommendedProduct {
            product_id: id.to_string(),
            product: None,
            score,
            reason,
        }
    }

    fn product(id: &str, category: &str) -> Product {
        Product {
            id: id.to_string(),
            name: id.to_string(),
            category: Some(category.to_string()),
            tags: Vec::new(),
            price: None,
            created_at: Utc::now(),
        }
    }

    fn hybrid_over(
        interactions: Arc<dyn InteractionStore>,
        catalog: Vec<Product>,
        config: &EngineConfig,
    ) -> HybridRecommender {
        let products = Arc::new(MemoryProductStore::with_products(catalog));
        let stores = Stores::new(
            interactions.clone(),
            products.clone(),
            Arc::new(MemoryUserStore::new()),
        );
        let popularity = Arc::new(PopularityFallback::new(interactions.clone(), products));
        let similarity = Arc::new(SimilarityEngine::new(
            interactions,
            Arc::new(InteractionWeights::default()),
        ));
        let user_based = Arc::new(UserBasedRecommender::new(
            stores.clone(),
            similarity,
            popularity.clone(),
            config.neighbor_count,
        ));
        let item_based = Arc::new(ItemBasedRecommender::new(stores.clone(), popularity.clone()));
        HybridRecommender::new(stores, user_based, item_based, popularity, config)
    }

    #[test]
    fn test_share_rounds_up() {
        assert_eq!(share_of(10, 0.7), 7);
        assert_eq!(share_of(10, 0.3), 3);
        assert_eq!(share_of(1, 0.3), 1);
        assert_eq!(share_of(5, 0.7), 4);
    }

    #[test]
    fn test_merge_dampens_item_scores_on_overlap() {
        let merged = merge(
            vec![rec("x", 4.0, RecommendationReason::CollaborativeFiltering)],
            vec![
                rec("x", 2.0, RecommendationReason::ItemBased),
                rec("y", 3.0, RecommendationReason::ItemBased),
            ],
            0.5,
        );

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].product_id, "x");
        assert_eq!(merged[0].score, 5.0);
        assert_eq!(merged[0].reason, RecommendationReason::CollaborativeFiltering);
        assert_eq!(merged[1].product_id, "y");
        assert_eq!(merged[1].score, 3.0);
    }

    #[tokio::test]
    async fn test_cold_start_serves_popularity_only() {
        let log = vec![
            Interaction::new("u2", "a", "purchase"),
            Interaction::new("u3", "a", "view"),
            Interaction::new("u3", "b", "view"),
        ];
        let hybrid = hybrid_over(
            Arc::new(MemoryInteractionStore::with_interactions(log)),
            vec![product("a", "x"), product("b", "x")],
            &EngineConfig::default(),
        );

        let recs = hybrid.generate("newcomer", 5).await.unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.product_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(recs.iter().all(|r| r.reason == RecommendationReason::Popular));
    }

    #[tokio::test]
    async fn test_failed_count_is_treated_as_cold_start() {
        let mut interactions = MockInteractionStore::new();
        interactions
            .expect_count_by_user()
            .returning(|_| Err(AppError::Store("down".into())));
        interactions
            .expect_aggregate_counts_by_product()
            .returning(|_, _| Ok(vec![("a".to_string(), 3)]));

        let hybrid = hybrid_over(
            Arc::new(interactions),
            vec![product("a", "x")],
            &EngineConfig::default(),
        );

        let recs = hybrid.generate("u1", 5).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].reason, RecommendationReason::Popular);
        assert_eq!(recs[0].score, 3.0);
    }

    #[tokio::test]
    async fn test_merges_both_paths_and_sorts() {
        let log = vec![
            Interaction::new("target", "a", "purchase"),
            Interaction::new("neighbor", "a", "purchase"),
            Interaction::new("neighbor", "b", "like"),
        ];
        let hybrid = hybrid_over(
            Arc::new(MemoryInteractionStore::with_interactions(log)),
            vec![product("a", "books"), product("b", "music"), product("c", "books")],
            &EngineConfig::default(),
        );

        let recs = hybrid.generate("target", 10).await.unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.product_id.as_str()).collect();
        assert!(!ids.contains(&"a"));
        assert!(ids.contains(&"b"));
        assert!(ids.contains(&"c"));
        assert!(recs.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_limit_is_respected() {
        let mut log = vec![Interaction::new("target", "seed", "like")];
        let mut catalog = vec![
            product("seed", "books"),
            product("q1", "books"),
            product("q2", "books"),
        ];
        for i in 0..20 {
            let id = format!("p{:02}", i);
            log.push(Interaction::new("neighbor", id.as_str(), "view"));
            catalog.push(product(&id, "music"));
        }
        log.push(Interaction::new("neighbor", "seed", "like"));

        let hybrid = hybrid_over(
            Arc::new(MemoryInteractionStore::with_interactions(log)),
            catalog,
            &EngineConfig::default(),
        );

        let recs = hybrid.generate("target", 4).await.unwrap();
        assert_eq!(recs.len(), 4);
    }

    #[tokio::test]
    async fn test_normalized_scores_stay_in_unit_range() {
        let log = vec![
            Interaction::new("target", "a", "purchase"),
            Interaction::new("neighbor", "a", "purchase"),
            Interaction::new("neighbor", "b", "purchase"),
            Interaction::new("neighbor", "c", "view"),
        ];
        let config = EngineConfig {
            normalize_scores: true,
            item_merge_dampening: 0.0,
            ..EngineConfig::default()
        };
        let hybrid = hybrid_over(
            Arc::new(MemoryInteractionStore::with_interactions(log)),
            vec![product("a", "books"), product("b", "music"), product("c", "garden")],
            &config,
        );

        let recs = hybrid.generate("target", 10).await.unwrap();
        assert!(!recs.is_empty());
        assert!(recs.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }
}
