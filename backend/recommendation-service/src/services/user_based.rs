use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

use super::similarity::SimilarityEngine;
use super::{settle, Generated, PopularityFallback, Recommender, Stores};
use crate::error::Result;
use crate::models::{rank_by_score, Product, RecommendationReason, RecommendedProduct};

/// User-based collaborative filtering
///
/// Algorithm:
/// 1. Find the most similar users (cosine over weighted interaction vectors)
/// 2. Aggregate the products they interacted with, weighted by similarity
/// 3. Drop products the target already interacted with
/// 4. Boost products matching the target's stated preferences
///
/// Formula: score[product] = Σ(similarity[neighbor] × weight[neighbor, product]) × bonus
pub struct UserBasedRecommender {
    stores: Stores,
    similarity: Arc<SimilarityEngine>,
    popularity: Arc<PopularityFallback>,
    neighbor_count: usize,
    category_bonus: f64,
    tag_bonus: f64,
}

impl UserBasedRecommender {
    pub fn new(
        stores: Stores,
        similarity: Arc<SimilarityEngine>,
        popularity: Arc<PopularityFallback>,
        neighbor_count: usize,
    ) -> Self {
        Self {
            stores,
            similarity,
            popularity,
            neighbor_count,
            category_bonus: 1.2,
            tag_bonus: 0.1,
        }
    }

    pub fn with_preference_bonus(mut self, category_bonus: f64, tag_bonus: f64) -> Self {
        self.category_bonus = category_bonus;
        self.tag_bonus = tag_bonus;
        self
    }

    async fn generate(&self, user_id: &str, limit: usize) -> Result<Generated> {
        let interactions = self.stores.interactions.find_by_user(user_id).await?;
        let exclude: HashSet<String> = interactions.iter().map(|i| i.product_id.clone()).collect();
        let preferences = self.stores.preferences(user_id).await?;

        info!(
            user_id = %user_id,
            interacted = exclude.len(),
            preferences = preferences.len(),
            "User-based CF started"
        );

        let neighbors = self
            .similarity
            .neighborhood(user_id, &interactions, self.neighbor_count)
            .await?;
        if neighbors.is_empty() {
            return Ok(Generated::NoCandidates(exclude));
        }

        // Discovery order is kept so the product lookup is deterministic
        let mut order: Vec<String> = Vec::new();
        let mut candidate_scores: HashMap<String, f64> = HashMap::new();
        let mut skipped = 0usize;

        for neighbor in &neighbors {
            for (product_id, weight) in &neighbor.vector {
                if exclude.contains(product_id) {
                    skipped += 1;
                    continue;
                }
                let score = candidate_scores.entry(product_id.clone()).or_insert_with(|| {
                    order.push(product_id.clone());
                    0.0
                });
                *score += weight * neighbor.user.similarity;
            }
        }

        info!(
            user_id = %user_id,
            neighbors = neighbors.len(),
            candidates = candidate_scores.len(),
            skipped_already_interacted = skipped,
            "Neighbor products aggregated"
        );

        if candidate_scores.is_empty() {
            return Ok(Generated::NoCandidates(exclude));
        }

        let products = self.stores.products.find_by_ids(&order).await?;
        let mut recommendations: Vec<RecommendedProduct> = products
            .into_iter()
            .filter_map(|product| {
                let base = candidate_scores.get(&product.id).copied()?;
                let score = base * self.preference_bonus(&product, &preferences);
                Some(RecommendedProduct::from_product(
                    product,
                    score,
                    RecommendationReason::CollaborativeFiltering,
                ))
            })
            .collect();

        rank_by_score(&mut recommendations);
        recommendations.truncate(limit);

        if recommendations.is_empty() {
            return Ok(Generated::NoCandidates(exclude));
        }

        info!(
            user_id = %user_id,
            count = recommendations.len(),
            top_score = recommendations[0].score,
            "User-based CF recommendations generated"
        );

        Ok(Generated::Ranked(recommendations))
    }

    /// Multiplier for stated-preference matches: ×category_bonus for the
    /// category, ×(1 + tag_bonus) for every matching tag.
    pub fn preference_bonus(&self, product: &Product, preferences: &HashSet<String>) -> f64 {
        if preferences.is_empty() {
            return 1.0;
        }

        let mut multiplier = 1.0;
        if product
            .category
            .as_ref()
            .map(|c| preferences.contains(c))
            .unwrap_or(false)
        {
            multiplier *= self.category_bonus;
        }
        let matching_tags = product
            .tags
            .iter()
            .filter(|t| preferences.contains(*t))
            .count();
        // Compounds per tag: two matching tags give ×1.21, not the linear ×1.2.
        multiplier * (1.0 + self.tag_bonus).powi(matching_tags as i32)
    }
}

#[async_trait]
impl Recommender for UserBasedRecommender {
    async fn recommend(&self, user_id: &str, limit: usize) -> Result<Vec<RecommendedProduct>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let outcome = self.generate(user_id, limit).await;
        settle(
            "user_based",
            user_id,
            limit,
            outcome,
            &self.stores,
            &self.popularity,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Interaction, User};
    use crate::services::weighting::InteractionWeights;
    use crate::store::{MemoryInteractionStore, MemoryProductStore, MemoryUserStore};
    use chrono::Utc;

    fn product(id: &str, category: &str, tags: &[&str]) -> Product {
        Product {
            id: id.to_string(),
            name: id.to_string(),
            category: Some(category.to_string()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            price: None,
            created_at: Utc::now(),
        }
    }

    fn recommender(
        log: Vec<Interaction>,
        catalog: Vec<Product>,
        users: Vec<User>,
    ) -> UserBasedRecommender {
        let interactions = Arc::new(MemoryInteractionStore::with_interactions(log));
        let products = Arc::new(MemoryProductStore::with_products(catalog));
        let stores = Stores::new(
            interactions.clone(),
            products.clone(),
            Arc::new(MemoryUserStore::with_users(users)),
        );
        let similarity = Arc::new(SimilarityEngine::new(
            interactions.clone(),
            Arc::new(InteractionWeights::default()),
        ));
        let popularity = Arc::new(PopularityFallback::new(interactions, products));
        UserBasedRecommender::new(stores, similarity, popularity, 10)
    }

    #[test]
    fn test_preference_bonus_compounds() {
        let rec = recommender(Vec::new(), Vec::new(), Vec::new());
        let preferences: HashSet<String> = ["electronics".to_string()].into_iter().collect();
        let p = product("p1", "electronics", &["electronics", "gadgets"]);

        let score = 10.0 * rec.preference_bonus(&p, &preferences);
        assert!((score - 13.2).abs() < 1e-9);

        assert_eq!(rec.preference_bonus(&p, &HashSet::new()), 1.0);

        let preferences: HashSet<String> =
            ["gadgets".to_string(), "audio".to_string()].into_iter().collect();
        let p = product("p2", "electronics", &["gadgets", "audio"]);
        assert!((rec.preference_bonus(&p, &preferences) - 1.21).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_neighbor_products_weighted_by_similarity() {
        let rec = recommender(
            vec![
                Interaction::new("target", "a", "view"),
                Interaction::new("target", "b", "view"),
                Interaction::new("neighbor", "a", "purchase"),
                Interaction::new("neighbor", "c", "like"),
            ],
            vec![
                product("a", "x", &[]),
                product("b", "x", &[]),
                product("c", "x", &[]),
            ],
            vec![User {
                id: "target".into(),
                preferences: Vec::new(),
            }],
        );

        let recs = rec.recommend("target", 10).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].product_id, "c");
        assert_eq!(recs[0].reason, RecommendationReason::CollaborativeFiltering);

        // target (a:1, b:1) vs neighbor (a:5, c:3): 5 / (√2 · √34)
        let similarity = 5.0 / (2f64.sqrt() * 34f64.sqrt());
        assert!((recs[0].score - 3.0 * similarity).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_neighbors_falls_back_to_popular() {
        let rec = recommender(
            vec![
                Interaction::new("target", "a", "view"),
                Interaction::new("loner", "b", "view"),
            ],
            vec![product("a", "x", &[]), product("b", "x", &[])],
            Vec::new(),
        );

        let recs = rec.recommend("target", 5).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].product_id, "b");
        assert_eq!(recs[0].reason, RecommendationReason::Popular);
    }

    #[tokio::test]
    async fn test_everything_seen_falls_back() {
        let rec = recommender(
            vec![
                Interaction::new("target", "a", "view"),
                Interaction::new("neighbor", "a", "like"),
            ],
            vec![product("a", "x", &[]), product("z", "x", &[])],
            Vec::new(),
        );

        // Only "a" was ever interacted with, and the target has seen it
        let recs = rec.recommend("target", 5).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].product_id, "a");
        assert_eq!(recs[0].reason, RecommendationReason::PopularFallback);
    }
}
