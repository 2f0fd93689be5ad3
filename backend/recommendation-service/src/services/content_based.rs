use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::{settle, Generated, PopularityFallback, Recommender, Stores};
use crate::error::Result;
use crate::models::{rank_by_score, RecommendationReason, RecommendedProduct};

/// Flat score for any product matching a stated preference.
pub const CONTENT_MATCH_SCORE: f64 = 1.0;

/// Matches stated preferences against product categories and tags.
pub struct ContentBasedRecommender {
    stores: Stores,
    popularity: Arc<PopularityFallback>,
}

impl ContentBasedRecommender {
    pub fn new(stores: Stores, popularity: Arc<PopularityFallback>) -> Self {
        Self { stores, popularity }
    }

    async fn generate(&self, user_id: &str, limit: usize) -> Result<Generated> {
        let exclude = self.stores.interacted_products(user_id).await?;
        let preferences = self.stores.preferences(user_id).await?;

        if preferences.is_empty() {
            info!(user_id = %user_id, "No stated preferences");
            return Ok(Generated::NoCandidates(exclude));
        }

        // A preference may name either a category or a tag
        let mut recommendations: Vec<RecommendedProduct> = self
            .stores
            .products
            .find_by_category_or_tags(&preferences, &preferences, &exclude)
            .await?
            .into_iter()
            .map(|p| {
                RecommendedProduct::from_product(
                    p,
                    CONTENT_MATCH_SCORE,
                    RecommendationReason::ContentBased,
                )
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
            "Content-based recommendations generated"
        );
        Ok(Generated::Ranked(recommendations))
    }
}

#[async_trait]
impl Recommender for ContentBasedRecommender {
    async fn recommend(&self, user_id: &str, limit: usize) -> Result<Vec<RecommendedProduct>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let outcome = self.generate(user_id, limit).await;
        settle(
            "content_based",
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
    use crate::models::{Interaction, Product, User};
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
        preferences: &[&str],
    ) -> ContentBasedRecommender {
        let interactions = Arc::new(MemoryInteractionStore::with_interactions(log));
        let products = Arc::new(MemoryProductStore::with_products(catalog));
        let users = MemoryUserStore::with_users(vec![User {
            id: "u1".to_string(),
            preferences: preferences.iter().map(|p| p.to_string()).collect(),
        }]);
        let stores = Stores::new(interactions.clone(), products.clone(), Arc::new(users));
        ContentBasedRecommender::new(stores, Arc::new(PopularityFallback::new(interactions, products)))
    }

    #[tokio::test]
    async fn test_matches_category_or_tag_with_flat_score() {
        let rec = recommender(
            vec![Interaction::new("u1", "seen", "view")],
            vec![
                product("seen", "books", &[]),
                product("c", "books", &[]),
                product("a", "music", &["books"]),
                product("b", "garden", &[]),
            ],
            &["books"],
        );

        let recs = rec.recommend("u1", 10).await.unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.product_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(recs
            .iter()
            .all(|r| r.score == CONTENT_MATCH_SCORE && r.reason == RecommendationReason::ContentBased));
    }

    #[tokio::test]
    async fn test_no_preferences_uses_popularity() {
        let rec = recommender(
            vec![Interaction::new("u2", "b", "like")],
            vec![product("b", "garden", &[])],
            &[],
        );

        let recs = rec.recommend("u1", 3).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].reason, RecommendationReason::Popular);
    }
}
