use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use super::{settle, Generated, PopularityFallback, Recommender, Stores};
use crate::error::Result;
use crate::models::{rank_by_score, InteractionKind, Product, RecommendationReason, RecommendedProduct};

/// Item-based recommendations from the attributes of liked products
///
/// Only strong signals count: the categories and tags of everything the user
/// liked or purchased form the query. Candidates score
/// `category_points` for a category match plus `tag_points` per shared tag.
pub struct ItemBasedRecommender {
    stores: Stores,
    popularity: Arc<PopularityFallback>,
    category_points: f64,
    tag_points: f64,
}

impl ItemBasedRecommender {
    pub fn new(stores: Stores, popularity: Arc<PopularityFallback>) -> Self {
        Self {
            stores,
            popularity,
            category_points: 2.0,
            tag_points: 1.0,
        }
    }

    pub fn with_points(mut self, category_points: f64, tag_points: f64) -> Self {
        self.category_points = category_points;
        self.tag_points = tag_points;
        self
    }

    async fn generate(&self, user_id: &str, limit: usize) -> Result<Generated> {
        let liked = self
            .stores
            .interactions
            .find_by_user_and_kinds(user_id, &[InteractionKind::Like, InteractionKind::Purchase])
            .await?;

        // Views are excluded from the query but still count as "seen"
        let exclude = self.stores.interacted_products(user_id).await?;

        if liked.is_empty() {
            info!(user_id = %user_id, "No liked or purchased products");
            return Ok(Generated::NoCandidates(exclude));
        }

        let liked_ids: Vec<String> = liked.into_iter().map(|i| i.product_id).collect();
        let liked_products = self.stores.products.find_by_ids(&liked_ids).await?;

        let categories: HashSet<String> = liked_products
            .iter()
            .filter_map(|p| p.category.clone())
            .filter(|c| !c.is_empty())
            .collect();
        let tags: HashSet<String> = liked_products
            .iter()
            .flat_map(|p| p.tags.iter().cloned())
            .collect();

        if categories.is_empty() && tags.is_empty() {
            return Ok(Generated::NoCandidates(exclude));
        }

        let candidates = self
            .stores
            .products
            .find_by_category_or_tags(&categories, &tags, &exclude)
            .await?;

        let mut recommendations: Vec<RecommendedProduct> = candidates
            .into_iter()
            .map(|product| {
                let score = self.attribute_score(&product, &categories, &tags);
                RecommendedProduct::from_product(product, score, RecommendationReason::ItemBased)
            })
            .collect();

        rank_by_score(&mut recommendations);
        recommendations.truncate(limit);

        if recommendations.is_empty() {
            return Ok(Generated::NoCandidates(exclude));
        }

        info!(
            user_id = %user_id,
            categories = categories.len(),
            tags = tags.len(),
            count = recommendations.len(),
            "Item-based recommendations generated"
        );

        Ok(Generated::Ranked(recommendations))
    }

    fn attribute_score(
        &self,
        product: &Product,
        categories: &HashSet<String>,
        tags: &HashSet<String>,
    ) -> f64 {
        let category = match &product.category {
            Some(c) if categories.contains(c) => self.category_points,
            _ => 0.0,
        };
        let shared_tags = product.tags.iter().filter(|t| tags.contains(*t)).count();
        category + shared_tags as f64 * self.tag_points
    }
}

#[async_trait]
impl Recommender for ItemBasedRecommender {
    async fn recommend(&self, user_id: &str, limit: usize) -> Result<Vec<RecommendedProduct>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let outcome = self.generate(user_id, limit).await;
        settle(
            "item_based",
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
    use crate::models::Interaction;
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

    fn recommender(log: Vec<Interaction>, catalog: Vec<Product>) -> ItemBasedRecommender {
        let interactions = Arc::new(MemoryInteractionStore::with_interactions(log));
        let products = Arc::new(MemoryProductStore::with_products(catalog));
        let stores = Stores::new(
            interactions.clone(),
            products.clone(),
            Arc::new(MemoryUserStore::new()),
        );
        ItemBasedRecommender::new(stores, Arc::new(PopularityFallback::new(interactions, products)))
    }

    #[tokio::test]
    async fn test_category_match_outranks_tag_match() {
        let rec = recommender(
            vec![Interaction::new("u1", "liked", "purchase")],
            vec![
                product("liked", "books", &["fiction"]),
                product("tag_only", "music", &["fiction"]),
                product("same_category", "books", &[]),
                product("unrelated", "garden", &["tools"]),
            ],
        );

        let recs = rec.recommend("u1", 10).await.unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.product_id.as_str()).collect();
        assert_eq!(ids, vec!["same_category", "tag_only"]);
        assert_eq!(recs[0].score, 2.0);
        assert_eq!(recs[1].score, 1.0);
        assert!(recs.iter().all(|r| r.reason == RecommendationReason::ItemBased));
    }

    #[tokio::test]
    async fn test_points_accumulate() {
        let rec = recommender(
            vec![Interaction::new("u1", "liked", "like")],
            vec![
                product("liked", "books", &["fiction", "classic"]),
                product("both", "books", &["fiction", "classic"]),
            ],
        );

        let recs = rec.recommend("u1", 10).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].score, 4.0);
    }

    #[tokio::test]
    async fn test_views_do_not_seed_the_query_but_are_excluded() {
        let rec = recommender(
            vec![
                Interaction::new("u1", "liked", "like"),
                Interaction::new("u1", "viewed", "view"),
                Interaction::new("u2", "other", "view"),
            ],
            vec![
                product("liked", "books", &[]),
                product("viewed", "books", &["games"]),
                product("other", "games", &["games"]),
                product("match", "books", &[]),
            ],
        );

        let recs = rec.recommend("u1", 10).await.unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.product_id.as_str()).collect();
        assert_eq!(ids, vec!["match"]);
    }

    #[tokio::test]
    async fn test_only_views_falls_back_to_popular() {
        let rec = recommender(
            vec![
                Interaction::new("u1", "a", "view"),
                Interaction::new("u2", "b", "view"),
            ],
            vec![product("a", "books", &[]), product("b", "books", &[])],
        );

        let recs = rec.recommend("u1", 5).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].product_id, "b");
        assert_eq!(recs[0].reason, RecommendationReason::Popular);
    }
}
