//! In-process store adapters.
//!
//! Insertion order is preserved everywhere so results are deterministic,
//! which is what the tests rely on.

use super::{InteractionStore, ProductStore, RecommendationCache, UserStore};
use crate::error::Result;
use crate::models::{Interaction, Product, RecommendationRecord, StoredRecommendation, User};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryInteractionStore {
    log: RwLock<Vec<Interaction>>,
}

impl MemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interactions(interactions: Vec<Interaction>) -> Self {
        Self {
            log: RwLock::new(interactions),
        }
    }
}

#[async_trait]
impl InteractionStore for MemoryInteractionStore {
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Interaction>> {
        let log = self.log.read().await;
        Ok(log.iter().filter(|i| i.user_id == user_id).cloned().collect())
    }

    async fn find_by_users(&self, user_ids: &[String]) -> Result<Vec<Interaction>> {
        let wanted: HashSet<&str> = user_ids.iter().map(String::as_str).collect();
        let log = self.log.read().await;
        Ok(log
            .iter()
            .filter(|i| wanted.contains(i.user_id.as_str()))
            .cloned()
            .collect())
    }

    async fn find_co_interactions(
        &self,
        user_id: &str,
        product_ids: &[String],
    ) -> Result<Vec<Interaction>> {
        let products: HashSet<&str> = product_ids.iter().map(String::as_str).collect();
        let log = self.log.read().await;
        Ok(log
            .iter()
            .filter(|i| i.user_id != user_id && products.contains(i.product_id.as_str()))
            .cloned()
            .collect())
    }

    async fn count_by_user(&self, user_id: &str) -> Result<u64> {
        let log = self.log.read().await;
        Ok(log.iter().filter(|i| i.user_id == user_id).count() as u64)
    }

    async fn aggregate_counts_by_product(
        &self,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<(String, u64)>> {
        let log = self.log.read().await;

        // Keep first-seen order so equal counts stay stable.
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, u64> = HashMap::new();
        for interaction in log.iter() {
            if exclude.contains(&interaction.product_id) {
                continue;
            }
            let count = counts.entry(interaction.product_id.clone()).or_insert_with(|| {
                order.push(interaction.product_id.clone());
                0
            });
            *count += 1;
        }

        let mut ranked: Vec<(String, u64)> = order
            .into_iter()
            .map(|id| {
                let count = counts.get(&id).copied().unwrap_or(0);
                (id, count)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(limit);

        Ok(ranked)
    }

    async fn record(&self, interaction: Interaction) -> Result<()> {
        self.log.write().await.push(interaction);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryProductStore {
    catalog: RwLock<Vec<Product>>,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: Vec<Product>) -> Self {
        Self {
            catalog: RwLock::new(products),
        }
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Product>> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let catalog = self.catalog.read().await;
        Ok(catalog
            .iter()
            .filter(|p| wanted.contains(p.id.as_str()))
            .cloned()
            .collect())
    }

    async fn find_by_category_or_tags(
        &self,
        categories: &HashSet<String>,
        tags: &HashSet<String>,
        exclude: &HashSet<String>,
    ) -> Result<Vec<Product>> {
        let catalog = self.catalog.read().await;
        Ok(catalog
            .iter()
            .filter(|p| !exclude.contains(&p.id))
            .filter(|p| {
                let category_match = p
                    .category
                    .as_ref()
                    .map(|c| categories.contains(c))
                    .unwrap_or(false);
                category_match || p.tags.iter().any(|t| tags.contains(t))
            })
            .cloned()
            .collect())
    }

    async fn most_recent(&self, limit: usize, exclude: &HashSet<String>) -> Result<Vec<Product>> {
        let catalog = self.catalog.read().await;
        let mut products: Vec<Product> = catalog
            .iter()
            .filter(|p| !exclude.contains(&p.id))
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        products.truncate(limit);
        Ok(products)
    }

    async fn any(&self, limit: usize) -> Result<Vec<Product>> {
        let catalog = self.catalog.read().await;
        Ok(catalog.iter().take(limit).cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.id.clone(), u)).collect()),
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }
}

/// One record per user, last write wins.
#[derive(Default)]
pub struct MemoryRecommendationCache {
    records: DashMap<String, RecommendationRecord>,
}

impl MemoryRecommendationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a record as-is, keeping its timestamp (used to age entries in tests).
    pub fn insert_record(&self, record: RecommendationRecord) {
        self.records.insert(record.user_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecommendationCache for MemoryRecommendationCache {
    async fn get(&self, user_id: &str) -> Result<Option<RecommendationRecord>> {
        Ok(self.records.get(user_id).map(|entry| entry.value().clone()))
    }

    async fn put(
        &self,
        user_id: &str,
        recommendations: Vec<StoredRecommendation>,
    ) -> Result<RecommendationRecord> {
        let record = RecommendationRecord::new(user_id, recommendations);
        self.records.insert(user_id.to_string(), record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InteractionKind;
    use chrono::{Duration, Utc};

    fn product(id: &str, category: &str, tags: &[&str], age_hours: i64) -> Product {
        Product {
            id: id.to_string(),
            name: id.to_uppercase(),
            category: Some(category.to_string()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            price: None,
            created_at: Utc::now() - Duration::hours(age_hours),
        }
    }

    #[tokio::test]
    async fn test_aggregate_counts_respects_exclusions_and_limit() {
        let store = MemoryInteractionStore::with_interactions(vec![
            Interaction::new("u1", "p1", "view"),
            Interaction::new("u2", "p2", "view"),
            Interaction::new("u3", "p2", "like"),
            Interaction::new("u3", "p3", "like"),
            Interaction::new("u4", "p3", "like"),
            Interaction::new("u4", "p3", "view"),
        ]);

        let all = store
            .aggregate_counts_by_product(&HashSet::new(), 10)
            .await
            .unwrap();
        assert_eq!(
            all,
            vec![
                ("p3".to_string(), 3),
                ("p2".to_string(), 2),
                ("p1".to_string(), 1)
            ]
        );

        let exclude: HashSet<String> = ["p3".to_string()].into_iter().collect();
        let filtered = store.aggregate_counts_by_product(&exclude, 1).await.unwrap();
        assert_eq!(filtered, vec![("p2".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_record_appends_to_log() {
        let store = MemoryInteractionStore::new();
        assert_eq!(store.count_by_user("u1").await.unwrap(), 0);

        store.record(Interaction::new("u1", "p1", "like")).await.unwrap();
        store.record(Interaction::new("u1", "p2", "view")).await.unwrap();

        assert_eq!(store.count_by_user("u1").await.unwrap(), 2);
        let liked = store
            .find_by_user_and_kinds("u1", &[InteractionKind::Like])
            .await
            .unwrap();
        assert_eq!(liked.len(), 1);
        assert_eq!(liked[0].product_id, "p1");
    }

    #[tokio::test]
    async fn test_co_interactions_skip_target_user() {
        let store = MemoryInteractionStore::with_interactions(vec![
            Interaction::new("u1", "p1", "view"),
            Interaction::new("u2", "p1", "purchase"),
            Interaction::new("u2", "p9", "purchase"),
        ]);

        let co = store
            .find_co_interactions("u1", &["p1".to_string()])
            .await
            .unwrap();
        assert_eq!(co.len(), 1);
        assert_eq!(co[0].user_id, "u2");
    }

    #[tokio::test]
    async fn test_category_or_tag_query() {
        let store = MemoryProductStore::with_products(vec![
            product("p1", "books", &["fiction"], 1),
            product("p2", "garden", &["fiction"], 2),
            product("p3", "garden", &["tools"], 3),
        ]);

        let categories: HashSet<String> = ["books".to_string()].into_iter().collect();
        let tags: HashSet<String> = ["fiction".to_string()].into_iter().collect();
        let exclude: HashSet<String> = ["p1".to_string()].into_iter().collect();

        let found = store
            .find_by_category_or_tags(&categories, &tags, &exclude)
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p2"]);
    }

    #[tokio::test]
    async fn test_most_recent_orders_by_creation() {
        let store = MemoryProductStore::with_products(vec![
            product("old", "a", &[], 48),
            product("new", "a", &[], 1),
            product("mid", "a", &[], 12),
        ]);

        let recent = store.most_recent(2, &HashSet::new()).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[tokio::test]
    async fn test_cache_put_overwrites() {
        let cache = MemoryRecommendationCache::new();
        cache
            .put(
                "u1",
                vec![StoredRecommendation {
                    product_id: "p1".into(),
                    score: 1.0,
                    reason: None,
                }],
            )
            .await
            .unwrap();
        cache.put("u1", Vec::new()).await.unwrap();

        let record = cache.get("u1").await.unwrap().unwrap();
        assert!(record.recommendations.is_empty());
        assert_eq!(cache.len(), 1);
    }
}
