//! Ports to the systems that own users, products, interactions and the
//! recommendation cache.
//!
//! The engine only reads through these traits; every adapter is injected as an
//! `Arc<dyn ...>` so tests can swap in the in-memory versions or mocks.

pub mod memory;
pub mod postgres;
pub mod redis_cache;

use crate::error::Result;
use crate::models::{
    Interaction, InteractionKind, Product, RecommendationRecord, StoredRecommendation, User,
};
use async_trait::async_trait;
use std::collections::HashSet;

#[cfg(test)]
use mockall::automock;

pub use memory::{
    MemoryInteractionStore, MemoryProductStore, MemoryRecommendationCache, MemoryUserStore,
};
pub use postgres::{PgInteractionStore, PgProductStore, PgUserStore};
pub use redis_cache::RedisRecommendationCache;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Every interaction of one user, oldest first.
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Interaction>>;

    /// Interactions of the given users, in log order.
    async fn find_by_users(&self, user_ids: &[String]) -> Result<Vec<Interaction>>;

    /// Interactions by users other than `user_id` on any of `product_ids`.
    async fn find_co_interactions(
        &self,
        user_id: &str,
        product_ids: &[String],
    ) -> Result<Vec<Interaction>>;

    async fn count_by_user(&self, user_id: &str) -> Result<u64>;

    /// `(product_id, interaction count)` sorted by count descending, skipping
    /// `exclude`, at most `limit` rows.
    async fn aggregate_counts_by_product(
        &self,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<(String, u64)>>;

    async fn record(&self, interaction: Interaction) -> Result<()>;

    async fn find_by_user_and_kinds(
        &self,
        user_id: &str,
        kinds: &[InteractionKind],
    ) -> Result<Vec<Interaction>> {
        let interactions = self.find_by_user(user_id).await?;
        Ok(interactions
            .into_iter()
            .filter(|i| kinds.contains(&i.kind))
            .collect())
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Product>>;

    /// Products outside `exclude` whose category is in `categories` or whose
    /// tags intersect `tags`.
    async fn find_by_category_or_tags(
        &self,
        categories: &HashSet<String>,
        tags: &HashSet<String>,
        exclude: &HashSet<String>,
    ) -> Result<Vec<Product>>;

    /// Newest products first.
    async fn most_recent(&self, limit: usize, exclude: &HashSet<String>) -> Result<Vec<Product>>;

    /// Any products, no ordering guarantee.
    async fn any(&self, limit: usize) -> Result<Vec<Product>>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecommendationCache: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<RecommendationRecord>>;

    /// Replace the user's record, stamping it with the current time.
    async fn put(
        &self,
        user_id: &str,
        recommendations: Vec<StoredRecommendation>,
    ) -> Result<RecommendationRecord>;
}
