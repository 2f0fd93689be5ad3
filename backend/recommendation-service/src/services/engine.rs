use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{
    ContentBasedRecommender, HybridRecommender, InteractionWeights, ItemBasedRecommender,
    PopularityFallback, Recommender, SimilarityEngine, Stores, UserBasedRecommender,
};
use crate::config::{ConfigError, EngineConfig};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{RecommendedProduct, SimilarUser};

/// Which candidate path answers a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStrategy {
    #[default]
    Hybrid,
    UserBased,
    ItemBased,
    ContentBased,
    Popular,
}

impl RecommendationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::UserBased => "user_based",
            Self::ItemBased => "item_based",
            Self::ContentBased => "content_based",
            Self::Popular => "popular",
        }
    }
}

impl fmt::Display for RecommendationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecommendationStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "hybrid" => Ok(Self::Hybrid),
            "user_based" | "collaborative" => Ok(Self::UserBased),
            "item_based" => Ok(Self::ItemBased),
            "content_based" | "content" => Ok(Self::ContentBased),
            "popular" => Ok(Self::Popular),
            other => Err(AppError::BadRequest(format!("unknown strategy: {}", other))),
        }
    }
}

/// Wires the recommenders over one set of stores and dispatches by strategy.
pub struct RecommendationEngine {
    stores: Stores,
    similarity: Arc<SimilarityEngine>,
    popularity: Arc<PopularityFallback>,
    user_based: Arc<UserBasedRecommender>,
    item_based: Arc<ItemBasedRecommender>,
    content_based: ContentBasedRecommender,
    hybrid: HybridRecommender,
    config: EngineConfig,
}

impl RecommendationEngine {
    pub fn new(stores: Stores, config: EngineConfig) -> std::result::Result<Self, ConfigError> {
        let weights = Arc::new(InteractionWeights::from_config(&config)?);

        let similarity = Arc::new(
            SimilarityEngine::new(stores.interactions.clone(), weights)
                .with_metric(config.parsed_similarity_metric()?),
        );
        let popularity = Arc::new(PopularityFallback::new(
            stores.interactions.clone(),
            stores.products.clone(),
        ));
        let user_based = Arc::new(
            UserBasedRecommender::new(
                stores.clone(),
                similarity.clone(),
                popularity.clone(),
                config.neighbor_count,
            )
            .with_preference_bonus(config.category_bonus, config.tag_bonus),
        );
        let item_based = Arc::new(
            ItemBasedRecommender::new(stores.clone(), popularity.clone())
                .with_points(config.item_category_points, config.item_tag_points),
        );
        let content_based = ContentBasedRecommender::new(stores.clone(), popularity.clone());
        let hybrid = HybridRecommender::new(
            stores.clone(),
            user_based.clone(),
            item_based.clone(),
            popularity.clone(),
            &config,
        );

        info!(
            neighbor_count = config.neighbor_count,
            similarity_metric = similarity.metric().as_str(),
            user_based_share = config.user_based_share,
            item_based_share = config.item_based_share,
            normalize_scores = config.normalize_scores,
            "Recommendation engine initialized"
        );

        Ok(Self {
            stores,
            similarity,
            popularity,
            user_based,
            item_based,
            content_based,
            hybrid,
            config,
        })
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ranked recommendations from the chosen path.
    ///
    /// No-data conditions never error; an `Err` means the popularity chain
    /// itself failed.
    pub async fn recommend(
        &self,
        user_id: &str,
        limit: usize,
        strategy: RecommendationStrategy,
    ) -> Result<Vec<RecommendedProduct>> {
        let start = Instant::now();

        let result = match strategy {
            RecommendationStrategy::Hybrid => self.hybrid.recommend(user_id, limit).await,
            RecommendationStrategy::UserBased => self.user_based.recommend(user_id, limit).await,
            RecommendationStrategy::ItemBased => self.item_based.recommend(user_id, limit).await,
            RecommendationStrategy::ContentBased => {
                self.content_based.recommend(user_id, limit).await
            }
            RecommendationStrategy::Popular => self.popular_for(user_id, limit).await,
        };

        metrics::record_generation_duration(strategy.as_str(), start.elapsed());
        if let Ok(recommendations) = &result {
            for rec in recommendations {
                metrics::record_served(rec.reason.as_str(), 1);
            }
            debug!(
                user_id = %user_id,
                strategy = strategy.as_str(),
                count = recommendations.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Recommendations generated"
            );
        }

        result
    }

    pub async fn hybrid(&self, user_id: &str, limit: usize) -> Result<Vec<RecommendedProduct>> {
        self.recommend(user_id, limit, RecommendationStrategy::Hybrid)
            .await
    }

    pub async fn find_similar_users(&self, user_id: &str, limit: usize) -> Result<Vec<SimilarUser>> {
        self.similarity.find_similar_users(user_id, limit).await
    }

    /// Popular products minus what the user already saw, best effort.
    async fn popular_for(&self, user_id: &str, limit: usize) -> Result<Vec<RecommendedProduct>> {
        let exclude = self
            .stores
            .interacted_products(user_id)
            .await
            .unwrap_or_default();
        self.popularity.get_popular(limit, &exclude).await
    }
}
