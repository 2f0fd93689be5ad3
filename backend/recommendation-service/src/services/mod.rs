pub mod content_based;
pub mod engine;
pub mod hybrid;
pub mod item_based;
pub mod popularity;
pub mod recommendation;
pub mod similarity;
pub mod user_based;
pub mod weighting;

pub use content_based::ContentBasedRecommender;
pub use engine::{RecommendationEngine, RecommendationStrategy};
pub use hybrid::HybridRecommender;
pub use item_based::ItemBasedRecommender;
pub use popularity::PopularityFallback;
pub use recommendation::{RecommendationResponse, RecommendationService, NO_RECOMMENDATIONS_MESSAGE};
pub use similarity::{cosine_similarity, jaccard_similarity, SimilarityEngine, SimilarityMetric};
pub use user_based::UserBasedRecommender;
pub use weighting::{InteractionWeights, WeightVector};

use crate::error::Result;
use crate::models::RecommendedProduct;
use crate::store::{InteractionStore, ProductStore, UserStore};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// A single candidate-producing path.
///
/// Implementations never surface "no data": they fall through to the
/// popularity chain themselves. An `Err` means even that chain failed.
#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(&self, user_id: &str, limit: usize) -> Result<Vec<RecommendedProduct>>;
}

/// Read handles on the external stores, shared by every recommender.
#[derive(Clone)]
pub struct Stores {
    pub interactions: Arc<dyn InteractionStore>,
    pub products: Arc<dyn ProductStore>,
    pub users: Arc<dyn UserStore>,
}

impl Stores {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        products: Arc<dyn ProductStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            interactions,
            products,
            users,
        }
    }

    /// Every product the user interacted with, any type.
    pub async fn interacted_products(&self, user_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .interactions
            .find_by_user(user_id)
            .await?
            .into_iter()
            .map(|i| i.product_id)
            .collect())
    }

    /// Stated preferences; an unknown user has none.
    pub async fn preferences(&self, user_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .users
            .find_by_id(user_id)
            .await?
            .map(|u| u.preferences.into_iter().collect())
            .unwrap_or_default())
    }
}

/// Result of one recommender pass before fallback handling.
pub(crate) enum Generated {
    Ranked(Vec<RecommendedProduct>),
    /// Nothing to offer; carries the exclusion set for the popularity chain.
    NoCandidates(HashSet<String>),
}

/// Turn a recommender pass into a final list, degrading to the popularity
/// chain on "no candidates" and on store failures alike.
pub(crate) async fn settle(
    stage: &'static str,
    user_id: &str,
    limit: usize,
    outcome: Result<Generated>,
    stores: &Stores,
    popularity: &PopularityFallback,
) -> Result<Vec<RecommendedProduct>> {
    match outcome {
        Ok(Generated::Ranked(recommendations)) => Ok(recommendations),
        Ok(Generated::NoCandidates(exclude)) => {
            tracing::info!(
                user_id = %user_id,
                stage = stage,
                "No candidates, using popular products fallback"
            );
            popularity.get_popular(limit, &exclude).await
        }
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                stage = stage,
                error = %e,
                "Recommender failed, degrading to popular products"
            );
            crate::metrics::record_stage_failure(stage);

            let exclude = stores
                .interacted_products(user_id)
                .await
                .unwrap_or_default();
            popularity.get_popular(limit, &exclude).await
        }
    }
}
