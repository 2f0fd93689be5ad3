//! Popularity fallback chain.
//!
//! Tiers, each tried only when the previous one produced nothing:
//! 1. interaction counts per product, minus exclusions (`popular`)
//! 2. interaction counts per product, no exclusions (`popular_fallback`)
//! 3. newest products, minus exclusions (`recent`)
//! 4. newest products, no exclusions (`recent_all`)
//!
//! Any store error inside the chain drops to the ultimate fallback: whatever
//! the catalog hands back first (`ultimate_fallback`). Only a failure there
//! reaches the caller.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::metrics;
use crate::models::{RecommendationReason, RecommendedProduct};
use crate::store::{InteractionStore, ProductStore};

/// Score attached to `recent` items.
pub const RECENT_SCORE: f64 = 0.5;
/// Score attached to `recent_all` and `ultimate_fallback` items.
pub const PLACEHOLDER_SCORE: f64 = 0.1;

pub struct PopularityFallback {
    interactions: Arc<dyn InteractionStore>,
    products: Arc<dyn ProductStore>,
}

impl PopularityFallback {
    pub fn new(interactions: Arc<dyn InteractionStore>, products: Arc<dyn ProductStore>) -> Self {
        Self {
            interactions,
            products,
        }
    }

    pub async fn get_popular(
        &self,
        limit: usize,
        exclude: &HashSet<String>,
    ) -> Result<Vec<RecommendedProduct>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        info!(
            limit = limit,
            excluded = exclude.len(),
            "Resolving popular products"
        );

        match self.cascade(limit, exclude).await {
            Ok(recommendations) => Ok(recommendations),
            Err(e) => {
                error!("Popularity chain failed, using ultimate fallback: {}", e);
                metrics::record_stage_failure("popularity");
                metrics::record_fallback_tier(RecommendationReason::UltimateFallback.as_str());

                let products = self.products.any(limit).await.map_err(|e| {
                    error!("Ultimate fallback failed: {}", e);
                    e
                })?;

                info!(count = products.len(), "Ultimate fallback returned products");
                Ok(products
                    .into_iter()
                    .map(|p| {
                        RecommendedProduct::from_product(
                            p,
                            PLACEHOLDER_SCORE,
                            RecommendationReason::UltimateFallback,
                        )
                    })
                    .collect())
            }
        }
    }

    async fn cascade(
        &self,
        limit: usize,
        exclude: &HashSet<String>,
    ) -> Result<Vec<RecommendedProduct>> {
        let counts = self
            .interactions
            .aggregate_counts_by_product(exclude, limit)
            .await?;
        let popular = self
            .resolve_counts(counts, RecommendationReason::Popular)
            .await?;
        if !popular.is_empty() {
            return Ok(self.finish(popular));
        }

        // Without exclusions tier 2 would repeat tier 1 verbatim
        if !exclude.is_empty() {
            warn!("No popular products after exclusions, trying without exclusions");
            let counts = self
                .interactions
                .aggregate_counts_by_product(&HashSet::new(), limit)
                .await?;
            let popular = self
                .resolve_counts(counts, RecommendationReason::PopularFallback)
                .await?;
            if !popular.is_empty() {
                return Ok(self.finish(popular));
            }
        }

        warn!("No popular products at all, using recent products");
        let recent = self.products.most_recent(limit, exclude).await?;
        if !recent.is_empty() {
            return Ok(self.finish(
                recent
                    .into_iter()
                    .map(|p| {
                        RecommendedProduct::from_product(p, RECENT_SCORE, RecommendationReason::Recent)
                    })
                    .collect(),
            ));
        }

        if !exclude.is_empty() {
            warn!("No recent products after exclusions, trying all products");
            let recent_all = self.products.most_recent(limit, &HashSet::new()).await?;
            return Ok(self.finish(
                recent_all
                    .into_iter()
                    .map(|p| {
                        RecommendedProduct::from_product(
                            p,
                            PLACEHOLDER_SCORE,
                            RecommendationReason::RecentAll,
                        )
                    })
                    .collect(),
            ));
        }

        Ok(Vec::new())
    }

    /// Attach catalog records to `(product_id, count)` rows, keeping count
    /// order and dropping ids the catalog no longer knows.
    async fn resolve_counts(
        &self,
        counts: Vec<(String, u64)>,
        reason: RecommendationReason,
    ) -> Result<Vec<RecommendedProduct>> {
        if counts.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = counts.iter().map(|(id, _)| id.clone()).collect();
        let mut products: HashMap<String, _> = self
            .products
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        Ok(counts
            .into_iter()
            .filter_map(|(id, count)| {
                products
                    .remove(&id)
                    .map(|p| RecommendedProduct::from_product(p, count as f64, reason))
            })
            .collect())
    }

    fn finish(&self, recommendations: Vec<RecommendedProduct>) -> Vec<RecommendedProduct> {
        if let Some(first) = recommendations.first() {
            metrics::record_fallback_tier(first.reason.as_str());
            info!(
                tier = first.reason.as_str(),
                count = recommendations.len(),
                "Popularity fallback resolved"
            );
        }
        recommendations
    }
}
