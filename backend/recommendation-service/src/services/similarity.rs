//! User-user similarity and neighbor discovery.
//!
//! Only users who co-interacted with at least one of the target's products are
//! compared; everyone else has zero overlap and cannot score above zero under
//! either metric.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use super::weighting::{InteractionWeights, WeightVector};
use crate::error::Result;
use crate::models::{Interaction, SimilarUser};
use crate::store::InteractionStore;

/// Similarity metric for collaborative filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityMetric {
    /// Over weighted interaction vectors (captures intensity)
    #[default]
    Cosine,
    /// Over raw product sets (overlap only)
    Jaccard,
}

impl SimilarityMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Jaccard => "jaccard",
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "jaccard" => Ok(Self::Jaccard),
            other => Err(other.to_string()),
        }
    }
}

/// |A ∩ B| / |A ∪ B|, 0 when both sets are empty.
pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Cosine over the union of product keys; absent keys count as zero weight.
///
/// Formula: cos(A, B) = (A · B) / (||A|| × ||B||)
pub fn cosine_similarity(a: &WeightVector, b: &WeightVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot_product: f64 = small
        .iter()
        .filter_map(|(product, weight)| large.get(product).map(|other| weight * other))
        .sum();

    let norm_a: f64 = a.values().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        // Guard against float drift pushing identical vectors past 1.0
        (dot_product / (norm_a * norm_b)).clamp(0.0, 1.0)
    }
}

/// A neighbor together with the weighted vector it was scored on.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub user: SimilarUser,
    pub vector: WeightVector,
}

pub struct SimilarityEngine {
    interactions: Arc<dyn InteractionStore>,
    weights: Arc<InteractionWeights>,
    metric: SimilarityMetric,
}

impl SimilarityEngine {
    pub fn new(interactions: Arc<dyn InteractionStore>, weights: Arc<InteractionWeights>) -> Self {
        Self {
            interactions,
            weights,
            metric: SimilarityMetric::Cosine,
        }
    }

    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    /// Top `top_n` users most similar to `user_id`, most similar first.
    pub async fn find_similar_users(&self, user_id: &str, top_n: usize) -> Result<Vec<SimilarUser>> {
        let target = self.interactions.find_by_user(user_id).await?;
        let neighbors = self.neighborhood(user_id, &target, top_n).await?;
        Ok(neighbors.into_iter().map(|n| n.user).collect())
    }

    /// Neighbor discovery for a target whose interactions are already loaded.
    ///
    /// Ties keep candidate discovery order (first co-interaction in the log).
    pub async fn neighborhood(
        &self,
        user_id: &str,
        target_interactions: &[Interaction],
        top_n: usize,
    ) -> Result<Vec<Neighbor>> {
        if target_interactions.is_empty() || top_n == 0 {
            debug!(user_id = %user_id, "No interactions, no neighbors possible");
            return Ok(Vec::new());
        }

        let target_vector = self.weights.vector(target_interactions);
        let target_products: Vec<String> = target_vector.keys().cloned().collect();

        let co_interactions = self
            .interactions
            .find_co_interactions(user_id, &target_products)
            .await?;

        let mut candidate_ids: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for interaction in &co_interactions {
            if interaction.user_id != user_id && seen.insert(interaction.user_id.as_str()) {
                candidate_ids.push(interaction.user_id.clone());
            }
        }

        if candidate_ids.is_empty() {
            info!(user_id = %user_id, "No users share an interacted product");
            return Ok(Vec::new());
        }

        let mut by_user: HashMap<String, Vec<Interaction>> = HashMap::new();
        for interaction in self.interactions.find_by_users(&candidate_ids).await? {
            by_user
                .entry(interaction.user_id.clone())
                .or_default()
                .push(interaction);
        }

        let target_set: HashSet<String> = target_products.iter().cloned().collect();
        let mut neighbors: Vec<Neighbor> = Vec::new();

        for candidate_id in candidate_ids {
            let interactions = by_user.remove(&candidate_id).unwrap_or_default();
            let vector = self.weights.vector(&interactions);

            let similarity = match self.metric {
                SimilarityMetric::Cosine => cosine_similarity(&target_vector, &vector),
                SimilarityMetric::Jaccard => {
                    let products: HashSet<String> = vector.keys().cloned().collect();
                    jaccard_similarity(&target_set, &products)
                }
            };

            if similarity > 0.0 {
                neighbors.push(Neighbor {
                    user: SimilarUser {
                        user_id: candidate_id,
                        similarity,
                        interaction_count: interactions.len(),
                    },
                    vector,
                });
            }
        }

        // Stable sort keeps discovery order among equal similarities
        neighbors.sort_by(|a, b| {
            b.user
                .similarity
                .partial_cmp(&a.user.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        neighbors.truncate(top_n);

        info!(
            user_id = %user_id,
            neighbors = neighbors.len(),
            top_similarity = neighbors.first().map(|n| n.user.similarity).unwrap_or(0.0),
            "Similar users computed"
        );

        Ok(neighbors)
    }
}
