use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Kind of user → product action.
///
/// The set is open: interaction types are managed outside this service, so any
/// unrecognized name is carried through as `Other` and weighted by the
/// fallback weight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InteractionKind {
    View,
    Like,
    Purchase,
    Other(String),
}

impl InteractionKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::View => "view",
            Self::Like => "like",
            Self::Purchase => "purchase",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl From<String> for InteractionKind {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "view" => Self::View,
            "like" => Self::Like,
            "purchase" => Self::Purchase,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<&str> for InteractionKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<InteractionKind> for String {
    fn from(kind: InteractionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: String,
    pub product_id: String,
    pub kind: InteractionKind,
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    pub fn new(
        user_id: impl Into<String>,
        product_id: impl Into<String>,
        kind: impl Into<InteractionKind>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            product_id: product_id.into(),
            kind: kind.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub preferences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub price: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Provenance of a recommended product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationReason {
    CollaborativeFiltering,
    ItemBased,
    ContentBased,
    Popular,
    PopularFallback,
    Recent,
    RecentAll,
    UltimateFallback,
    /// Stored through the manual save endpoint without a provenance of its own.
    Manual,
}

impl RecommendationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollaborativeFiltering => "collaborative_filtering",
            Self::ItemBased => "item_based",
            Self::ContentBased => "content_based",
            Self::Popular => "popular",
            Self::PopularFallback => "popular_fallback",
            Self::Recent => "recent",
            Self::RecentAll => "recent_all",
            Self::UltimateFallback => "ultimate_fallback",
            Self::Manual => "manual",
        }
    }

    /// True for every tier of the popularity fallback chain.
    pub fn is_popularity(&self) -> bool {
        matches!(
            self,
            Self::Popular
                | Self::PopularFallback
                | Self::Recent
                | Self::RecentAll
                | Self::UltimateFallback
        )
    }
}

impl fmt::Display for RecommendationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scored candidate produced by any recommender path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedProduct {
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<Product>,
    pub score: f64,
    pub reason: RecommendationReason,
}

impl RecommendedProduct {
    pub fn from_product(product: Product, score: f64, reason: RecommendationReason) -> Self {
        Self {
            product_id: product.id.clone(),
            product: Some(product),
            score,
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarUser {
    pub user_id: String,
    pub similarity: f64,
    pub interaction_count: usize,
}

/// Cached entry: product details are re-hydrated on read, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecommendation {
    pub product_id: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RecommendationReason>,
}

impl From<&RecommendedProduct> for StoredRecommendation {
    fn from(rec: &RecommendedProduct) -> Self {
        Self {
            product_id: rec.product_id.clone(),
            score: rec.score,
            reason: Some(rec.reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub user_id: String,
    pub recommendations: Vec<StoredRecommendation>,
    pub generated_at: DateTime<Utc>,
}

impl RecommendationRecord {
    pub fn new(user_id: impl Into<String>, recommendations: Vec<StoredRecommendation>) -> Self {
        Self {
            user_id: user_id.into(),
            recommendations,
            generated_at: Utc::now(),
        }
    }

    /// A record stays fresh while it is no older than `max_age`.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.generated_at <= max_age
    }
}

/// Sort by score descending; equal scores fall back to ascending product id.
pub fn rank_by_score(recommendations: &mut [RecommendedProduct]) {
    recommendations.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
}

/// Normalize a score to [0, 1] range
pub fn normalize_score(score: f64, min: f64, max: f64) -> f64 {
    if max - min < f64::EPSILON {
        1.0
    } else {
        ((score - min) / (max - min)).clamp(0.0, 1.0)
    }
}

/// Min-max normalize a whole list in place.
pub fn normalize_scores(recommendations: &mut [RecommendedProduct]) {
    let (min, max) = recommendations
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
            (lo.min(r.score), hi.max(r.score))
        });

    for rec in recommendations.iter_mut() {
        rec.score = normalize_score(rec.score, min, max);
    }
}
