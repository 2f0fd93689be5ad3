pub mod health;
pub mod recommendation;

// Re-export handlers for convenience
pub use health::{health_check, metrics_endpoint};
pub use recommendation::{
    get_recommendations, get_similar_users, regenerate_recommendations, save_recommendations,
    LimitQuery, RecommendationHandlerState, RecommendationQuery, SaveRecommendationsRequest,
};
