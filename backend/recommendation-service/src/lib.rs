pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;
pub mod store;

pub use config::{Config, EngineConfig};
pub use error::{AppError, Result};
pub use services::{
    RecommendationEngine, RecommendationResponse, RecommendationService, RecommendationStrategy,
    Stores,
};
