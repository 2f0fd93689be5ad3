use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recommendation_service::config::Config;
use recommendation_service::db;
use recommendation_service::handlers::{
    get_recommendations, get_similar_users, health_check, metrics_endpoint,
    regenerate_recommendations, save_recommendations, RecommendationHandlerState,
};
use recommendation_service::services::{RecommendationEngine, RecommendationService, Stores};
use recommendation_service::store::{
    MemoryRecommendationCache, PgInteractionStore, PgProductStore, PgUserStore,
    RecommendationCache, RedisRecommendationCache,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},actix_web=info", config.app.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(
        "Starting recommendation-service v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("Environment: {}", config.app.env);

    // Initialize database
    let db_pool = db::init_pool(&config.database)
        .await
        .context("Failed to create database pool")?;

    // Initialize cache: Redis when configured, in-process otherwise
    let cache: Arc<dyn RecommendationCache> = match &config.redis {
        Some(redis) => {
            let cache = RedisRecommendationCache::new(&redis.url, redis.retention_secs)
                .await
                .context("Failed to connect to Redis")?;
            if let Err(e) = cache.ping().await {
                tracing::warn!("Redis is not answering yet: {}", e);
            }
            tracing::info!("Using Redis recommendation cache");
            Arc::new(cache)
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-process recommendation cache");
            Arc::new(MemoryRecommendationCache::new())
        }
    };

    // Initialize recommendation engine
    let stores = Stores::new(
        Arc::new(PgInteractionStore::new(db_pool.clone())),
        Arc::new(PgProductStore::new(db_pool.clone())),
        Arc::new(PgUserStore::new(db_pool.clone())),
    );
    let engine = RecommendationEngine::new(stores, config.engine.clone())
        .context("Invalid engine configuration")?;
    let service = Arc::new(RecommendationService::new(Arc::new(engine), cache));

    let handler_state = web::Data::new(RecommendationHandlerState { service });
    let db_pool = web::Data::new(db_pool);

    let bind_addr = format!("0.0.0.0:{}", config.app.port);
    tracing::info!("HTTP server listening on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(db_pool.clone())
            .app_data(handler_state.clone())
            .route("/health", web::get().to(health_check))
            .route("/metrics", web::get().to(metrics_endpoint))
            .service(regenerate_recommendations)
            .service(get_recommendations)
            .service(save_recommendations)
            .service(get_similar_users)
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await?;

    Ok(())
}
