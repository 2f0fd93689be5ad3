//! Redis-backed recommendation cache
//!
//! One JSON document per user under `recommendations:{user_id}`. The key TTL
//! only bounds how long stale lists linger; freshness is decided by the
//! record's `generated_at`.

use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::{debug, warn};

use super::RecommendationCache;
use crate::error::{AppError, Result};
use crate::models::{RecommendationRecord, StoredRecommendation};
use async_trait::async_trait;

const KEY_PREFIX: &str = "recommendations:";

#[derive(Clone)]
pub struct RedisRecommendationCache {
    client: Arc<ConnectionManager>,
    retention_secs: u64,
}

impl RedisRecommendationCache {
    pub async fn new(redis_url: &str, retention_secs: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::Cache(format!("Failed to create Redis client: {}", e)))?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Cache(format!("Failed to create Redis connection: {}", e)))?;

        Ok(Self {
            client: Arc::new(manager),
            retention_secs,
        })
    }

    pub async fn ping(&self) -> Result<()> {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.client.as_ref().clone())
            .await
            .map_err(|e| {
                warn!("Redis PING failed: {}", e);
                AppError::Cache(format!("Redis health check failed: {}", e))
            })?;
        Ok(())
    }

    fn key(user_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, user_id)
    }
}

#[async_trait]
impl RecommendationCache for RedisRecommendationCache {
    async fn get(&self, user_id: &str) -> Result<Option<RecommendationRecord>> {
        let key = Self::key(user_id);

        let value: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut self.client.as_ref().clone())
            .await
            .map_err(|e| {
                warn!("Redis GET failed for {}: {}", key, e);
                AppError::from(e)
            })?;

        match value {
            Some(json) => {
                let record = serde_json::from_str::<RecommendationRecord>(&json)?;
                debug!("Cache hit for {}", key);
                Ok(Some(record))
            }
            None => {
                debug!("Cache miss for {}", key);
                Ok(None)
            }
        }
    }

    async fn put(
        &self,
        user_id: &str,
        recommendations: Vec<StoredRecommendation>,
    ) -> Result<RecommendationRecord> {
        let key = Self::key(user_id);
        let record = RecommendationRecord::new(user_id, recommendations);
        let json = serde_json::to_string(&record)?;

        redis::cmd("SETEX")
            .arg(&key)
            .arg(self.retention_secs)
            .arg(&json)
            .query_async::<_, ()>(&mut self.client.as_ref().clone())
            .await
            .map_err(|e| {
                warn!("Redis SETEX failed for {}: {}", key, e);
                AppError::from(e)
            })?;

        debug!(
            "Cached {} recommendations for {} with retention={}s",
            record.recommendations.len(),
            user_id,
            self.retention_secs
        );
        Ok(record)
    }
}
