use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::services::SimilarityMetric;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("invalid engine configuration: {0}")]
    Engine(#[from] envy::Error),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: Option<RedisConfig>,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// How long a cached list is kept at all; freshness is decided separately.
    pub retention_secs: u64,
}

/// Engine policy knobs, read from `RECOMMENDATION_*` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_neighbor_count")]
    pub neighbor_count: usize,
    #[serde(default = "default_user_based_share")]
    pub user_based_share: f64,
    #[serde(default = "default_item_based_share")]
    pub item_based_share: f64,
    /// Factor applied to an item-based score merged into an existing entry.
    #[serde(default = "default_item_merge_dampening")]
    pub item_merge_dampening: f64,
    #[serde(default = "default_category_bonus")]
    pub category_bonus: f64,
    #[serde(default = "default_tag_bonus")]
    pub tag_bonus: f64,
    #[serde(default = "default_item_category_points")]
    pub item_category_points: f64,
    #[serde(default = "default_item_tag_points")]
    pub item_tag_points: f64,
    #[serde(default = "default_cache_max_age_hours")]
    pub cache_max_age_hours: i64,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,
    #[serde(default = "default_weight_purchase")]
    pub weight_purchase: f64,
    #[serde(default = "default_weight_like")]
    pub weight_like: f64,
    #[serde(default = "default_weight_view")]
    pub weight_view: f64,
    #[serde(default = "default_weight_unknown")]
    pub weight_unknown: f64,
    /// `name=weight` pairs separated by commas, e.g. `share=4,comment=2`.
    #[serde(default)]
    pub extra_weights: String,
    #[serde(default)]
    pub normalize_scores: bool,
    /// `cosine` or `jaccard`.
    #[serde(default = "default_similarity_metric")]
    pub similarity_metric: String,
}

fn default_neighbor_count() -> usize {
    10
}
fn default_user_based_share() -> f64 {
    0.7
}
fn default_item_based_share() -> f64 {
    0.3
}
fn default_item_merge_dampening() -> f64 {
    0.5
}
fn default_category_bonus() -> f64 {
    1.2
}
fn default_tag_bonus() -> f64 {
    0.1
}
fn default_item_category_points() -> f64 {
    2.0
}
fn default_item_tag_points() -> f64 {
    1.0
}
fn default_cache_max_age_hours() -> i64 {
    24
}
fn default_limit() -> usize {
    10
}
fn default_max_limit() -> usize {
    100
}
fn default_generation_timeout_ms() -> u64 {
    5_000
}
fn default_weight_purchase() -> f64 {
    5.0
}
fn default_weight_like() -> f64 {
    3.0
}
fn default_weight_view() -> f64 {
    1.0
}
fn default_weight_unknown() -> f64 {
    1.0
}
fn default_similarity_metric() -> String {
    SimilarityMetric::Cosine.as_str().to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            neighbor_count: default_neighbor_count(),
            user_based_share: default_user_based_share(),
            item_based_share: default_item_based_share(),
            item_merge_dampening: default_item_merge_dampening(),
            category_bonus: default_category_bonus(),
            tag_bonus: default_tag_bonus(),
            item_category_points: default_item_category_points(),
            item_tag_points: default_item_tag_points(),
            cache_max_age_hours: default_cache_max_age_hours(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            generation_timeout_ms: default_generation_timeout_ms(),
            weight_purchase: default_weight_purchase(),
            weight_like: default_weight_like(),
            weight_view: default_weight_view(),
            weight_unknown: default_weight_unknown(),
            extra_weights: String::new(),
            normalize_scores: false,
            similarity_metric: default_similarity_metric(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: EngineConfig = envy::prefixed("RECOMMENDATION_").from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn cache_max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_max_age_hours)
    }

    /// Clamp a caller-supplied limit into `[1, max_limit]`.
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }

    /// Parse `extra_weights` into `(interaction type, weight)` pairs.
    pub fn parsed_extra_weights(&self) -> Result<Vec<(String, f64)>, ConfigError> {
        self.extra_weights
            .split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (name, weight) = pair.split_once('=').ok_or_else(|| ConfigError::Invalid {
                    name: "RECOMMENDATION_EXTRA_WEIGHTS",
                    value: pair.to_string(),
                })?;
                let weight: f64 = weight.trim().parse().map_err(|_| ConfigError::Invalid {
                    name: "RECOMMENDATION_EXTRA_WEIGHTS",
                    value: pair.to_string(),
                })?;
                Ok((name.trim().to_ascii_lowercase(), weight))
            })
            .collect()
    }

    pub fn parsed_similarity_metric(&self) -> Result<SimilarityMetric, ConfigError> {
        self.similarity_metric
            .parse()
            .map_err(|value| ConfigError::Invalid {
                name: "RECOMMENDATION_SIMILARITY_METRIC",
                value,
            })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let shares = [
            ("RECOMMENDATION_USER_BASED_SHARE", self.user_based_share),
            ("RECOMMENDATION_ITEM_BASED_SHARE", self.item_based_share),
            (
                "RECOMMENDATION_ITEM_MERGE_DAMPENING",
                self.item_merge_dampening,
            ),
        ];
        for (name, value) in shares {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    name,
                    value: value.to_string(),
                });
            }
        }

        if self.neighbor_count == 0 {
            return Err(ConfigError::Invalid {
                name: "RECOMMENDATION_NEIGHBOR_COUNT",
                value: "0".to_string(),
            });
        }

        self.parsed_similarity_metric()?;
        self.parsed_extra_weights().map(|_| ())
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let redis = match env::var("REDIS_URL") {
            Ok(url) if !url.trim().is_empty() => Some(RedisConfig {
                url,
                retention_secs: parse_var("REDIS_RETENTION_SECS", 7 * 24 * 3600)?,
            }),
            _ => None,
        };

        Ok(Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                port: parse_var("APP_PORT", 8080)?,
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
                run_migrations: parse_var("RUN_MIGRATIONS", false)?,
            },
            redis,
            engine: EngineConfig::from_env()?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults_match_policy() {
        let config = EngineConfig::default();
        assert_eq!(config.neighbor_count, 10);
        assert_eq!(config.user_based_share, 0.7);
        assert_eq!(config.item_based_share, 0.3);
        assert_eq!(config.item_merge_dampening, 0.5);
        assert_eq!(config.cache_max_age_hours, 24);
        assert!(!config.normalize_scores);
    }

    #[test]
    fn test_clamp_limit() {
        let config = EngineConfig::default();
        assert_eq!(config.clamp_limit(None), 10);
        assert_eq!(config.clamp_limit(Some(0)), 1);
        assert_eq!(config.clamp_limit(Some(500)), 100);
        assert_eq!(config.clamp_limit(Some(25)), 25);
    }

    #[test]
    fn test_parsed_extra_weights() {
        let config = EngineConfig {
            extra_weights: "share=4, Comment = 2.5".to_string(),
            ..EngineConfig::default()
        };
        let weights = config.parsed_extra_weights().unwrap();
        assert_eq!(
            weights,
            vec![("share".to_string(), 4.0), ("comment".to_string(), 2.5)]
        );

        let broken = EngineConfig {
            extra_weights: "share".to_string(),
            ..EngineConfig::default()
        };
        assert!(broken.parsed_extra_weights().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_share() {
        let config = EngineConfig {
            user_based_share: 1.5,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_similarity_metric_knob() {
        assert_eq!(
            EngineConfig::default().parsed_similarity_metric().unwrap(),
            SimilarityMetric::Cosine
        );
        let config = EngineConfig {
            similarity_metric: "Jaccard".to_string(),
            ..EngineConfig::default()
        };
        assert_eq!(config.parsed_similarity_metric().unwrap(), SimilarityMetric::Jaccard);

        let broken = EngineConfig {
            similarity_metric: "euclid".to_string(),
            ..EngineConfig::default()
        };
        assert!(broken.validate().is_err());
    }
}
