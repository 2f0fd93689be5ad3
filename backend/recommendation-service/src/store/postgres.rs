//! PostgreSQL store adapters
//!
//! Read paths used by the engine plus the interaction append. Schema lives in
//! `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use tracing::error;

use super::{InteractionStore, ProductStore, UserStore};
use crate::error::Result;
use crate::models::{Interaction, InteractionKind, Product, User};

const INTERACTION_COLUMNS: &str = "user_id, product_id, interaction_type, created_at";
const PRODUCT_COLUMNS: &str = "id, name, category, tags, price, created_at";

fn interaction_from_row(row: &PgRow) -> Result<Interaction> {
    let kind: String = row.try_get("interaction_type")?;
    let timestamp: DateTime<Utc> = row.try_get("created_at")?;
    Ok(Interaction {
        user_id: row.try_get("user_id")?,
        product_id: row.try_get("product_id")?,
        kind: InteractionKind::from(kind),
        timestamp,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product> {
    let name: Option<String> = row.try_get("name")?;
    let tags: Option<Vec<String>> = row.try_get("tags")?;
    Ok(Product {
        id: row.try_get("id")?,
        name: name.unwrap_or_default(),
        category: row.try_get("category")?,
        tags: tags.unwrap_or_default(),
        price: row.try_get("price")?,
        created_at: row.try_get("created_at")?,
    })
}

fn to_vec(set: &HashSet<String>) -> Vec<String> {
    set.iter().cloned().collect()
}

#[derive(Clone)]
pub struct PgInteractionStore {
    pool: PgPool,
}

impl PgInteractionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InteractionStore for PgInteractionStore {
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Interaction>> {
        let sql = format!(
            "SELECT {} FROM interactions WHERE user_id = $1 ORDER BY id ASC",
            INTERACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!(user_id = %user_id, "Failed to load interactions: {}", e);
                e
            })?;

        rows.iter().map(interaction_from_row).collect()
    }

    async fn find_by_users(&self, user_ids: &[String]) -> Result<Vec<Interaction>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM interactions WHERE user_id = ANY($1) ORDER BY id ASC",
            INTERACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(interaction_from_row).collect()
    }

    async fn find_co_interactions(
        &self,
        user_id: &str,
        product_ids: &[String],
    ) -> Result<Vec<Interaction>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM interactions
             WHERE user_id <> $1 AND product_id = ANY($2)
             ORDER BY id ASC",
            INTERACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(product_ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(interaction_from_row).collect()
    }

    async fn count_by_user(&self, user_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn aggregate_counts_by_product(
        &self,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<(String, u64)>> {
        let rows = sqlx::query(
            "SELECT product_id, COUNT(*) AS interaction_count
             FROM interactions
             WHERE NOT (product_id = ANY($1))
             GROUP BY product_id
             ORDER BY interaction_count DESC, MIN(id) ASC
             LIMIT $2",
        )
        .bind(to_vec(exclude))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            let product_id: String = row.try_get("product_id")?;
            let count: i64 = row.try_get("interaction_count")?;
            counts.push((product_id, count.max(0) as u64));
        }
        Ok(counts)
    }

    async fn record(&self, interaction: Interaction) -> Result<()> {
        sqlx::query(
            "INSERT INTO interactions (user_id, product_id, interaction_type, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&interaction.user_id)
        .bind(&interaction.product_id)
        .bind(interaction.kind.as_str())
        .bind(interaction.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT {} FROM products WHERE id = ANY($1)", PRODUCT_COLUMNS);
        let rows = sqlx::query(&sql).bind(ids).fetch_all(&self.pool).await?;

        rows.iter().map(product_from_row).collect()
    }

    async fn find_by_category_or_tags(
        &self,
        categories: &HashSet<String>,
        tags: &HashSet<String>,
        exclude: &HashSet<String>,
    ) -> Result<Vec<Product>> {
        if categories.is_empty() && tags.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM products
             WHERE NOT (id = ANY($3))
               AND (category = ANY($1) OR tags && $2)
             ORDER BY created_at DESC",
            PRODUCT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(to_vec(categories))
            .bind(to_vec(tags))
            .bind(to_vec(exclude))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(product_from_row).collect()
    }

    async fn most_recent(&self, limit: usize, exclude: &HashSet<String>) -> Result<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products
             WHERE NOT (id = ANY($1))
             ORDER BY created_at DESC
             LIMIT $2",
            PRODUCT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(to_vec(exclude))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(product_from_row).collect()
    }

    async fn any(&self, limit: usize) -> Result<Vec<Product>> {
        let sql = format!("SELECT {} FROM products LIMIT $1", PRODUCT_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(product_from_row).collect()
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, preferences FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let preferences: Option<Vec<String>> = row.try_get("preferences")?;
                Ok(Some(User {
                    id: row.try_get("id")?,
                    preferences: preferences.unwrap_or_default(),
                }))
            }
            None => Ok(None),
        }
    }
}
