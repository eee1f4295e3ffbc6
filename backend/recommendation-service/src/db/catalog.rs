use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use super::{CatalogReader, InteractionRecorder};
use crate::error::{AppError, Result};
use crate::models::{
    InteractionRow, NewInteraction, PriceDetail, ProductId, ProductRow, RecordedInteraction,
    ReviewSummary, UserId, UserProfile,
};

/// Read access to the storefront tables
#[derive(Clone)]
pub struct PgCatalogRepository {
    pool: PgPool,
    active_status: String,
}

#[derive(sqlx::FromRow)]
struct InteractionRecord {
    product_id: i64,
    action_code: String,
    device_type: Option<String>,
    timestamp: DateTime<Utc>,
    category_id: Option<String>,
    brand_id: Option<String>,
}

#[derive(sqlx::FromRow)]
struct InsertedInteraction {
    id: i64,
    timestamp: DateTime<Utc>,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool, active_status: impl Into<String>) -> Self {
        Self {
            pool,
            active_status: active_status.into(),
        }
    }
}

#[async_trait]
impl CatalogReader for PgCatalogRepository {
    async fn find_user(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        let user = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, role_id, gender_id
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn active_products(&self) -> Result<Vec<ProductRow>> {
        let products = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, category_id, brand_id, COALESCE(view_count, 0)::BIGINT AS view_count
            FROM products
            WHERE status_id = $1
            ORDER BY id
            "#,
        )
        .bind(&self.active_status)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    async fn price_details(&self, product_ids: &[ProductId]) -> Result<Vec<PriceDetail>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let details = sqlx::query_as::<_, PriceDetail>(
            r#"
            SELECT DISTINCT ON (product_id)
                   product_id,
                   discount_price::DOUBLE PRECISION AS discount_price,
                   original_price::DOUBLE PRECISION AS original_price
            FROM product_details
            WHERE product_id = ANY($1)
            ORDER BY product_id, id
            "#,
        )
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(details)
    }

    async fn review_summaries(&self, product_ids: &[ProductId]) -> Result<Vec<ReviewSummary>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let summaries = sqlx::query_as::<_, ReviewSummary>(
            r#"
            SELECT product_id,
                   COUNT(*)::BIGINT AS rating_count,
                   AVG(COALESCE(star, 0))::DOUBLE PRECISION AS average_rating
            FROM comments
            WHERE product_id = ANY($1)
            GROUP BY product_id
            "#,
        )
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(summaries)
    }

    async fn user_interactions(&self, user_id: UserId) -> Result<Vec<InteractionRow>> {
        let records = sqlx::query_as::<_, InteractionRecord>(
            r#"
            SELECT i.product_id, i.action_code, i.device_type, i.timestamp,
                   p.category_id, p.brand_id
            FROM interactions i
            LEFT JOIN products p ON p.id = i.product_id
            WHERE i.user_id = $1
            ORDER BY i.timestamp DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let rows = records
            .into_iter()
            .filter_map(|r| match r.action_code.parse() {
                Ok(action) => Some(InteractionRow {
                    product_id: r.product_id,
                    action,
                    device_type: r.device_type,
                    timestamp: r.timestamp,
                    category_id: r.category_id,
                    brand_id: r.brand_id,
                }),
                Err(e) => {
                    debug!(user_id = user_id, error = %e, "Skipping interaction");
                    None
                }
            })
            .collect();

        Ok(rows)
    }
}

#[async_trait]
impl InteractionRecorder for PgCatalogRepository {
    async fn record_interaction(&self, interaction: &NewInteraction) -> Result<RecordedInteraction> {
        let product_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                .bind(interaction.product_id)
                .fetch_one(&self.pool)
                .await?;
        if !product_exists {
            return Err(AppError::NotFound(format!(
                "Product {} not found",
                interaction.product_id
            )));
        }

        let device_type = interaction.device_type.map(|d| d.as_str().to_string());

        let inserted = sqlx::query_as::<_, InsertedInteraction>(
            r#"
            INSERT INTO interactions (user_id, product_id, action_code, device_type, timestamp)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, timestamp
            "#,
        )
        .bind(interaction.user_id)
        .bind(interaction.product_id)
        .bind(interaction.action.as_str())
        .bind(&device_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(RecordedInteraction {
            id: inserted.id,
            user_id: interaction.user_id,
            product_id: interaction.product_id,
            action: interaction.action,
            device_type,
            timestamp: inserted.timestamp,
        })
    }
}
