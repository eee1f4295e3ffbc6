use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;

use super::RecommendationStore;
use crate::error::{AppError, Result};
use crate::models::{
    CachedRecommendation, CandidateItem, ModelRunResult, RecommendationCacheEntry, RunMetrics,
    RunSource, StoredModelRun, UserId,
};

/// Owner of the `recommendations` and `model_runs` tables
#[derive(Clone)]
pub struct PgRecommendationRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct CacheRecord {
    user_id: i64,
    product_id: i64,
    model_name: String,
    score: f64,
    rank: i32,
    origin: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RunRecord {
    id: i64,
    user_id: i64,
    model_name: String,
    source: String,
    metrics_json: Json<RunMetrics>,
    recommendations_json: Json<Vec<CandidateItem>>,
    created_at: DateTime<Utc>,
}

impl PgRecommendationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_source(value: &str) -> Result<RunSource> {
    match value {
        "inference" => Ok(RunSource::Inference),
        "heuristic" => Ok(RunSource::Heuristic),
        other => Err(AppError::Internal(format!("Unknown run source: {other}"))),
    }
}

#[async_trait]
impl RecommendationStore for PgRecommendationRepository {
    async fn replace_for_user(
        &self,
        user_id: UserId,
        cache: &[RecommendationCacheEntry],
        runs: &[ModelRunResult],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recommendations WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM model_runs WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for entry in cache {
            sqlx::query(
                r#"
                INSERT INTO recommendations (user_id, product_id, model_name, score, rank, origin)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (user_id, product_id) DO NOTHING
                "#,
            )
            .bind(entry.user_id)
            .bind(entry.product_id)
            .bind(&entry.model_name)
            .bind(entry.score)
            .bind(entry.rank)
            .bind(entry.origin.as_str())
            .execute(&mut *tx)
            .await?;
        }

        for run in runs {
            sqlx::query(
                r#"
                INSERT INTO model_runs (user_id, model_name, source, metrics_json, recommendations_json)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(user_id)
            .bind(&run.model_name)
            .bind(run.source.as_str())
            .bind(Json(&run.metrics))
            .bind(Json(&run.items))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            user_id = user_id,
            cached = cache.len(),
            runs = runs.len(),
            "Replaced recommendation rows"
        );

        Ok(())
    }

    async fn cached(&self, user_id: UserId, limit: i64) -> Result<Vec<CachedRecommendation>> {
        let records = sqlx::query_as::<_, CacheRecord>(
            r#"
            SELECT user_id, product_id, model_name, score, rank, origin, created_at
            FROM recommendations
            WHERE user_id = $1
            ORDER BY score DESC, rank ASC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        records
            .into_iter()
            .map(|r| {
                Ok(CachedRecommendation {
                    user_id: r.user_id,
                    product_id: r.product_id,
                    model_name: r.model_name,
                    score: r.score,
                    rank: r.rank,
                    origin: r.origin.parse().map_err(AppError::Internal)?,
                    created_at: r.created_at,
                })
            })
            .collect()
    }

    async fn runs_for_user(&self, user_id: UserId) -> Result<Vec<StoredModelRun>> {
        let records = sqlx::query_as::<_, RunRecord>(
            r#"
            SELECT id, user_id, model_name, source, metrics_json, recommendations_json, created_at
            FROM model_runs
            WHERE user_id = $1
            ORDER BY created_at DESC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        records
            .into_iter()
            .map(|r| {
                Ok(StoredModelRun {
                    id: r.id,
                    user_id: r.user_id,
                    model_name: r.model_name,
                    source: parse_source(&r.source)?,
                    metrics: r.metrics_json.0,
                    recommendations: r.recommendations_json.0,
                    created_at: r.created_at,
                })
            })
            .collect()
    }

    async fn clear(&self, user_id: UserId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recommendations WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM model_runs WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        assert_eq!(parse_source("inference").unwrap(), RunSource::Inference);
        assert_eq!(parse_source("heuristic").unwrap(), RunSource::Heuristic);
        assert!(parse_source("python").is_err());
    }
}
