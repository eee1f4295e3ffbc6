//! In-memory stand-ins for the storage seams and the inference transport.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use inflight_guard::LocalInFlightRegistry;
use recommendation_service::db::{CatalogReader, InteractionRecorder, RecommendationStore};
use recommendation_service::error::{AppError, Result};
use recommendation_service::models::{
    ActionCode, CachedRecommendation, InteractionRow, ModelRunResult, NewInteraction, PriceDetail,
    ProductId, ProductRow, RecommendationCacheEntry, RecordedInteraction, ReviewSummary,
    StoredModelRun, UserId, UserProfile,
};
use recommendation_service::services::inference::{InferenceOutcome, InferenceRequest, InferenceRunner};
use recommendation_service::services::{EngineSettings, RecomputeOrchestrator};

pub const ACTIVE: &str = "S1";

#[derive(Clone)]
pub struct StoredProduct {
    pub row: ProductRow,
    pub status: String,
}

#[derive(Default)]
pub struct MemoryCatalog {
    pub users: Mutex<Vec<UserProfile>>,
    pub products: Mutex<Vec<StoredProduct>>,
    pub prices: Mutex<Vec<PriceDetail>>,
    pub reviews: Mutex<Vec<ReviewSummary>>,
    pub interactions: Mutex<Vec<(UserId, InteractionRow)>>,
}

impl MemoryCatalog {
    pub fn add_user(&self, id: UserId, role: &str) {
        self.users.lock().unwrap().push(UserProfile {
            id,
            role_id: Some(role.to_string()),
            gender_id: Some("M".to_string()),
        });
    }

    pub fn add_product(&self, id: ProductId, category: &str, brand: &str, views: i64) {
        self.products.lock().unwrap().push(StoredProduct {
            row: ProductRow {
                id,
                category_id: Some(category.to_string()),
                brand_id: Some(brand.to_string()),
                view_count: views,
            },
            status: ACTIVE.to_string(),
        });
    }

    pub fn add_retired_product(&self, id: ProductId, category: &str, brand: &str, views: i64) {
        self.add_product(id, category, brand, views);
        if let Some(p) = self.products.lock().unwrap().iter_mut().find(|p| p.row.id == id) {
            p.status = "S2".to_string();
        }
    }

    /// Interactions are appended oldest first
    pub fn add_interaction(&self, user_id: UserId, product_id: ProductId, action: ActionCode) {
        let mut interactions = self.interactions.lock().unwrap();
        let product = self
            .products
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.row.id == product_id)
            .map(|p| p.row.clone());
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
            + ChronoDuration::minutes(interactions.len() as i64);

        interactions.push((
            user_id,
            InteractionRow {
                product_id,
                action,
                device_type: Some("mobile".to_string()),
                timestamp,
                category_id: product.as_ref().and_then(|p| p.category_id.clone()),
                brand_id: product.as_ref().and_then(|p| p.brand_id.clone()),
            },
        ));
    }
}

#[async_trait]
impl CatalogReader for MemoryCatalog {
    async fn find_user(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == user_id).cloned())
    }

    async fn active_products(&self) -> Result<Vec<ProductRow>> {
        Ok(self
            .products
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status == ACTIVE)
            .map(|p| p.row.clone())
            .collect())
    }

    async fn price_details(&self, product_ids: &[ProductId]) -> Result<Vec<PriceDetail>> {
        Ok(self
            .prices
            .lock()
            .unwrap()
            .iter()
            .filter(|p| product_ids.contains(&p.product_id))
            .cloned()
            .collect())
    }

    async fn review_summaries(&self, product_ids: &[ProductId]) -> Result<Vec<ReviewSummary>> {
        Ok(self
            .reviews
            .lock()
            .unwrap()
            .iter()
            .filter(|r| product_ids.contains(&r.product_id))
            .cloned()
            .collect())
    }

    async fn user_interactions(&self, user_id: UserId) -> Result<Vec<InteractionRow>> {
        let mut rows: Vec<InteractionRow> = self
            .interactions
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(rows)
    }
}

#[async_trait]
impl InteractionRecorder for MemoryCatalog {
    async fn record_interaction(&self, interaction: &NewInteraction) -> Result<RecordedInteraction> {
        let known = self
            .products
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.row.id == interaction.product_id);
        if !known {
            return Err(AppError::NotFound(format!(
                "Product {} not found",
                interaction.product_id
            )));
        }

        self.add_interaction(interaction.user_id, interaction.product_id, interaction.action);
        let id = self.interactions.lock().unwrap().len() as i64;

        Ok(RecordedInteraction {
            id,
            user_id: interaction.user_id,
            product_id: interaction.product_id,
            action: interaction.action,
            device_type: interaction.device_type.map(|d| d.as_str().to_string()),
            timestamp: Utc::now(),
        })
    }
}

#[derive(Default)]
struct UserRows {
    cache: Vec<RecommendationCacheEntry>,
    runs: Vec<ModelRunResult>,
}

/// Result tables with all-or-nothing replacement
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<UserId, UserRows>>,
    fail_commit: AtomicBool,
    pub commits: AtomicUsize,
}

impl MemoryStore {
    pub fn fail_next_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    pub fn cache_len(&self, user_id: UserId) -> usize {
        self.rows
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|r| r.cache.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl RecommendationStore for MemoryStore {
    async fn replace_for_user(
        &self,
        user_id: UserId,
        cache: &[RecommendationCacheEntry],
        runs: &[ModelRunResult],
    ) -> Result<()> {
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(AppError::Database("connection reset during commit".to_string()));
        }

        let mut unique = Vec::with_capacity(cache.len());
        for entry in cache {
            if !unique
                .iter()
                .any(|e: &RecommendationCacheEntry| e.product_id == entry.product_id)
            {
                unique.push(entry.clone());
            }
        }

        self.rows.lock().unwrap().insert(
            user_id,
            UserRows {
                cache: unique,
                runs: runs.to_vec(),
            },
        );
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cached(&self, user_id: UserId, limit: i64) -> Result<Vec<CachedRecommendation>> {
        let rows = self.rows.lock().unwrap();
        let Some(user_rows) = rows.get(&user_id) else {
            return Ok(Vec::new());
        };

        let mut entries = user_rows.cache.clone();
        entries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.rank.cmp(&b.rank))
        });

        Ok(entries
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|e| CachedRecommendation {
                user_id: e.user_id,
                product_id: e.product_id,
                model_name: e.model_name,
                score: e.score,
                rank: e.rank,
                origin: e.origin,
                created_at: Utc::now(),
            })
            .collect())
    }

    async fn runs_for_user(&self, user_id: UserId) -> Result<Vec<StoredModelRun>> {
        let rows = self.rows.lock().unwrap();
        let Some(user_rows) = rows.get(&user_id) else {
            return Ok(Vec::new());
        };

        Ok(user_rows
            .runs
            .iter()
            .enumerate()
            .map(|(i, run)| StoredModelRun {
                id: i as i64 + 1,
                user_id,
                model_name: run.model_name.clone(),
                source: run.source,
                metrics: run.metrics.clone(),
                recommendations: run.items.clone(),
                created_at: Utc::now(),
            })
            .collect())
    }

    async fn clear(&self, user_id: UserId) -> Result<()> {
        self.rows.lock().unwrap().remove(&user_id);
        Ok(())
    }
}

/// Inference transport answering from a per-model table
pub struct ScriptedRunner {
    outcomes: HashMap<String, InferenceOutcome>,
    fallback: InferenceOutcome,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl ScriptedRunner {
    pub fn always(outcome: InferenceOutcome) -> Self {
        Self {
            outcomes: HashMap::new(),
            fallback: outcome,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, model: &str, outcome: InferenceOutcome) -> Self {
        self.outcomes.insert(model.to_string(), outcome);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl InferenceRunner for ScriptedRunner {
    async fn run(&self, request: &InferenceRequest) -> InferenceOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcomes
            .get(&request.model)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

pub struct Harness {
    pub catalog: Arc<MemoryCatalog>,
    pub store: Arc<MemoryStore>,
    pub guard: Arc<LocalInFlightRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(MemoryCatalog::default()),
            store: Arc::new(MemoryStore::default()),
            guard: Arc::new(LocalInFlightRegistry::new()),
        }
    }

    pub fn orchestrator(&self) -> RecomputeOrchestrator {
        RecomputeOrchestrator::new(
            self.catalog.clone(),
            self.store.clone(),
            self.guard.clone(),
            EngineSettings::default(),
        )
    }
}

/// User 1 (role R2) carted product 1 and purchased product 2 out of 15
/// otherwise identical active products. Products 11..=14 share a category
/// or brand with 1 or 2; everything else shares neither.
pub fn cart_purchase_scenario() -> Harness {
    let harness = Harness::new();
    let catalog = &harness.catalog;

    catalog.add_user(1, "R2");
    catalog.add_user(2, "R1");

    catalog.add_product(1, "C1", "B1", 0);
    catalog.add_product(2, "C2", "B2", 0);
    for id in 3..=10 {
        catalog.add_product(id, &format!("X{id}"), &format!("Y{id}"), 0);
    }
    catalog.add_product(11, "C1", "Y11", 0);
    catalog.add_product(12, "X12", "B2", 0);
    catalog.add_product(13, "C2", "Y13", 0);
    catalog.add_product(14, "X14", "B1", 0);
    catalog.add_product(15, "X15", "Y15", 0);

    catalog.add_interaction(1, 1, ActionCode::Cart);
    catalog.add_interaction(1, 2, ActionCode::Purchase);

    harness
}

pub fn peers() -> Vec<ProductId> {
    vec![11, 12, 13, 14]
}

pub fn unrelated() -> Vec<ProductId> {
    (3..=10).chain(std::iter::once(15)).collect()
}

pub fn position(ids: &[ProductId], id: ProductId) -> Option<usize> {
    ids.iter().position(|&p| p == id)
}
