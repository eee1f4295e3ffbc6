//! Recompute Orchestrator
//!
//! Drives one recomputation for one user:
//!
//! ```text
//! try_acquire(user) ─ no ─▶ InProgress
//!        │ yes
//!        ▼
//! user exists + eligible role ─ no ─▶ Rejected
//!        │ yes
//!        ▼
//! features ─▶ inference models ─▶ heuristic variants ─▶ backfill ─▶ evaluate
//!        ─▶ select ─▶ replace cache + run log (one transaction) ─▶ Committed
//! ```
//!
//! The in-flight permit is held for the whole cycle and released when it
//! goes out of scope, on every exit path.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::{CatalogReader, RecommendationStore};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{
    CachedRecommendation, ModelRunResult, RecommendationCacheEntry, RunMetrics, RunSource,
    StoredModelRun, UserId, UserProfile,
};
use crate::services::backfill::BackfillPolicy;
use crate::services::features::{FeatureBuilder, FeatureTable};
use crate::services::heuristic::HeuristicScorer;
use crate::services::inference::{InferenceBridge, InferenceContext, InferenceOutcome};
use crate::services::registry::ModelRegistry;
use crate::services::selection::{evaluate_heuristic, evaluate_inference, ModelSelector};
use inflight_guard::InFlightRegistry;

pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// K: length of every candidate list
    pub output_size: usize,
    pub eligible_role: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            output_size: 10,
            eligible_role: "R2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    UserNotFound,
    RoleNotPermitted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecomputeOutcome {
    Committed {
        model: String,
        source: RunSource,
        items: usize,
        runs: usize,
    },
    InProgress,
    Rejected {
        reason: RejectReason,
    },
}

impl RecomputeOutcome {
    fn label(&self) -> &'static str {
        match self {
            RecomputeOutcome::Committed { .. } => "committed",
            RecomputeOutcome::InProgress => "in_progress",
            RecomputeOutcome::Rejected { .. } => "rejected",
        }
    }
}

pub struct RecomputeOrchestrator {
    catalog: Arc<dyn CatalogReader>,
    store: Arc<dyn RecommendationStore>,
    guard: Arc<dyn InFlightRegistry>,
    bridge: Option<Arc<InferenceBridge>>,
    features: FeatureBuilder,
    registry: ModelRegistry,
    settings: EngineSettings,
}

impl RecomputeOrchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogReader>,
        store: Arc<dyn RecommendationStore>,
        guard: Arc<dyn InFlightRegistry>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            features: FeatureBuilder::new(Arc::clone(&catalog)),
            catalog,
            store,
            guard,
            bridge: None,
            registry: ModelRegistry::default(),
            settings,
        }
    }

    pub fn with_inference(mut self, bridge: Arc<InferenceBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Recompute and persist recommendations for one user
    pub async fn recompute(&self, user_id: UserId, limit: usize) -> Result<RecomputeOutcome> {
        let started = Instant::now();

        let Some(permit) = self.guard.try_acquire(user_id).await? else {
            info!(user_id = user_id, "Recompute already in progress, skipping");
            let outcome = RecomputeOutcome::InProgress;
            metrics::record_recompute(outcome.label(), started.elapsed());
            return Ok(outcome);
        };

        let result = self.run_locked(user_id, limit).await;
        drop(permit);

        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(_) => "failed",
        };
        metrics::record_recompute(label, started.elapsed());

        match &result {
            Ok(RecomputeOutcome::Committed {
                model,
                source,
                items,
                runs,
            }) => info!(
                user_id = user_id,
                model = %model,
                source = source.as_str(),
                items = *items,
                runs = *runs,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Recommendations recomputed"
            ),
            Ok(other) => info!(user_id = user_id, outcome = other.label(), "Recompute skipped"),
            Err(e) => error!(user_id = user_id, error = %e, "Recompute aborted"),
        }

        result
    }

    /// Fire-and-forget trigger; the caller never waits for the outcome
    pub fn spawn_recompute(self: &Arc<Self>, user_id: UserId, limit: usize) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = orchestrator.recompute(user_id, limit).await {
                warn!(user_id = user_id, error = %e, "Background recompute failed");
            }
        })
    }

    pub async fn get_cached(&self, user_id: UserId, limit: usize) -> Result<Vec<CachedRecommendation>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.store
            .cached(user_id, i64::try_from(limit).unwrap_or(i64::MAX))
            .await
    }

    pub async fn runs(&self, user_id: UserId) -> Result<Vec<StoredModelRun>> {
        self.store.runs_for_user(user_id).await
    }

    pub async fn clear(&self, user_id: UserId) -> Result<()> {
        self.store.clear(user_id).await?;
        info!(user_id = user_id, "Recommendations cleared");
        Ok(())
    }

    async fn run_locked(&self, user_id: UserId, limit: usize) -> Result<RecomputeOutcome> {
        let Some(user) = self.catalog.find_user(user_id).await? else {
            debug!(user_id = user_id, "User not found");
            return Ok(RecomputeOutcome::Rejected {
                reason: RejectReason::UserNotFound,
            });
        };

        if !self.is_eligible(&user) {
            debug!(user_id = user_id, role = ?user.role_id, "Role not eligible for recommendations");
            return Ok(RecomputeOutcome::Rejected {
                reason: RejectReason::RoleNotPermitted,
            });
        }

        let table = self.features.build(&user).await?;
        let k = limit.clamp(1, self.settings.output_size.max(1));
        let backfill = BackfillPolicy::for_catalog(self.settings.output_size, &table.catalog);

        let mut runs = self.inference_runs(user_id, &table, k, &backfill).await;
        runs.extend(self.heuristic_runs(&table, &backfill));

        let winner = ModelSelector::select(&runs)
            .ok_or_else(|| AppError::Internal("No candidate model produced a run".to_string()))?;
        let cache = RecommendationCacheEntry::from_run(user_id, winner);
        let outcome = RecomputeOutcome::Committed {
            model: winner.model_name.clone(),
            source: winner.source,
            items: cache.len(),
            runs: runs.len(),
        };

        self.store
            .replace_for_user(user_id, &cache, &runs)
            .await
            .map_err(|e| {
                error!(user_id = user_id, error = %e, "Failed to commit recommendations");
                AppError::RecomputeFailed(e.to_string())
            })?;

        Ok(outcome)
    }

    fn is_eligible(&self, user: &UserProfile) -> bool {
        user.role_id
            .as_deref()
            .is_some_and(|role| role.trim().eq_ignore_ascii_case(&self.settings.eligible_role))
    }

    async fn inference_runs(
        &self,
        user_id: UserId,
        table: &FeatureTable,
        k: usize,
        backfill: &BackfillPolicy,
    ) -> Vec<ModelRunResult> {
        let models: Vec<String> = self.registry.inference_models().map(str::to_string).collect();
        if models.is_empty() {
            return Vec::new();
        }
        let Some(bridge) = &self.bridge else {
            debug!(user_id = user_id, "Inference unavailable, using heuristic variants only");
            return Vec::new();
        };

        let context = InferenceContext::new(&table.context, &table.affinity);
        let outcomes = bridge
            .invoke_all(&models, user_id, self.settings.output_size, &context)
            .await;

        outcomes
            .into_iter()
            .map(|(model_name, outcome)| match outcome {
                InferenceOutcome::Ok(raw) => {
                    let items = backfill.complete(raw, &table.affinity);
                    let metrics = evaluate_inference(&items, &table.ground_truth, k);
                    ModelRunResult {
                        model_name,
                        source: RunSource::Inference,
                        items,
                        metrics,
                    }
                }
                InferenceOutcome::Failed(failure) => ModelRunResult {
                    model_name,
                    source: RunSource::Inference,
                    items: Vec::new(),
                    metrics: RunMetrics::Failed {
                        error: failure.to_string(),
                    },
                },
            })
            .collect()
    }

    fn heuristic_runs(&self, table: &FeatureTable, backfill: &BackfillPolicy) -> Vec<ModelRunResult> {
        let records = table.records_by_id();

        self.registry
            .heuristic_variants()
            .map(|(name, weights)| {
                let raw = HeuristicScorer::score(&table.records, weights);
                let items = backfill.complete(raw, &table.affinity);
                let metrics = evaluate_heuristic(&items, &records, &table.affinity, weights);
                ModelRunResult {
                    model_name: name.to_string(),
                    source: RunSource::Heuristic,
                    items,
                    metrics,
                }
            })
            .collect()
    }
}
