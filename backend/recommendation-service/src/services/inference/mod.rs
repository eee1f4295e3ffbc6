//! Inference Bridge
//!
//! Calls external recommendation models through an [`InferenceRunner`]
//! transport. Every call resolves to an [`InferenceOutcome`]; process
//! misbehaviour is reported as a tagged [`InferenceFailure`] and never
//! surfaces as an error of the recomputation.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::models::{CandidateItem, FeatureContext, Season, TimeOfDay, UserAffinity, UserId};

mod process;

pub use process::{parse_reply, ProcessInferenceRunner, ProcessSettings};

/// Why an inference call produced no items
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceFailure {
    #[error("disabled")]
    Disabled,

    #[error("timeout")]
    Timeout,

    #[error("exit_code_{0}")]
    ExitCode(i32),

    #[error("exit_code_signal")]
    KilledBySignal,

    #[error("no_output")]
    NoOutput,

    #[error("invalid_json")]
    InvalidJson,

    #[error("spawn_failed")]
    SpawnFailed(String),

    #[error("remote:{0}")]
    Remote(String),
}

impl InferenceFailure {
    /// Bounded label for metrics
    pub fn status_label(&self) -> &'static str {
        match self {
            InferenceFailure::Disabled => "disabled",
            InferenceFailure::Timeout => "timeout",
            InferenceFailure::ExitCode(_) | InferenceFailure::KilledBySignal => "exit_code",
            InferenceFailure::NoOutput => "no_output",
            InferenceFailure::InvalidJson => "invalid_json",
            InferenceFailure::SpawnFailed(_) => "spawn_failed",
            InferenceFailure::Remote(_) => "remote",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    Ok(Vec<CandidateItem>),
    Failed(InferenceFailure),
}

impl InferenceOutcome {
    pub fn status_label(&self) -> &'static str {
        match self {
            InferenceOutcome::Ok(_) => "ok",
            InferenceOutcome::Failed(failure) => failure.status_label(),
        }
    }
}

/// Context sent along with every inference request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceContext {
    pub time_of_day: TimeOfDay,
    pub season: Season,
    pub hour: u32,
    pub month: u32,
    pub device_type: String,
    pub gender: Option<String>,
    pub preferred_categories: Vec<String>,
    pub preferred_brands: Vec<String>,
    pub category: Option<String>,
}

impl InferenceContext {
    pub fn new(context: &FeatureContext, affinity: &UserAffinity) -> Self {
        Self {
            time_of_day: context.time_of_day,
            season: context.season,
            hour: context.hour,
            month: context.month,
            device_type: context.device_type.clone(),
            gender: context.gender.clone(),
            preferred_categories: affinity.categories.iter().cloned().collect(),
            preferred_brands: affinity.brands.iter().cloned().collect(),
            category: None,
        }
    }
}

/// One JSON line written to the inference process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceRequest {
    pub user_id: UserId,
    pub limit: usize,
    pub model: String,
    pub context: InferenceContext,
}

/// Transport to an inference backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceRunner: Send + Sync {
    async fn run(&self, request: &InferenceRequest) -> InferenceOutcome;
}

/// Operator switch over inference model names (case-insensitive)
#[derive(Debug, Clone, Default)]
pub struct ModelSwitch {
    allowed: Option<HashSet<String>>,
    denied: HashSet<String>,
}

impl ModelSwitch {
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Restrict to the given models; an empty list keeps everything allowed
    pub fn with_allowed<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed: HashSet<String> = models
            .into_iter()
            .map(|m| m.as_ref().trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        self.allowed = if allowed.is_empty() { None } else { Some(allowed) };
        self
    }

    pub fn with_denied<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.denied.extend(
            models
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty()),
        );
        self
    }

    pub fn is_enabled(&self, model: &str) -> bool {
        let key = model.to_lowercase();
        if self.denied.contains(&key) {
            return false;
        }
        self.allowed.as_ref().map_or(true, |allowed| allowed.contains(&key))
    }
}

pub struct InferenceBridge {
    runner: Arc<dyn InferenceRunner>,
    switch: ModelSwitch,
    parallel: bool,
}

impl InferenceBridge {
    pub fn new(runner: Arc<dyn InferenceRunner>, switch: ModelSwitch) -> Self {
        Self {
            runner,
            switch,
            parallel: false,
        }
    }

    /// Fan out per-model calls concurrently instead of one after another
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub async fn invoke(
        &self,
        model: &str,
        user_id: UserId,
        limit: usize,
        context: &InferenceContext,
    ) -> InferenceOutcome {
        if !self.switch.is_enabled(model) {
            debug!(model = model, user_id = user_id, "Inference model disabled");
            metrics::record_inference_call(model, "disabled");
            return InferenceOutcome::Failed(InferenceFailure::Disabled);
        }

        let request = InferenceRequest {
            user_id,
            limit,
            model: model.to_string(),
            context: context.clone(),
        };

        info!(model = model, user_id = user_id, "Calling inference model");
        let outcome = self.runner.run(&request).await;

        match &outcome {
            InferenceOutcome::Ok(items) => {
                info!(model = model, user_id = user_id, items = items.len(), "Inference succeeded");
            }
            InferenceOutcome::Failed(failure) => {
                warn!(model = model, user_id = user_id, reason = %failure, "Inference failed");
            }
        }
        metrics::record_inference_call(model, outcome.status_label());

        outcome
    }

    /// Invoke every model, returning outcomes in the order given
    pub async fn invoke_all(
        &self,
        models: &[String],
        user_id: UserId,
        limit: usize,
        context: &InferenceContext,
    ) -> Vec<(String, InferenceOutcome)> {
        if self.parallel {
            let calls = models.iter().map(|model| async move {
                let outcome = self.invoke(model, user_id, limit, context).await;
                (model.clone(), outcome)
            });
            return join_all(calls).await;
        }

        let mut outcomes = Vec::with_capacity(models.len());
        for model in models {
            let outcome = self.invoke(model, user_id, limit, context).await;
            outcomes.push((model.clone(), outcome));
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> InferenceContext {
        let feature_context = FeatureContext {
            hour: 9,
            day_of_week: 2,
            month: 1,
            season: Season::Winter,
            time_of_day: TimeOfDay::Morning,
            is_weekend: false,
            device_type: "mobile".into(),
            gender: Some("FE".into()),
            gender_code: 1,
        };
        let mut affinity = UserAffinity::default();
        affinity.categories.insert("C1".into());
        InferenceContext::new(&feature_context, &affinity)
    }

    #[test]
    fn test_failure_tags() {
        assert_eq!(InferenceFailure::Timeout.to_string(), "timeout");
        assert_eq!(InferenceFailure::ExitCode(2).to_string(), "exit_code_2");
        assert_eq!(InferenceFailure::KilledBySignal.to_string(), "exit_code_signal");
        assert_eq!(
            InferenceFailure::Remote("no model".into()).to_string(),
            "remote:no model"
        );
        assert_eq!(InferenceFailure::ExitCode(2).status_label(), "exit_code");
    }

    #[test]
    fn test_request_payload_shape() {
        let request = InferenceRequest {
            user_id: 7,
            limit: 10,
            model: "ENCM".into(),
            context: context(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["user_id"], 7);
        assert_eq!(json["model"], "ENCM");
        assert_eq!(json["context"]["time_of_day"], "morning");
        assert_eq!(json["context"]["season"], "winter");
        assert_eq!(json["context"]["preferred_categories"][0], "C1");
        assert!(json["context"]["category"].is_null());
    }

    #[test]
    fn test_model_switch() {
        let switch = ModelSwitch::allow_all().with_denied(["bmf"]);
        assert!(switch.is_enabled("ENCM"));
        assert!(!switch.is_enabled("BMF"));

        let switch = ModelSwitch::allow_all().with_allowed(["encm", "NeuMF"]);
        assert!(switch.is_enabled("ENCM"));
        assert!(switch.is_enabled("neumf"));
        assert!(!switch.is_enabled("LNCM"));

        let switch = ModelSwitch::allow_all().with_allowed(Vec::<String>::new());
        assert!(switch.is_enabled("LNCM"));
    }

    #[tokio::test]
    async fn test_disabled_model_skips_runner() {
        let mut runner = MockInferenceRunner::new();
        runner.expect_run().never();

        let bridge = InferenceBridge::new(
            Arc::new(runner),
            ModelSwitch::allow_all().with_denied(["encm"]),
        );
        let outcome = bridge.invoke("ENCM", 1, 10, &context()).await;
        assert_eq!(outcome, InferenceOutcome::Failed(InferenceFailure::Disabled));
    }

    #[tokio::test]
    async fn test_invoke_passes_request_to_runner() {
        let mut runner = MockInferenceRunner::new();
        runner
            .expect_run()
            .withf(|req: &InferenceRequest| req.model == "LNCM" && req.user_id == 3 && req.limit == 5)
            .times(1)
            .returning(|_| InferenceOutcome::Ok(vec![CandidateItem::scored(11, 0.7)]));

        let bridge = InferenceBridge::new(Arc::new(runner), ModelSwitch::allow_all());
        let outcome = bridge.invoke("LNCM", 3, 5, &context()).await;
        assert_eq!(outcome, InferenceOutcome::Ok(vec![CandidateItem::scored(11, 0.7)]));
    }

    #[tokio::test]
    async fn test_invoke_all_keeps_model_order() {
        for parallel in [false, true] {
            let mut runner = MockInferenceRunner::new();
            runner.expect_run().times(2).returning(|req: &InferenceRequest| {
                if req.model == "ENCM" {
                    InferenceOutcome::Failed(InferenceFailure::Timeout)
                } else {
                    InferenceOutcome::Ok(vec![])
                }
            });

            let bridge = InferenceBridge::new(Arc::new(runner), ModelSwitch::allow_all())
                .with_parallel(parallel);
            let models = vec!["ENCM".to_string(), "NeuMF".to_string()];
            let outcomes = bridge.invoke_all(&models, 1, 10, &context()).await;

            assert_eq!(outcomes.len(), 2);
            assert_eq!(outcomes[0].0, "ENCM");
            assert_eq!(outcomes[0].1, InferenceOutcome::Failed(InferenceFailure::Timeout));
            assert_eq!(outcomes[1].1, InferenceOutcome::Ok(vec![]));
        }
    }
}
