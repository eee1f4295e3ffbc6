//! Closed set of candidate models evaluated on every recomputation.

use crate::services::heuristic::ScoringWeights;

pub const DEFAULT_INFERENCE_MODELS: [&str; 4] = ["ENCM", "LNCM", "NeuMF", "BMF"];

pub const DEFAULT_HEURISTIC_VARIANTS: [(&str, ScoringWeights); 4] = [
    ("bmf", ScoringWeights::new(0.20, 0.10, 0.20, 0.35, 0.15)),
    ("encm", ScoringWeights::new(0.30, 0.10, 0.15, 0.10, 0.35)),
    ("lncm", ScoringWeights::new(0.55, 0.20, 0.10, 0.10, 0.05)),
    ("neumf", ScoringWeights::new(0.40, 0.15, 0.15, 0.10, 0.20)),
];

#[derive(Debug, Clone, PartialEq)]
pub enum ModelKind {
    Inference,
    Heuristic(ScoringWeights),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub name: String,
    pub kind: ModelKind,
}

/// Models in declaration order; the order breaks selection ties
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRegistry {
    specs: Vec<ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_INFERENCE_MODELS.iter().map(|m| m.to_string()).collect())
    }
}

impl ModelRegistry {
    /// Given inference models followed by the built-in heuristic variants
    pub fn new(inference_models: Vec<String>) -> Self {
        let mut specs: Vec<ModelSpec> = inference_models
            .into_iter()
            .map(|name| ModelSpec {
                name,
                kind: ModelKind::Inference,
            })
            .collect();

        specs.extend(DEFAULT_HEURISTIC_VARIANTS.iter().map(|(name, weights)| ModelSpec {
            name: name.to_string(),
            kind: ModelKind::Heuristic(*weights),
        }));

        Self { specs }
    }

    pub fn specs(&self) -> &[ModelSpec] {
        &self.specs
    }

    pub fn inference_models(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().filter_map(|s| match s.kind {
            ModelKind::Inference => Some(s.name.as_str()),
            ModelKind::Heuristic(_) => None,
        })
    }

    pub fn heuristic_variants(&self) -> impl Iterator<Item = (&str, &ScoringWeights)> {
        self.specs.iter().filter_map(|s| match &s.kind {
            ModelKind::Heuristic(weights) => Some((s.name.as_str(), weights)),
            ModelKind::Inference => None,
        })
    }
}
