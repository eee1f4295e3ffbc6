/// Model Selector / Evaluator
///
/// Inference runs are judged against the user's cart and purchase history
/// (Precision@k, MAP@k). Heuristic runs have no comparable ground truth and
/// are judged on how well they reflect the user's affinity and intent.
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::models::{
    CandidateItem, FeatureRecord, ModelRunResult, ProductId, PurchaseIntent, RunMetrics, RunSource,
    UserAffinity,
};
use crate::services::heuristic::{score_record, ScoringWeights};

pub fn evaluate_inference(items: &[CandidateItem], ground_truth: &HashSet<ProductId>, k: usize) -> RunMetrics {
    let k = k.max(1);
    let mut hits = 0usize;
    let mut precision_sum = 0.0;

    for (i, item) in items.iter().take(k).enumerate() {
        if ground_truth.contains(&item.product_id) {
            hits += 1;
            precision_sum += hits as f64 / (i + 1) as f64;
        }
    }

    RunMetrics::Inference {
        k,
        precision_at_k: hits as f64 / k as f64,
        map_at_k: precision_sum / k.min(ground_truth.len()).max(1) as f64,
    }
}

pub fn evaluate_heuristic(
    items: &[CandidateItem],
    records: &HashMap<ProductId, &FeatureRecord>,
    affinity: &UserAffinity,
    weights: &ScoringWeights,
) -> RunMetrics {
    let mut aligned = 0;
    let mut intent_high = 0;
    let mut total = 0.0;

    for item in items {
        let Some(record) = records.get(&item.product_id) else {
            continue;
        };
        if affinity.matches(record.category_id.as_deref(), record.brand_id.as_deref()) {
            aligned += 1;
        }
        if record.purchase_intent == PurchaseIntent::High {
            intent_high += 1;
        }
        total += score_record(record, weights);
    }

    RunMetrics::Heuristic {
        aligned,
        intent_high,
        avg_score: if items.is_empty() { 0.0 } else { total / items.len() as f64 },
    }
}

pub struct ModelSelector;

impl ModelSelector {
    /// Pick the winning run.
    ///
    /// Successful inference runs always beat heuristic runs. Within a
    /// group the first run in declaration order wins ties.
    pub fn select(runs: &[ModelRunResult]) -> Option<&ModelRunResult> {
        let inference = best_of(runs, RunSource::Inference, compare_inference);
        inference.or_else(|| best_of(runs, RunSource::Heuristic, compare_heuristic))
    }
}

fn best_of<'a>(
    runs: &'a [ModelRunResult],
    source: RunSource,
    compare: fn(&RunMetrics, &RunMetrics) -> Ordering,
) -> Option<&'a ModelRunResult> {
    runs.iter()
        .filter(|r| r.source == source && !r.is_failed())
        .fold(None, |best: Option<&'a ModelRunResult>, run| match best {
            Some(current) if compare(&run.metrics, &current.metrics) != Ordering::Greater => Some(current),
            _ => Some(run),
        })
}

fn compare_inference(a: &RunMetrics, b: &RunMetrics) -> Ordering {
    match (a, b) {
        (
            RunMetrics::Inference {
                map_at_k: map_a,
                precision_at_k: prec_a,
                ..
            },
            RunMetrics::Inference {
                map_at_k: map_b,
                precision_at_k: prec_b,
                ..
            },
        ) => map_a
            .partial_cmp(map_b)
            .unwrap_or(Ordering::Equal)
            .then_with(|| prec_a.partial_cmp(prec_b).unwrap_or(Ordering::Equal)),
        _ => Ordering::Equal,
    }
}

fn compare_heuristic(a: &RunMetrics, b: &RunMetrics) -> Ordering {
    match (a, b) {
        (
            RunMetrics::Heuristic {
                aligned: aligned_a,
                intent_high: intent_a,
                avg_score: avg_a,
            },
            RunMetrics::Heuristic {
                aligned: aligned_b,
                intent_high: intent_b,
                avg_score: avg_b,
            },
        ) => intent_a
            .cmp(intent_b)
            .then_with(|| aligned_a.cmp(aligned_b))
            .then_with(|| avg_a.partial_cmp(avg_b).unwrap_or(Ordering::Equal)),
        _ => Ordering::Equal,
    }
}
