/// Heuristic Scoring Module
///
/// In-process fallback scorer. Every product gets five sub-signals in [0, 1]
/// which are combined by a named weight vector ("variant"). The final score
/// is a plain weighted sum, so it is only meaningful relative to other
/// scores of the same variant.
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::models::{CandidateItem, FeatureRecord};

const RATING_FLOOR: f64 = 1.0;
const RATING_SPAN: f64 = 4.0;
const RATING_VOLUME_CAP: f64 = 50.0;
const VIEW_CAP: f64 = 50.0;
const DISCOUNT_CAP: f64 = 70.0;

/// Weights for rating, rating volume, popularity, discount and intent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub rating: f64,
    pub rating_count: f64,
    pub popularity: f64,
    pub discount: f64,
    pub intent: f64,
}

impl ScoringWeights {
    /// Convenience ordering used by the feature builder
    pub const BASELINE: Self = Self::new(0.45, 0.15, 0.15, 0.15, 0.10);

    pub const fn new(rating: f64, rating_count: f64, popularity: f64, discount: f64, intent: f64) -> Self {
        Self {
            rating,
            rating_count,
            popularity,
            discount,
            intent,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::BASELINE
    }
}

/// Normalised sub-signals of one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubSignals {
    pub rating_quality: f64,
    pub rating_volume: f64,
    pub popularity: f64,
    pub discount: f64,
    pub intent: f64,
}

impl SubSignals {
    pub fn from_record(record: &FeatureRecord) -> Self {
        Self {
            rating_quality: unit((record.average_rating - RATING_FLOOR) / RATING_SPAN),
            rating_volume: unit(record.rating_count as f64 / RATING_VOLUME_CAP),
            popularity: unit(record.view_count as f64 / VIEW_CAP),
            discount: unit(f64::from(record.discount_percentage) / DISCOUNT_CAP),
            intent: record.purchase_intent.signal(),
        }
    }

    pub fn weighted(&self, weights: &ScoringWeights) -> f64 {
        weights.rating * self.rating_quality
            + weights.rating_count * self.rating_volume
            + weights.popularity * self.popularity
            + weights.discount * self.discount
            + weights.intent * self.intent
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

pub fn score_record(record: &FeatureRecord, weights: &ScoringWeights) -> f64 {
    SubSignals::from_record(record).weighted(weights)
}

pub struct HeuristicScorer;

impl HeuristicScorer {
    /// Score every record and order by score descending.
    ///
    /// The sort is stable: equal scores keep the input order.
    pub fn score(records: &[FeatureRecord], weights: &ScoringWeights) -> Vec<CandidateItem> {
        let mut items: Vec<CandidateItem> = records
            .iter()
            .map(|r| CandidateItem::scored(r.product_id, score_record(r, weights)))
            .collect();

        items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        items
    }
}
