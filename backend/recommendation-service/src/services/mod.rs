pub mod backfill;
pub mod features;
pub mod heuristic;
pub mod inference;
pub mod recompute;
pub mod registry;
pub mod selection;

pub use backfill::BackfillPolicy;
pub use features::{FeatureBuilder, FeatureTable};
pub use heuristic::{HeuristicScorer, ScoringWeights};
pub use inference::{
    InferenceBridge, InferenceFailure, InferenceOutcome, InferenceRunner, ModelSwitch,
    ProcessInferenceRunner, ProcessSettings,
};
pub use recompute::{EngineSettings, RecomputeOrchestrator, RecomputeOutcome, RejectReason};
pub use registry::ModelRegistry;
pub use selection::ModelSelector;
