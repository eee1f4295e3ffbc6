use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub type UserId = i64;
pub type ProductId = i64;

// ============================================
// Storefront rows (read-only)
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    pub id: UserId,
    pub role_id: Option<String>,
    pub gender_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductRow {
    pub id: ProductId,
    pub category_id: Option<String>,
    pub brand_id: Option<String>,
    pub view_count: i64,
}

/// First price detail of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceDetail {
    pub product_id: ProductId,
    pub discount_price: Option<f64>,
    pub original_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewSummary {
    pub product_id: ProductId,
    pub rating_count: i64,
    pub average_rating: Option<f64>,
}

/// One interaction of the user, joined with the product it touched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRow {
    pub product_id: ProductId,
    pub action: ActionCode,
    pub device_type: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub category_id: Option<String>,
    pub brand_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionCode {
    View,
    Cart,
    Purchase,
}

impl ActionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionCode::View => "view",
            ActionCode::Cart => "cart",
            ActionCode::Purchase => "purchase",
        }
    }

    /// Cart and purchase count as positive feedback
    pub fn is_positive(&self) -> bool {
        matches!(self, ActionCode::Cart | ActionCode::Purchase)
    }
}

impl FromStr for ActionCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(ActionCode::View),
            "cart" => Ok(ActionCode::Cart),
            "purchase" => Ok(ActionCode::Purchase),
            other => Err(format!("Unknown action code: {other}")),
        }
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
        }
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(DeviceType::Desktop),
            "mobile" => Ok(DeviceType::Mobile),
            "tablet" => Ok(DeviceType::Tablet),
            other => Err(format!("Unknown device type: {other}")),
        }
    }
}

/// Interaction accepted by the ingestion endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct NewInteraction {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub action: ActionCode,
    pub device_type: Option<DeviceType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedInteraction {
    pub id: i64,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub action: ActionCode,
    pub device_type: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ============================================
// Features
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseIntent {
    #[default]
    None,
    Medium,
    High,
}

impl PurchaseIntent {
    /// Intent sub-signal used by the heuristic scorer
    pub fn signal(&self) -> f64 {
        match self {
            PurchaseIntent::None => 0.0,
            PurchaseIntent::Medium => 0.5,
            PurchaseIntent::High => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceRange {
    #[default]
    Unknown,
    Low,
    Mid,
    High,
    Premium,
}

impl PriceRange {
    pub fn from_price(price: Option<f64>) -> Self {
        match price {
            None => PriceRange::Unknown,
            Some(p) if p < 200_000.0 => PriceRange::Low,
            Some(p) if p < 1_000_000.0 => PriceRange::Mid,
            Some(p) if p < 3_000_000.0 => PriceRange::High,
            Some(_) => PriceRange::Premium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Night,
    Morning,
    Afternoon,
    Evening,
}

/// Request context shared by every record of one feature table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContext {
    pub hour: u32,
    /// ISO weekday, Monday = 1
    pub day_of_week: u32,
    pub month: u32,
    pub season: Season,
    pub time_of_day: TimeOfDay,
    pub is_weekend: bool,
    pub device_type: String,
    pub gender: Option<String>,
    pub gender_code: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub product_id: ProductId,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    pub discount_percentage: u8,
    pub view_count: i64,
    pub average_rating: f64,
    pub rating_count: i64,
    pub purchase_intent: PurchaseIntent,
    pub last_action: Option<ActionCode>,
    pub category_id: Option<String>,
    pub brand_id: Option<String>,
    pub price_range: PriceRange,
    pub context: FeatureContext,
}

/// Preferred categories and brands, taken from cart and purchase history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserAffinity {
    pub categories: BTreeSet<String>,
    pub brands: BTreeSet<String>,
}

impl UserAffinity {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.brands.is_empty()
    }

    pub fn matches(&self, category_id: Option<&str>, brand_id: Option<&str>) -> bool {
        category_id.is_some_and(|c| self.categories.contains(c))
            || brand_id.is_some_and(|b| self.brands.contains(b))
    }
}

// ============================================
// Candidates and runs
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateOrigin {
    #[default]
    Model,
    Affinity,
    Popularity,
}

impl CandidateOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateOrigin::Model => "model",
            CandidateOrigin::Affinity => "affinity",
            CandidateOrigin::Popularity => "popularity",
        }
    }
}

impl FromStr for CandidateOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(CandidateOrigin::Model),
            "affinity" => Ok(CandidateOrigin::Affinity),
            "popularity" => Ok(CandidateOrigin::Popularity),
            other => Err(format!("Unknown candidate origin: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateItem {
    pub product_id: ProductId,
    pub score: f64,
    #[serde(default)]
    pub origin: CandidateOrigin,
}

impl CandidateItem {
    pub fn scored(product_id: ProductId, score: f64) -> Self {
        Self {
            product_id,
            score,
            origin: CandidateOrigin::Model,
        }
    }

    pub fn filler(product_id: ProductId, origin: CandidateOrigin) -> Self {
        Self {
            product_id,
            score: 0.0,
            origin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunSource {
    Inference,
    Heuristic,
}

impl RunSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunSource::Inference => "inference",
            RunSource::Heuristic => "heuristic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunMetrics {
    Inference {
        k: usize,
        precision_at_k: f64,
        map_at_k: f64,
    },
    Heuristic {
        aligned: usize,
        intent_high: usize,
        avg_score: f64,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRunResult {
    pub model_name: String,
    pub source: RunSource,
    pub items: Vec<CandidateItem>,
    pub metrics: RunMetrics,
}

impl ModelRunResult {
    pub fn is_failed(&self) -> bool {
        matches!(self.metrics, RunMetrics::Failed { .. })
    }
}

// ============================================
// Persisted results
// ============================================

/// Row written to the recommendation cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationCacheEntry {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub model_name: String,
    pub score: f64,
    pub rank: i32,
    pub origin: CandidateOrigin,
}

impl RecommendationCacheEntry {
    /// Cache rows for the winning run, ranked from 1
    pub fn from_run(user_id: UserId, run: &ModelRunResult) -> Vec<Self> {
        run.items
            .iter()
            .enumerate()
            .map(|(i, item)| Self {
                user_id,
                product_id: item.product_id,
                model_name: run.model_name.clone(),
                score: item.score,
                rank: i as i32 + 1,
                origin: item.origin,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecommendation {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub model_name: String,
    pub score: f64,
    pub rank: i32,
    pub origin: CandidateOrigin,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredModelRun {
    pub id: i64,
    pub user_id: UserId,
    pub model_name: String,
    pub source: RunSource,
    pub metrics: RunMetrics,
    pub recommendations: Vec<CandidateItem>,
    pub created_at: DateTime<Utc>,
}
