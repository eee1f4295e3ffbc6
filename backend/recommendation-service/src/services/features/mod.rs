//! Feature Builder
//!
//! Turns the storefront rows for one user into a table of
//! [`FeatureRecord`]s, one per active product, plus the user's affinity,
//! the ground-truth set used for evaluation and the request context.

use chrono::{Local, NaiveDateTime};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::db::CatalogReader;
use crate::error::Result;
use crate::models::{
    ActionCode, FeatureContext, FeatureRecord, InteractionRow, PriceDetail, PriceRange, ProductId,
    ProductRow, PurchaseIntent, ReviewSummary, UserAffinity, UserProfile,
};
use crate::services::heuristic::{score_record, ScoringWeights};

pub mod context;

pub use context::derive_context;

/// Everything one recomputation needs to know about the user and catalog
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub context: FeatureContext,
    /// Sorted by the baseline heuristic score, descending
    pub records: Vec<FeatureRecord>,
    /// Active catalog in catalog order
    pub catalog: Vec<ProductRow>,
    pub affinity: UserAffinity,
    pub ground_truth: HashSet<ProductId>,
}

impl FeatureTable {
    pub fn record(&self, product_id: ProductId) -> Option<&FeatureRecord> {
        self.records.iter().find(|r| r.product_id == product_id)
    }

    pub fn records_by_id(&self) -> HashMap<ProductId, &FeatureRecord> {
        self.records.iter().map(|r| (r.product_id, r)).collect()
    }
}

pub struct FeatureBuilder {
    catalog: Arc<dyn CatalogReader>,
}

impl FeatureBuilder {
    pub fn new(catalog: Arc<dyn CatalogReader>) -> Self {
        Self { catalog }
    }

    pub async fn build(&self, user: &UserProfile) -> Result<FeatureTable> {
        self.build_at(user, Local::now().naive_local()).await
    }

    /// Same as [`build`](Self::build) with an explicit clock
    pub async fn build_at(&self, user: &UserProfile, now: NaiveDateTime) -> Result<FeatureTable> {
        let products = self.catalog.active_products().await?;
        let ids: Vec<ProductId> = products.iter().map(|p| p.id).collect();

        let prices = self.catalog.price_details(&ids).await?;
        let reviews = self.catalog.review_summaries(&ids).await?;
        let interactions = self.catalog.user_interactions(user.id).await?;

        let table = assemble(user, products, &prices, &reviews, &interactions, now);

        debug!(
            user_id = user.id,
            products = table.records.len(),
            interactions = interactions.len(),
            ground_truth = table.ground_truth.len(),
            "Feature table built"
        );

        Ok(table)
    }
}

/// Discount in whole percent, 0 unless both prices are positive
pub fn discount_percentage(price: Option<f64>, original: Option<f64>) -> u8 {
    match (price, original) {
        (Some(p), Some(o)) if p > 0.0 && o > 0.0 => {
            let pct = ((o - p) / o.max(1.0) * 100.0).round();
            pct.clamp(0.0, 100.0) as u8
        }
        _ => 0,
    }
}

#[derive(Default)]
struct ProductActivity {
    intent: PurchaseIntent,
    last_action: Option<ActionCode>,
}

/// Pure assembly step, separated from the reads
pub fn assemble(
    user: &UserProfile,
    products: Vec<ProductRow>,
    prices: &[PriceDetail],
    reviews: &[ReviewSummary],
    interactions: &[InteractionRow],
    now: NaiveDateTime,
) -> FeatureTable {
    let mut price_by_id: HashMap<ProductId, &PriceDetail> = HashMap::new();
    for detail in prices {
        price_by_id.entry(detail.product_id).or_insert(detail);
    }
    let review_by_id: HashMap<ProductId, &ReviewSummary> =
        reviews.iter().map(|r| (r.product_id, r)).collect();
    let active: HashSet<ProductId> = products.iter().map(|p| p.id).collect();

    let mut affinity = UserAffinity::default();
    let mut ground_truth = HashSet::new();
    let mut activity: HashMap<ProductId, ProductActivity> = HashMap::new();
    let mut device_type: Option<&str> = None;
    let mut seen_latest = false;

    // Interactions arrive newest first
    for interaction in interactions {
        if interaction.action.is_positive() {
            ground_truth.insert(interaction.product_id);
            if let Some(category) = &interaction.category_id {
                affinity.categories.insert(category.clone());
            }
            if let Some(brand) = &interaction.brand_id {
                affinity.brands.insert(brand.clone());
            }
        }

        if !active.contains(&interaction.product_id) {
            continue;
        }

        // Device comes from the newest active interaction only
        if !seen_latest {
            seen_latest = true;
            device_type = interaction.device_type.as_deref();
        }

        let entry = activity.entry(interaction.product_id).or_default();
        entry.last_action.get_or_insert(interaction.action);
        let intent = match interaction.action {
            ActionCode::Purchase => PurchaseIntent::High,
            ActionCode::Cart => PurchaseIntent::Medium,
            ActionCode::View => PurchaseIntent::None,
        };
        entry.intent = entry.intent.max(intent);
    }

    let context = derive_context(now, device_type, user.gender_id.as_deref());

    let mut records: Vec<FeatureRecord> = products
        .iter()
        .map(|product| {
            let detail = price_by_id.get(&product.id);
            let price = detail.and_then(|d| d.discount_price);
            let original_price = detail.and_then(|d| d.original_price);
            let review = review_by_id.get(&product.id);
            let act = activity.get(&product.id);

            FeatureRecord {
                product_id: product.id,
                price,
                original_price,
                discount_percentage: discount_percentage(price, original_price),
                view_count: product.view_count.max(0),
                average_rating: review.and_then(|r| r.average_rating).unwrap_or(0.0),
                rating_count: review.map(|r| r.rating_count).unwrap_or(0),
                purchase_intent: act.map(|a| a.intent).unwrap_or_default(),
                last_action: act.and_then(|a| a.last_action),
                category_id: product.category_id.clone(),
                brand_id: product.brand_id.clone(),
                price_range: PriceRange::from_price(price),
                context: context.clone(),
            }
        })
        .collect();

    // Baseline score first, affinity peers ahead on ties, catalog order after that
    let baseline: HashMap<ProductId, f64> = records
        .iter()
        .map(|r| (r.product_id, score_record(r, &ScoringWeights::BASELINE)))
        .collect();
    records.sort_by(|a, b| {
        let by_score = baseline[&b.product_id]
            .partial_cmp(&baseline[&a.product_id])
            .unwrap_or(Ordering::Equal);
        by_score.then_with(|| {
            let a_peer = affinity.matches(a.category_id.as_deref(), a.brand_id.as_deref());
            let b_peer = affinity.matches(b.category_id.as_deref(), b.brand_id.as_deref());
            b_peer.cmp(&a_peer)
        })
    });

    FeatureTable {
        context,
        records,
        catalog: products,
        affinity,
        ground_truth,
    }
}
