//! Storage seams of the engine.
//!
//! The storefront owns users, products, prices, reviews and interactions;
//! the engine only reads them through [`CatalogReader`] and appends
//! interactions through [`InteractionRecorder`]. The two result tables are
//! owned here and written through [`RecommendationStore`].

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    CachedRecommendation, InteractionRow, ModelRunResult, NewInteraction, PriceDetail, ProductId,
    ProductRow, RecommendationCacheEntry, RecordedInteraction, ReviewSummary, StoredModelRun,
    UserId, UserProfile,
};

mod catalog;
mod recommendations;

pub use catalog::PgCatalogRepository;
pub use recommendations::PgRecommendationRepository;

#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn find_user(&self, user_id: UserId) -> Result<Option<UserProfile>>;

    /// Active products in catalog order
    async fn active_products(&self) -> Result<Vec<ProductRow>>;

    /// First price detail per product
    async fn price_details(&self, product_ids: &[ProductId]) -> Result<Vec<PriceDetail>>;

    async fn review_summaries(&self, product_ids: &[ProductId]) -> Result<Vec<ReviewSummary>>;

    /// All interactions of the user, newest first
    async fn user_interactions(&self, user_id: UserId) -> Result<Vec<InteractionRow>>;
}

#[async_trait]
pub trait InteractionRecorder: Send + Sync {
    async fn record_interaction(&self, interaction: &NewInteraction) -> Result<RecordedInteraction>;
}

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Replace the user's cache rows and run log in one transaction
    async fn replace_for_user(
        &self,
        user_id: UserId,
        cache: &[RecommendationCacheEntry],
        runs: &[ModelRunResult],
    ) -> Result<()>;

    /// Cached rows ordered by score descending, then rank
    async fn cached(&self, user_id: UserId, limit: i64) -> Result<Vec<CachedRecommendation>>;

    /// Run log, newest first
    async fn runs_for_user(&self, user_id: UserId) -> Result<Vec<StoredModelRun>>;

    async fn clear(&self, user_id: UserId) -> Result<()>;
}
