/// Backfill Policy
///
/// Tops every run up to exactly `min(K, active catalog)` unique products:
/// the run's own items first, then affinity peers, then the most viewed
/// products overall.
use std::collections::HashSet;

use crate::models::{CandidateItem, CandidateOrigin, ProductId, ProductRow, UserAffinity};

pub struct BackfillPolicy {
    output_size: usize,
    active: HashSet<ProductId>,
    /// Active products by view count descending, catalog order on ties
    by_popularity: Vec<ProductRow>,
}

impl BackfillPolicy {
    pub fn for_catalog(output_size: usize, catalog: &[ProductRow]) -> Self {
        let mut by_popularity = catalog.to_vec();
        by_popularity.sort_by(|a, b| b.view_count.cmp(&a.view_count));

        Self {
            output_size,
            active: catalog.iter().map(|p| p.id).collect(),
            by_popularity,
        }
    }

    pub fn target_len(&self) -> usize {
        self.output_size.min(self.active.len())
    }

    pub fn complete(&self, raw: Vec<CandidateItem>, affinity: &UserAffinity) -> Vec<CandidateItem> {
        let target = self.target_len();
        let mut seen: HashSet<ProductId> = HashSet::with_capacity(target);
        let mut items = Vec::with_capacity(target);

        for item in raw {
            if items.len() >= target {
                break;
            }
            if self.active.contains(&item.product_id) && seen.insert(item.product_id) {
                items.push(item);
            }
        }

        if !affinity.is_empty() {
            for product in &self.by_popularity {
                if items.len() >= target {
                    break;
                }
                let peer = affinity.matches(product.category_id.as_deref(), product.brand_id.as_deref());
                if peer && seen.insert(product.id) {
                    items.push(CandidateItem::filler(product.id, CandidateOrigin::Affinity));
                }
            }
        }

        for product in &self.by_popularity {
            if items.len() >= target {
                break;
            }
            if seen.insert(product.id) {
                items.push(CandidateItem::filler(product.id, CandidateOrigin::Popularity));
            }
        }

        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: i64, category: &str, views: i64) -> ProductRow {
        ProductRow {
            id,
            category_id: Some(category.to_string()),
            brand_id: None,
            view_count: views,
        }
    }

    fn catalog() -> Vec<ProductRow> {
        vec![
            product(1, "A", 5),
            product(2, "B", 50),
            product(3, "A", 20),
            product(4, "C", 50),
            product(5, "B", 1),
        ]
    }

    fn affinity(category: &str) -> UserAffinity {
        let mut a = UserAffinity::default();
        a.categories.insert(category.to_string());
        a
    }

    fn ids(items: &[CandidateItem]) -> Vec<i64> {
        items.iter().map(|i| i.product_id).collect()
    }

    #[test]
    fn test_empty_raw_uses_affinity_then_popularity() {
        let policy = BackfillPolicy::for_catalog(4, &catalog());
        let items = policy.complete(vec![], &affinity("A"));

        assert_eq!(ids(&items), vec![3, 1, 2, 4]);
        assert_eq!(items[0].origin, CandidateOrigin::Affinity);
        assert_eq!(items[2].origin, CandidateOrigin::Popularity);
        assert!(items.iter().all(|i| i.score == 0.0));
    }

    #[test]
    fn test_raw_is_deduplicated_and_restricted_to_active() {
        let policy = BackfillPolicy::for_catalog(3, &catalog());
        let raw = vec![
            CandidateItem::scored(5, 0.9),
            CandidateItem::scored(99, 0.8),
            CandidateItem::scored(5, 0.7),
        ];

        let items = policy.complete(raw, &UserAffinity::default());
        assert_eq!(ids(&items), vec![5, 2, 4]);
        assert_eq!(items[0].origin, CandidateOrigin::Model);
        assert_eq!(items[0].score, 0.9);
    }

    #[test]
    fn test_raw_truncated_to_output_size() {
        let policy = BackfillPolicy::for_catalog(2, &catalog());
        let raw = (1..=5).map(|id| CandidateItem::scored(id, 1.0)).collect();

        let items = policy.complete(raw, &affinity("B"));
        assert_eq!(ids(&items), vec![1, 2]);
    }

    #[test]
    fn test_small_catalog_caps_length() {
        let policy = BackfillPolicy::for_catalog(10, &catalog());
        let items = policy.complete(vec![], &UserAffinity::default());

        assert_eq!(items.len(), 5);
        let unique: HashSet<i64> = ids(&items).into_iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_empty_catalog() {
        let policy = BackfillPolicy::for_catalog(10, &[]);
        assert!(policy.complete(vec![CandidateItem::scored(1, 1.0)], &affinity("A")).is_empty());
    }
}
