use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::instrument;

use crate::{
    db::{ItemFilter, Store},
    error::{AppError, AppResult},
    models::{Item, ItemId, ItemSummary, Ranking, RankingStrategy},
};

/// Rejects non-positive limits
pub fn validate_limit(limit: i64) -> AppResult<usize> {
    if limit <= 0 {
        return Err(AppError::InvalidInput(format!(
            "Limit must be positive, got {}",
            limit
        )));
    }
    usize::try_from(limit).map_err(|_| AppError::InvalidInput(format!("Limit too large: {}", limit)))
}

/// Fetches an item or fails with NotFound
pub async fn require_item(store: &dyn Store, id: ItemId) -> AppResult<Item> {
    store
        .get_item(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))
}

/// Aggregate rating descending, then views descending, then id ascending
fn by_rating(a: &Item, b: &Item) -> Ordering {
    b.aggregate_rating
        .total_cmp(&a.aggregate_rating)
        .then_with(|| b.views.cmp(&a.views))
        .then_with(|| a.id.cmp(&b.id))
}

/// Orders items by rating and keeps the first `limit`
pub(crate) fn rank_by_rating(mut items: Vec<Item>, limit: usize) -> Vec<ItemSummary> {
    items.sort_by(by_rating);
    items.iter().take(limit).map(ItemSummary::from).collect()
}

/// Orders items by score descending, falling back to the rating order on ties
pub(crate) fn rank_by_score(
    mut items: Vec<Item>,
    scores: &HashMap<ItemId, usize>,
    limit: usize,
) -> Vec<ItemSummary> {
    let score = |item: &Item| scores.get(&item.id).copied().unwrap_or(0);
    items.sort_by(|a, b| score(b).cmp(&score(a)).then_with(|| by_rating(a, b)));
    items.iter().take(limit).map(ItemSummary::from).collect()
}

/// Globally popular published items
#[instrument(skip(store))]
pub async fn popular_items(store: &dyn Store, limit: i64) -> AppResult<Ranking> {
    let limit = validate_limit(limit)?;
    popular_excluding(store, &[], limit).await
}

/// Popularity ranking over published items not in `exclude`
pub(crate) async fn popular_excluding(
    store: &dyn Store,
    exclude: &[ItemId],
    limit: usize,
) -> AppResult<Ranking> {
    let items = store
        .list_items(&ItemFilter::published().excluding(exclude.iter().copied()))
        .await?;
    Ok(Ranking::new(
        RankingStrategy::Popularity,
        rank_by_rating(items, limit),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::NewItem;

    fn item(id: i64, rating: f64, views: i64) -> Item {
        Item {
            id: ItemId(id),
            title: format!("Movie {}", id),
            year: 2010,
            genres: Default::default(),
            language: None,
            thumbnail_ref: None,
            aggregate_rating: rating,
            views,
            published: true,
        }
    }

    fn ids(summaries: &[ItemSummary]) -> Vec<i64> {
        summaries.iter().map(|s| s.id.0).collect()
    }

    #[test]
    fn test_validate_limit() {
        assert_eq!(validate_limit(6).unwrap(), 6);
        assert!(matches!(validate_limit(0), Err(AppError::InvalidInput(_))));
        assert!(matches!(validate_limit(-3), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_rank_by_rating_total_order() {
        let items = vec![
            item(4, 3.0, 10),
            item(3, 4.5, 1),
            item(2, 3.0, 10),
            item(1, 3.0, 50),
        ];
        assert_eq!(ids(&rank_by_rating(items, 10)), vec![3, 1, 2, 4]);
    }

    #[test]
    fn test_rank_by_score_breaks_ties_by_rating_then_id() {
        let items = vec![item(1, 2.0, 0), item(2, 5.0, 0), item(3, 5.0, 0), item(4, 1.0, 0)];
        let scores = HashMap::from([(ItemId(1), 3), (ItemId(2), 1), (ItemId(3), 1), (ItemId(4), 3)]);
        assert_eq!(ids(&rank_by_score(items, &scores, 3)), vec![1, 4, 2]);
    }

    #[tokio::test]
    async fn test_popular_items_skips_unpublished() {
        let store = MemoryStore::new();
        let hidden = store
            .create_item(NewItem::new("Hidden", 2020, &["Drama"]).unpublished())
            .await
            .unwrap();
        let shown = store
            .create_item(NewItem::new("Shown", 2020, &["Drama"]))
            .await
            .unwrap();

        let ranking = popular_items(&store, 5).await.unwrap();
        assert_eq!(ranking.strategy, RankingStrategy::Popularity);
        assert_eq!(ranking.items.len(), 1);
        assert_eq!(ranking.items[0].id, shown.id);
        assert_ne!(ranking.items[0].id, hidden.id);
    }

    #[tokio::test]
    async fn test_require_item_not_found() {
        let store = MemoryStore::new();
        let err = require_item(&store, ItemId(5)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
