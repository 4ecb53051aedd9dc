use std::collections::{BTreeSet, HashMap};

use tracing::instrument;

use super::{
    aggregator::InteractionGraph,
    catalog::{rank_by_rating, rank_by_score, require_item, validate_limit},
};
use crate::{
    db::{InteractionFilter, ItemFilter, Store},
    error::AppResult,
    models::{ItemId, Ranking, RankingStrategy, UserId},
};

/// Items most often co-interacted with `item_id`
///
/// Candidates are published items touched by anyone who touched the source
/// item, ranked by the number of distinct such users. When nobody has touched
/// the source item, published items sharing one of its genres are ranked by
/// aggregate rating instead. The source item is never returned.
#[instrument(skip(store))]
pub async fn similar_items(store: &dyn Store, item_id: ItemId, limit: i64) -> AppResult<Ranking> {
    let limit = validate_limit(limit)?;
    let item = require_item(store, item_id).await?;

    let audience: BTreeSet<UserId> = store
        .interactions(&InteractionFilter::for_items([item_id]))
        .await?
        .iter()
        .map(|interaction| interaction.user_id)
        .collect();

    if audience.is_empty() {
        let candidates = store
            .list_items(
                &ItemFilter::published()
                    .in_genres(item.genres.clone())
                    .excluding([item_id]),
            )
            .await?;

        tracing::info!(
            item_id = %item_id,
            candidates = candidates.len(),
            "No interactions for item, using genre fallback"
        );

        return Ok(Ranking::new(
            RankingStrategy::GenreFallback,
            rank_by_rating(candidates, limit),
        ));
    }

    let co_interactions = store
        .interactions(&InteractionFilter::for_users(audience.iter().copied()))
        .await?;
    let graph = InteractionGraph::from_interactions(&co_interactions);

    let mut scores: HashMap<ItemId, usize> = graph.user_counts();
    scores.remove(&item_id);

    let candidates = if scores.is_empty() {
        Vec::new()
    } else {
        store
            .list_items(&ItemFilter::published().with_ids(scores.keys().copied()))
            .await?
    };

    tracing::info!(
        item_id = %item_id,
        audience = audience.len(),
        candidates = candidates.len(),
        "Ranked similar items"
    );

    Ok(Ranking::new(
        RankingStrategy::Collaborative,
        rank_by_score(candidates, &scores, limit),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{MemoryStore, MockStore},
        error::AppError,
        models::{Item, NewInteraction, NewItem},
    };

    async fn add(store: &MemoryStore, title: &str, genres: &[&str]) -> Item {
        store
            .create_item(NewItem::new(title, 2000, genres))
            .await
            .unwrap()
    }

    async fn watch(store: &MemoryStore, user: i64, item: &Item) {
        store
            .insert_interaction_if_absent(NewInteraction::watched(UserId(user), item.id))
            .await
            .unwrap();
    }

    fn ids(ranking: &Ranking) -> Vec<ItemId> {
        ranking.items.iter().map(|s| s.id).collect()
    }

    #[tokio::test]
    async fn test_ranks_by_co_interacting_users() {
        let store = MemoryStore::new();
        let source = add(&store, "Source", &["Drama"]).await;
        let strong = add(&store, "Strong", &["Comedy"]).await;
        let weak = add(&store, "Weak", &["Comedy"]).await;
        let unrelated = add(&store, "Unrelated", &["Drama"]).await;

        for user in [1, 2] {
            watch(&store, user, &source).await;
            watch(&store, user, &strong).await;
        }
        watch(&store, 1, &weak).await;
        watch(&store, 9, &unrelated).await;

        let ranking = similar_items(&store, source.id, 6).await.unwrap();
        assert_eq!(ranking.strategy, RankingStrategy::Collaborative);
        assert_eq!(ids(&ranking), vec![strong.id, weak.id]);
    }

    #[tokio::test]
    async fn test_multiple_kinds_count_user_once() {
        let store = MemoryStore::new();
        let source = add(&store, "Source", &[]).await;
        let a = add(&store, "A", &[]).await;
        let b = add(&store, "B", &[]).await;

        watch(&store, 1, &source).await;
        watch(&store, 2, &source).await;
        // user 1 touches A three ways; users 1 and 2 both touch B once
        watch(&store, 1, &a).await;
        store
            .insert_interaction_if_absent(NewInteraction::listed(UserId(1), a.id))
            .await
            .unwrap();
        store
            .insert_interaction_if_absent(NewInteraction::rated(UserId(1), a.id, 5))
            .await
            .unwrap();
        watch(&store, 1, &b).await;
        watch(&store, 2, &b).await;

        let ranking = similar_items(&store, source.id, 6).await.unwrap();
        assert_eq!(ids(&ranking), vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn test_genre_fallback_without_interactions() {
        let store = MemoryStore::new();
        let source = add(&store, "Source", &["Horror", "Thriller"]).await;
        let horror = add(&store, "Horror", &["Horror"]).await;
        let thriller = add(&store, "Thriller", &["Thriller", "Crime"]).await;
        let _comedy = add(&store, "Comedy", &["Comedy"]).await;
        store
            .create_item(NewItem::new("Hidden", 2000, &["Horror"]).unpublished())
            .await
            .unwrap();

        let ranking = similar_items(&store, source.id, 6).await.unwrap();
        assert_eq!(ranking.strategy, RankingStrategy::GenreFallback);
        assert_eq!(ids(&ranking), vec![horror.id, thriller.id]);

        let limited = similar_items(&store, source.id, 1).await.unwrap();
        assert_eq!(ids(&limited), vec![horror.id]);
    }

    #[tokio::test]
    async fn test_excludes_unpublished_candidates() {
        let store = MemoryStore::new();
        let source = add(&store, "Source", &[]).await;
        let hidden = store
            .create_item(NewItem::new("Hidden", 2000, &[]).unpublished())
            .await
            .unwrap();
        watch(&store, 1, &source).await;
        watch(&store, 1, &hidden).await;

        let ranking = similar_items(&store, source.id, 6).await.unwrap();
        assert_eq!(ranking.strategy, RankingStrategy::Collaborative);
        assert!(ranking.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_item_and_bad_limit() {
        let store = MemoryStore::new();
        let source = add(&store, "Source", &[]).await;

        assert!(matches!(
            similar_items(&store, ItemId(404), 6).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            similar_items(&store, source.id, 0).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut store = MockStore::new();
        store
            .expect_get_item()
            .returning(|_| Err(AppError::Internal("connection reset".to_string())));

        let err = similar_items(&store, ItemId(1), 6).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
