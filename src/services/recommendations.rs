use std::collections::{BTreeSet, HashMap};

use tracing::instrument;

use super::{
    aggregator::InteractionGraph,
    catalog::{popular_excluding, rank_by_rating, rank_by_score, validate_limit},
};
use crate::{
    config::RecommenderSettings,
    db::{InteractionFilter, ItemFilter, Store},
    error::{AppError, AppResult},
    models::{ItemId, Ranking, RankingStrategy, Recommendation, UserId},
};

/// A user who shares enough history with the target user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub user_id: UserId,
    pub shared_items: usize,
}

/// Generates personalized recommendations for a signed-in user
///
/// Users below the cold-start threshold get `InsufficientHistory` so callers can
/// show onboarding instead. Otherwise the user-based pass runs first: neighbors
/// are users sharing at least `min_common_items` items with the target, and
/// candidates are the published items those neighbors touched that the target
/// has not, ranked by the number of contributing neighbors. If that yields
/// nothing, items sharing a genre with the user's history are tried, then
/// global popularity.
#[instrument(skip(store, settings))]
pub async fn recommend_for_user(
    store: &dyn Store,
    settings: &RecommenderSettings,
    user_id: Option<UserId>,
    limit: i64,
) -> AppResult<Recommendation> {
    let user_id = user_id.ok_or_else(|| {
        AppError::Unauthorized("Recommendations require a signed-in user".to_string())
    })?;
    let limit = validate_limit(limit)?;

    let touched: BTreeSet<ItemId> = store
        .interactions(&InteractionFilter::for_users([user_id]))
        .await?
        .iter()
        .map(|interaction| interaction.item_id)
        .collect();

    if touched.len() < settings.cold_start_threshold {
        tracing::info!(
            user_id = %user_id,
            history = touched.len(),
            threshold = settings.cold_start_threshold,
            "Insufficient history for recommendations"
        );
        return Ok(Recommendation::InsufficientHistory);
    }

    if touched.is_empty() {
        let ranking = popular_excluding(store, &[], limit).await?;
        return Ok(finish(user_id, ranking));
    }

    let neighbors = find_neighbors(store, settings, user_id, &touched).await?;
    tracing::debug!(user_id = %user_id, neighbors = neighbors.len(), "Neighbor search done");

    if !neighbors.is_empty() {
        let ranking = rank_from_neighbors(store, &neighbors, &touched, limit).await?;
        if !ranking.is_empty() {
            return Ok(finish(user_id, ranking));
        }
    }

    let ranking = genre_fallback(store, &touched, limit).await?;
    if !ranking.is_empty() {
        return Ok(finish(user_id, ranking));
    }

    let exclude: Vec<ItemId> = touched.iter().copied().collect();
    let ranking = popular_excluding(store, &exclude, limit).await?;
    Ok(finish(user_id, ranking))
}

fn finish(user_id: UserId, ranking: Ranking) -> Recommendation {
    if ranking.is_empty() {
        tracing::info!(user_id = %user_id, "No recommendation candidates");
        return Recommendation::NoCandidates;
    }

    tracing::info!(
        user_id = %user_id,
        strategy = ?ranking.strategy,
        count = ranking.items.len(),
        "Recommendations ranked"
    );
    Recommendation::Ranked(ranking)
}

/// Users sharing at least `min_common_items` items with `user_id`
///
/// Ordered by shared count descending, then user id ascending; at most
/// `max_neighbors` are kept.
pub async fn find_neighbors(
    store: &dyn Store,
    settings: &RecommenderSettings,
    user_id: UserId,
    touched: &BTreeSet<ItemId>,
) -> AppResult<Vec<Neighbor>> {
    let overlapping = store
        .interactions(&InteractionFilter::for_items(touched.iter().copied()))
        .await?;
    let graph = InteractionGraph::from_interactions(&overlapping);

    // The slice only covers the target's items, so each count is a shared count
    let mut neighbors: Vec<Neighbor> = graph
        .item_counts()
        .into_iter()
        .filter(|(other, shared)| *other != user_id && *shared >= settings.min_common_items)
        .map(|(other, shared)| Neighbor {
            user_id: other,
            shared_items: shared,
        })
        .collect();

    neighbors.sort_by(|a, b| {
        b.shared_items
            .cmp(&a.shared_items)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    neighbors.truncate(settings.max_neighbors);
    Ok(neighbors)
}

async fn rank_from_neighbors(
    store: &dyn Store,
    neighbors: &[Neighbor],
    touched: &BTreeSet<ItemId>,
    limit: usize,
) -> AppResult<Ranking> {
    let neighbor_history = store
        .interactions(&InteractionFilter::for_users(
            neighbors.iter().map(|n| n.user_id),
        ))
        .await?;
    let graph = InteractionGraph::from_interactions(&neighbor_history);

    let scores: HashMap<ItemId, usize> = graph
        .user_counts()
        .into_iter()
        .filter(|(item, _)| !touched.contains(item))
        .collect();

    if scores.is_empty() {
        return Ok(Ranking::new(RankingStrategy::Collaborative, Vec::new()));
    }

    let candidates = store
        .list_items(&ItemFilter::published().with_ids(scores.keys().copied()))
        .await?;

    Ok(Ranking::new(
        RankingStrategy::Collaborative,
        rank_by_score(candidates, &scores, limit),
    ))
}

/// Published, untouched items sharing a genre with anything in the user's history
async fn genre_fallback(
    store: &dyn Store,
    touched: &BTreeSet<ItemId>,
    limit: usize,
) -> AppResult<Ranking> {
    let history = store
        .list_items(&ItemFilter::default().with_ids(touched.iter().copied()))
        .await?;
    let genres: BTreeSet<String> = history
        .into_iter()
        .flat_map(|item| item.genres.into_iter())
        .collect();

    let candidates = store
        .list_items(
            &ItemFilter::published()
                .in_genres(genres)
                .excluding(touched.iter().copied()),
        )
        .await?;

    Ok(Ranking::new(
        RankingStrategy::GenreFallback,
        rank_by_rating(candidates, limit),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{MemoryStore, MockStore},
        models::{Item, NewInteraction, NewItem},
    };

    async fn add(store: &MemoryStore, title: &str, genres: &[&str]) -> Item {
        store
            .create_item(NewItem::new(title, 2001, genres))
            .await
            .unwrap()
    }

    async fn watch(store: &MemoryStore, user: i64, item: &Item) {
        store
            .insert_interaction_if_absent(NewInteraction::watched(UserId(user), item.id))
            .await
            .unwrap();
    }

    fn ranked(recommendation: Recommendation) -> Ranking {
        match recommendation {
            Recommendation::Ranked(ranking) => ranking,
            other => panic!("expected ranked recommendations, got {:?}", other),
        }
    }

    fn ids(ranking: &Ranking) -> Vec<ItemId> {
        ranking.items.iter().map(|s| s.id).collect()
    }

    #[tokio::test]
    async fn test_neighbor_items_are_recommended() {
        let store = MemoryStore::new();
        let items = [
            add(&store, "One", &["Drama"]).await,
            add(&store, "Two", &["Drama"]).await,
            add(&store, "Three", &["Drama"]).await,
            add(&store, "Four", &["Comedy"]).await,
        ];
        for item in &items[0..3] {
            watch(&store, 1, item).await;
        }
        for item in &items[1..4] {
            watch(&store, 2, item).await;
        }

        let result = recommend_for_user(&store, &RecommenderSettings::default(), Some(UserId(1)), 6)
            .await
            .unwrap();
        let ranking = ranked(result);
        assert_eq!(ranking.strategy, RankingStrategy::Collaborative);
        assert_eq!(ids(&ranking), vec![items[3].id]);
    }

    #[tokio::test]
    async fn test_cold_user_gets_insufficient_history() {
        let store = MemoryStore::new();
        add(&store, "One", &["Drama"]).await;

        let result = recommend_for_user(&store, &RecommenderSettings::default(), Some(UserId(1)), 6)
            .await
            .unwrap();
        assert_eq!(result, Recommendation::InsufficientHistory);
    }

    #[tokio::test]
    async fn test_threshold_is_configurable() {
        let store = MemoryStore::new();
        let one = add(&store, "One", &["Drama"]).await;
        watch(&store, 1, &one).await;

        let settings = RecommenderSettings {
            cold_start_threshold: 2,
            ..RecommenderSettings::default()
        };
        let result = recommend_for_user(&store, &settings, Some(UserId(1)), 6)
            .await
            .unwrap();
        assert_eq!(result, Recommendation::InsufficientHistory);
    }

    #[tokio::test]
    async fn test_zero_threshold_empty_history_uses_popularity() {
        let store = MemoryStore::new();
        let low = add(&store, "Low", &[]).await;
        let high = add(&store, "High", &[]).await;
        store
            .save_rating(&crate::models::NewRating {
                user_id: UserId(5),
                item_id: high.id,
                rating: 5,
                comment: String::new(),
            })
            .await
            .unwrap();

        let settings = RecommenderSettings {
            cold_start_threshold: 0,
            ..RecommenderSettings::default()
        };
        let ranking = ranked(
            recommend_for_user(&store, &settings, Some(UserId(1)), 6)
                .await
                .unwrap(),
        );
        assert_eq!(ranking.strategy, RankingStrategy::Popularity);
        assert_eq!(ids(&ranking), vec![high.id, low.id]);
    }

    #[tokio::test]
    async fn test_genre_fallback_without_neighbors() {
        let store = MemoryStore::new();
        let seen = add(&store, "Seen", &["Sci-Fi"]).await;
        let good = add(&store, "Good", &["Sci-Fi", "Action"]).await;
        let better = add(&store, "Better", &["Sci-Fi"]).await;
        let _other = add(&store, "Other", &["Romance"]).await;
        watch(&store, 1, &seen).await;
        // user 2 shares only one item with user 1: below the neighbor threshold
        watch(&store, 2, &seen).await;
        watch(&store, 2, &good).await;

        for (user, value) in [(7, 5), (8, 4)] {
            store
                .save_rating(&crate::models::NewRating {
                    user_id: UserId(user),
                    item_id: better.id,
                    rating: value,
                    comment: String::new(),
                })
                .await
                .unwrap();
        }

        let ranking = ranked(
            recommend_for_user(&store, &RecommenderSettings::default(), Some(UserId(1)), 6)
                .await
                .unwrap(),
        );
        assert_eq!(ranking.strategy, RankingStrategy::GenreFallback);
        assert_eq!(ids(&ranking), vec![better.id, good.id]);
    }

    #[tokio::test]
    async fn test_popularity_when_genres_exhausted() {
        let store = MemoryStore::new();
        let seen = add(&store, "Seen", &["Western"]).await;
        let other = add(&store, "Other", &["Musical"]).await;
        watch(&store, 1, &seen).await;

        let ranking = ranked(
            recommend_for_user(&store, &RecommenderSettings::default(), Some(UserId(1)), 6)
                .await
                .unwrap(),
        );
        assert_eq!(ranking.strategy, RankingStrategy::Popularity);
        assert_eq!(ids(&ranking), vec![other.id]);
    }

    #[tokio::test]
    async fn test_no_candidates_when_catalog_exhausted() {
        let store = MemoryStore::new();
        let only = add(&store, "Only", &["Western"]).await;
        watch(&store, 1, &only).await;

        let result = recommend_for_user(&store, &RecommenderSettings::default(), Some(UserId(1)), 6)
            .await
            .unwrap();
        assert_eq!(result, Recommendation::NoCandidates);
    }

    #[tokio::test]
    async fn test_neighbors_ranked_and_capped() {
        let store = MemoryStore::new();
        let mut items = Vec::new();
        for n in 0..4 {
            items.push(add(&store, &format!("Item {}", n), &[]).await);
        }
        for item in &items[0..3] {
            watch(&store, 1, item).await;
        }
        // user 3 shares three items, users 2 and 4 share two, user 5 shares one
        for item in &items[0..3] {
            watch(&store, 3, item).await;
        }
        for user in [2, 4] {
            watch(&store, user, &items[0]).await;
            watch(&store, user, &items[1]).await;
        }
        watch(&store, 5, &items[0]).await;

        let touched: BTreeSet<ItemId> = items[0..3].iter().map(|i| i.id).collect();
        let settings = RecommenderSettings {
            max_neighbors: 2,
            ..RecommenderSettings::default()
        };
        let neighbors = find_neighbors(&store, &settings, UserId(1), &touched)
            .await
            .unwrap();

        assert_eq!(
            neighbors,
            vec![
                Neighbor {
                    user_id: UserId(3),
                    shared_items: 3
                },
                Neighbor {
                    user_id: UserId(2),
                    shared_items: 2
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_candidates_ranked_by_contributing_neighbors() {
        let store = MemoryStore::new();
        let shared_a = add(&store, "Shared A", &[]).await;
        let shared_b = add(&store, "Shared B", &[]).await;
        let niche = add(&store, "Niche", &[]).await;
        let crowd = add(&store, "Crowd", &[]).await;

        for user in [1, 2, 3] {
            watch(&store, user, &shared_a).await;
            watch(&store, user, &shared_b).await;
        }
        watch(&store, 2, &niche).await;
        watch(&store, 2, &crowd).await;
        watch(&store, 3, &crowd).await;

        let ranking = ranked(
            recommend_for_user(&store, &RecommenderSettings::default(), Some(UserId(1)), 6)
                .await
                .unwrap(),
        );
        assert_eq!(ids(&ranking), vec![crowd.id, niche.id]);

        let limited = ranked(
            recommend_for_user(&store, &RecommenderSettings::default(), Some(UserId(1)), 1)
                .await
                .unwrap(),
        );
        assert_eq!(ids(&limited), vec![crowd.id]);
    }

    #[tokio::test]
    async fn test_anonymous_and_bad_limit() {
        let store = MemoryStore::new();
        let settings = RecommenderSettings::default();

        assert!(matches!(
            recommend_for_user(&store, &settings, None, 6).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            recommend_for_user(&store, &settings, Some(UserId(1)), -1).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut store = MockStore::new();
        store
            .expect_interactions()
            .returning(|_| Err(AppError::Internal("pool timed out".to_string())));

        let result =
            recommend_for_user(&store, &RecommenderSettings::default(), Some(UserId(1)), 6).await;
        tokio_test::assert_err!(result);
    }
}
