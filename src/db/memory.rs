use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use super::store::{InteractionFilter, ItemFilter, Store};
use crate::{
    error::AppResult,
    models::{
        Interaction, InteractionKind, Item, ItemId, ListEntry, NewInteraction, NewItem, NewRating,
        Rating, RatingReceipt, UserId, WatchEvent,
    },
    services::aggregator::mean_rating,
};

type PairKey = (UserId, ItemId);

/// In-process store backed by ordered maps
///
/// Each trait method takes the lock once, so a composite write such as
/// `save_rating` is applied entirely or not at all, like a Postgres transaction.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_item_id: i64,
    /// Insertion counter; orders events that share a timestamp
    next_seq: u64,
    items: BTreeMap<ItemId, Item>,
    interactions: BTreeMap<(UserId, ItemId, InteractionKind), Interaction>,
    ratings: BTreeMap<PairKey, Rating>,
    watches: BTreeMap<PairKey, (u64, WatchEvent)>,
    list_entries: BTreeMap<PairKey, (u64, ListEntry)>,
}

impl MemoryInner {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn put_interaction(&mut self, interaction: NewInteraction) -> bool {
        let key = (interaction.user_id, interaction.item_id, interaction.kind);
        if self.interactions.contains_key(&key) {
            return false;
        }
        self.interactions.insert(
            key,
            Interaction {
                user_id: interaction.user_id,
                item_id: interaction.item_id,
                kind: interaction.kind,
                weight: interaction.weight,
                created_at: Utc::now(),
            },
        );
        true
    }

    /// Upserts the rating row. Returns the stored row and whether it was new.
    fn put_rating(&mut self, rating: &NewRating) -> (Rating, bool) {
        let now = Utc::now();
        let key = (rating.user_id, rating.item_id);

        if let Some(existing) = self.ratings.get_mut(&key) {
            existing.rating = rating.rating;
            existing.comment = rating.comment.clone();
            existing.updated_at = now;
            return (existing.clone(), false);
        }

        let created = Rating {
            user_id: rating.user_id,
            item_id: rating.item_id,
            rating: rating.rating,
            comment: rating.comment.clone(),
            created_at: now,
            updated_at: now,
        };
        self.ratings.insert(key, created.clone());
        (created, true)
    }

    fn put_watch(&mut self, user_id: UserId, item_id: ItemId) -> bool {
        if self.watches.contains_key(&(user_id, item_id)) {
            return false;
        }
        let seq = self.seq();
        let event = WatchEvent {
            user_id,
            item_id,
            watched_at: Utc::now(),
        };
        self.watches.insert((user_id, item_id), (seq, event));
        true
    }

    fn put_list_entry(&mut self, user_id: UserId, item_id: ItemId) -> bool {
        if self.list_entries.contains_key(&(user_id, item_id)) {
            return false;
        }
        let seq = self.seq();
        let entry = ListEntry {
            user_id,
            item_id,
            added_at: Utc::now(),
        };
        self.list_entries.insert((user_id, item_id), (seq, entry));
        true
    }

    /// Full mean of the item's current ratings, written back onto the item
    fn recompute(&mut self, item_id: ItemId) -> f64 {
        let values: Vec<i32> = self
            .ratings
            .values()
            .filter(|rating| rating.item_id == item_id)
            .map(|rating| rating.rating)
            .collect();
        let mean = mean_rating(&values);
        if let Some(item) = self.items.get_mut(&item_id) {
            item.aggregate_rating = mean;
        }
        mean
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Rating row without its interaction, as left behind by older releases
    pub(crate) async fn seed_legacy_rating(&self, rating: &NewRating) {
        self.inner.write().await.put_rating(rating);
    }

    /// Watch event without its interaction
    pub(crate) async fn seed_legacy_watch(&self, user_id: UserId, item_id: ItemId) {
        self.inner.write().await.put_watch(user_id, item_id);
    }

    /// List entry without its interaction
    pub(crate) async fn seed_legacy_list_entry(&self, user_id: UserId, item_id: ItemId) {
        self.inner.write().await.put_list_entry(user_id, item_id);
    }
}

/// Values newest first, optionally restricted to one user
fn newest_first<T: Clone>(
    rows: &BTreeMap<PairKey, (u64, T)>,
    user_id: Option<UserId>,
) -> Vec<T> {
    let mut selected: Vec<&(u64, T)> = rows
        .iter()
        .filter(|((user, _), _)| user_id.map_or(true, |wanted| *user == wanted))
        .map(|(_, row)| row)
        .collect();
    selected.sort_by(|a, b| b.0.cmp(&a.0));
    selected.into_iter().map(|(_, row)| row.clone()).collect()
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get_item(&self, id: ItemId) -> AppResult<Option<Item>> {
        Ok(self.inner.read().await.items.get(&id).cloned())
    }

    async fn list_items(&self, filter: &ItemFilter) -> AppResult<Vec<Item>> {
        let inner = self.inner.read().await;
        Ok(inner
            .items
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect())
    }

    async fn create_item(&self, item: NewItem) -> AppResult<Item> {
        let mut inner = self.inner.write().await;
        inner.next_item_id += 1;
        let created = Item {
            id: ItemId(inner.next_item_id),
            title: item.title,
            year: item.year,
            genres: item.genres.into_iter().collect(),
            language: item.language,
            thumbnail_ref: item.thumbnail_ref,
            aggregate_rating: 0.0,
            views: 0,
            published: item.published,
        };
        inner.items.insert(created.id, created.clone());
        Ok(created)
    }

    async fn increment_views(&self, id: ItemId) -> AppResult<Option<i64>> {
        let mut inner = self.inner.write().await;
        Ok(inner.items.get_mut(&id).map(|item| {
            item.views += 1;
            item.views
        }))
    }

    async fn interactions(&self, filter: &InteractionFilter) -> AppResult<Vec<Interaction>> {
        let inner = self.inner.read().await;
        Ok(inner
            .interactions
            .values()
            .filter(|interaction| filter.matches(interaction))
            .cloned()
            .collect())
    }

    async fn insert_interaction_if_absent(&self, interaction: NewInteraction) -> AppResult<bool> {
        Ok(self.inner.write().await.put_interaction(interaction))
    }

    async fn save_rating(&self, rating: &NewRating) -> AppResult<Option<RatingReceipt>> {
        let mut inner = self.inner.write().await;
        if !inner.items.contains_key(&rating.item_id) {
            return Ok(None);
        }

        let (saved, created) = inner.put_rating(rating);
        inner.put_interaction(NewInteraction::rated(
            rating.user_id,
            rating.item_id,
            rating.rating,
        ));
        let aggregate_rating = inner.recompute(rating.item_id);

        Ok(Some(RatingReceipt {
            rating: saved,
            aggregate_rating,
            created,
        }))
    }

    async fn get_rating(&self, user_id: UserId, item_id: ItemId) -> AppResult<Option<Rating>> {
        Ok(self
            .inner
            .read()
            .await
            .ratings
            .get(&(user_id, item_id))
            .cloned())
    }

    async fn remove_rating(&self, user_id: UserId, item_id: ItemId) -> AppResult<Option<f64>> {
        let mut inner = self.inner.write().await;
        if inner.ratings.remove(&(user_id, item_id)).is_none() {
            return Ok(None);
        }
        inner
            .interactions
            .remove(&(user_id, item_id, InteractionKind::Rated));
        Ok(Some(inner.recompute(item_id)))
    }

    async fn ratings(&self, item_id: Option<ItemId>) -> AppResult<Vec<Rating>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ratings
            .values()
            .filter(|rating| item_id.map_or(true, |wanted| rating.item_id == wanted))
            .cloned()
            .collect())
    }

    async fn record_watch(&self, user_id: UserId, item_id: ItemId) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        let created = inner.put_watch(user_id, item_id);
        inner.put_interaction(NewInteraction::watched(user_id, item_id));
        Ok(created)
    }

    async fn watches(&self, user_id: Option<UserId>) -> AppResult<Vec<WatchEvent>> {
        Ok(newest_first(&self.inner.read().await.watches, user_id))
    }

    async fn add_list_entry(&self, user_id: UserId, item_id: ItemId) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        let created = inner.put_list_entry(user_id, item_id);
        inner.put_interaction(NewInteraction::listed(user_id, item_id));
        Ok(created)
    }

    async fn remove_list_entry(&self, user_id: UserId, item_id: ItemId) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.list_entries.remove(&(user_id, item_id)).is_none() {
            return Ok(false);
        }
        inner
            .interactions
            .remove(&(user_id, item_id, InteractionKind::Listed));
        Ok(true)
    }

    async fn list_entries(&self, user_id: Option<UserId>) -> AppResult<Vec<ListEntry>> {
        Ok(newest_first(&self.inner.read().await.list_entries, user_id))
    }
}
