use std::collections::BTreeSet;

use crate::{
    error::AppResult,
    models::{
        Interaction, InteractionKind, Item, ItemId, ListEntry, NewInteraction, NewItem, NewRating,
        Rating, RatingReceipt, UserId, WatchEvent,
    },
};

/// Typed item lookup. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemFilter {
    pub ids: Option<Vec<ItemId>>,
    pub published: Option<bool>,
    /// Item must carry at least one of these genres. An empty set matches nothing.
    pub genres_any: Option<BTreeSet<String>>,
    pub exclude: Vec<ItemId>,
}

impl ItemFilter {
    /// Published items only
    pub fn published() -> Self {
        Self {
            published: Some(true),
            ..Self::default()
        }
    }

    pub fn with_ids(mut self, ids: impl IntoIterator<Item = ItemId>) -> Self {
        self.ids = Some(ids.into_iter().collect());
        self
    }

    pub fn in_genres(mut self, genres: BTreeSet<String>) -> Self {
        self.genres_any = Some(genres);
        self
    }

    pub fn excluding(mut self, ids: impl IntoIterator<Item = ItemId>) -> Self {
        self.exclude.extend(ids);
        self
    }

    pub fn matches(&self, item: &Item) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&item.id) {
                return false;
            }
        }
        if let Some(published) = self.published {
            if item.published != published {
                return false;
            }
        }
        if let Some(genres) = &self.genres_any {
            if !item.shares_genre_with(genres) {
                return false;
            }
        }
        !self.exclude.contains(&item.id)
    }
}

/// Typed interaction lookup. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionFilter {
    pub user_ids: Option<Vec<UserId>>,
    pub item_ids: Option<Vec<ItemId>>,
    pub kind: Option<InteractionKind>,
}

impl InteractionFilter {
    pub fn for_users(user_ids: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            user_ids: Some(user_ids.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn for_items(item_ids: impl IntoIterator<Item = ItemId>) -> Self {
        Self {
            item_ids: Some(item_ids.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn of_kind(mut self, kind: InteractionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, interaction: &Interaction) -> bool {
        self.user_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&interaction.user_id))
            && self
                .item_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&interaction.item_id))
            && self.kind.map_or(true, |kind| kind == interaction.kind)
    }
}

/// Durable catalog and interaction storage
///
/// Uniqueness is keyed on (user, item, kind) for interactions and on (user, item)
/// for ratings, watches and list entries. Each user action maps to one method that
/// commits the activity row, its interaction and any derived aggregate together.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn get_item(&self, id: ItemId) -> AppResult<Option<Item>>;

    /// Items matching `filter`, ordered by id ascending
    async fn list_items(&self, filter: &ItemFilter) -> AppResult<Vec<Item>>;

    async fn create_item(&self, item: NewItem) -> AppResult<Item>;

    /// Atomically bumps the view counter. `None` if the item does not exist.
    async fn increment_views(&self, id: ItemId) -> AppResult<Option<i64>>;

    async fn interactions(&self, filter: &InteractionFilter) -> AppResult<Vec<Interaction>>;

    /// Inserts unless a row for (user, item, kind) exists. Returns whether a row was created.
    async fn insert_interaction_if_absent(&self, interaction: NewInteraction) -> AppResult<bool>;

    /// Creates or overwrites the (user, item) rating, ensures its `rated` interaction and
    /// recomputes the item's aggregate rating as one unit. `None` if the item does not exist.
    async fn save_rating(&self, rating: &NewRating) -> AppResult<Option<RatingReceipt>>;

    async fn get_rating(&self, user_id: UserId, item_id: ItemId) -> AppResult<Option<Rating>>;

    /// Deletes the rating and its `rated` interaction, then recomputes the aggregate, as one
    /// unit. Returns the new aggregate, or `None` if the user had not rated the item.
    async fn remove_rating(&self, user_id: UserId, item_id: ItemId) -> AppResult<Option<f64>>;

    /// All ratings, or those of one item
    async fn ratings(&self, item_id: Option<ItemId>) -> AppResult<Vec<Rating>>;

    /// Records the first watch together with its `watched` interaction.
    /// Returns whether the watch event was new.
    async fn record_watch(&self, user_id: UserId, item_id: ItemId) -> AppResult<bool>;

    /// All watch events, or one user's, newest first
    async fn watches(&self, user_id: Option<UserId>) -> AppResult<Vec<WatchEvent>>;

    /// Adds the list entry together with its `listed` interaction.
    /// Returns whether the entry was new.
    async fn add_list_entry(&self, user_id: UserId, item_id: ItemId) -> AppResult<bool>;

    /// Removes the list entry and its `listed` interaction. Returns whether an entry existed.
    async fn remove_list_entry(&self, user_id: UserId, item_id: ItemId) -> AppResult<bool>;

    /// All list entries, or one user's, newest first
    async fn list_entries(&self, user_id: Option<UserId>) -> AppResult<Vec<ListEntry>>;
}
