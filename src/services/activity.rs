use tracing::instrument;

use super::catalog::require_item;
use crate::{
    db::{ItemFilter, Store},
    error::{AppError, AppResult},
    models::{
        InteractionKind, ItemId, ItemSummary, NewInteraction, NewRating, Rating, RatingReceipt,
        UserId,
    },
};

/// Records a collaborative-filtering interaction
///
/// Insert-if-absent on (user, item, kind): a repeat leaves the original row and
/// weight untouched. Returns whether a row was created.
#[instrument(skip(store))]
pub async fn record_interaction(
    store: &dyn Store,
    user_id: UserId,
    item_id: ItemId,
    kind: InteractionKind,
    weight: f64,
) -> AppResult<bool> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(AppError::InvalidInput(format!(
            "Interaction weight must be a non-negative number, got {}",
            weight
        )));
    }
    require_item(store, item_id).await?;

    let created = store
        .insert_interaction_if_absent(NewInteraction {
            user_id,
            item_id,
            kind,
            weight,
        })
        .await?;

    tracing::debug!(created, "Interaction recorded");
    Ok(created)
}

/// Creates or replaces a user's rating and recomputes the item aggregate
///
/// The rating row, its `rated` interaction and the new aggregate are committed
/// as one store operation, so the caller always sees a value that includes this
/// write and a failure leaves none of it behind.
#[instrument(skip(store, rating), fields(user_id = %rating.user_id, item_id = %rating.item_id))]
pub async fn rate_item(store: &dyn Store, rating: NewRating) -> AppResult<RatingReceipt> {
    rating.validate()?;

    let receipt = store
        .save_rating(&rating)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Item {} not found", rating.item_id)))?;

    tracing::info!(
        value = rating.rating,
        created = receipt.created,
        aggregate_rating = receipt.aggregate_rating,
        "Rating saved"
    );
    Ok(receipt)
}

/// The user's current rating of an item
#[instrument(skip(store))]
pub async fn get_rating(store: &dyn Store, user_id: UserId, item_id: ItemId) -> AppResult<Rating> {
    store
        .get_rating(user_id, item_id)
        .await?
        .ok_or_else(|| no_rating(user_id, item_id))
}

/// Deletes a user's rating along with its interaction and recomputes the aggregate
///
/// Returns the new aggregate rating (0.0 once no ratings remain).
#[instrument(skip(store))]
pub async fn delete_rating(store: &dyn Store, user_id: UserId, item_id: ItemId) -> AppResult<f64> {
    let aggregate_rating = store
        .remove_rating(user_id, item_id)
        .await?
        .ok_or_else(|| no_rating(user_id, item_id))?;

    tracing::info!(aggregate_rating, "Rating deleted");
    Ok(aggregate_rating)
}

fn no_rating(user_id: UserId, item_id: ItemId) -> AppError {
    AppError::NotFound(format!("No rating by user {} for item {}", user_id, item_id))
}

/// Records a watch; the first one wins and repeats are no-ops
#[instrument(skip(store))]
pub async fn mark_watched(store: &dyn Store, user_id: UserId, item_id: ItemId) -> AppResult<bool> {
    require_item(store, item_id).await?;
    store.record_watch(user_id, item_id).await
}

/// Adds an item to the user's watchlist
#[instrument(skip(store))]
pub async fn add_to_list(store: &dyn Store, user_id: UserId, item_id: ItemId) -> AppResult<bool> {
    require_item(store, item_id).await?;
    store.add_list_entry(user_id, item_id).await
}

/// Removes an item from the user's watchlist, dropping its interaction too
#[instrument(skip(store))]
pub async fn remove_from_list(
    store: &dyn Store,
    user_id: UserId,
    item_id: ItemId,
) -> AppResult<()> {
    if !store.remove_list_entry(user_id, item_id).await? {
        return Err(AppError::NotFound(format!(
            "Item {} is not in the watchlist",
            item_id
        )));
    }
    Ok(())
}

/// Atomically counts one view
#[instrument(skip(store))]
pub async fn increment_views(store: &dyn Store, item_id: ItemId) -> AppResult<i64> {
    store
        .increment_views(item_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Item {} not found", item_id)))
}

/// Items the user watched, most recent first
pub async fn watch_history(store: &dyn Store, user_id: UserId) -> AppResult<Vec<ItemSummary>> {
    let watches = store.watches(Some(user_id)).await?;
    summaries_in_order(store, watches.iter().map(|w| w.item_id).collect()).await
}

/// Items on the user's watchlist, most recently added first
pub async fn watchlist(store: &dyn Store, user_id: UserId) -> AppResult<Vec<ItemSummary>> {
    let entries = store.list_entries(Some(user_id)).await?;
    summaries_in_order(store, entries.iter().map(|e| e.item_id).collect()).await
}

async fn summaries_in_order(store: &dyn Store, ids: Vec<ItemId>) -> AppResult<Vec<ItemSummary>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let items = store
        .list_items(&ItemFilter::default().with_ids(ids.iter().copied()))
        .await?;
    Ok(ids
        .iter()
        .filter_map(|id| items.iter().find(|item| item.id == *id))
        .map(ItemSummary::from)
        .collect())
}
