use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::{
    error::{AppError, AppResult},
    middleware::CurrentUser,
    models::{InteractionKind, ItemId, ItemSummary, NewRating, Rating, RatingReceipt},
    services,
};

// Request types

#[derive(Debug, Deserialize)]
pub struct RecordInteractionRequest {
    pub item_id: i64,
    pub kind: String,
    /// Defaults to the kind's conventional weight; required for `rated`
    pub weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
}

fn created_status(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

// Handlers

/// Records a raw interaction for the caller
pub async fn record_interaction(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<RecordInteractionRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let user_id = user.require()?;
    let kind: InteractionKind = request.kind.parse()?;
    let weight = request
        .weight
        .or_else(|| kind.fixed_weight())
        .ok_or_else(|| AppError::InvalidInput(format!("Weight is required for '{}'", kind)))?;

    let created = services::record_interaction(
        state.store.as_ref(),
        user_id,
        ItemId(request.item_id),
        kind,
        weight,
    )
    .await?;

    Ok((created_status(created), Json(json!({ "created": created }))))
}

/// Creates or replaces the caller's rating of an item
pub async fn rate(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<RateRequest>,
) -> AppResult<(StatusCode, Json<RatingReceipt>)> {
    let rating = NewRating {
        user_id: user.require()?,
        item_id: ItemId(id),
        rating: request.rating,
        comment: request.comment,
    };

    let receipt = services::rate_item(state.store.as_ref(), rating).await?;
    Ok((created_status(receipt.created), Json(receipt)))
}

/// The caller's current rating of an item
pub async fn my_rating(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Rating>> {
    let rating = services::get_rating(state.store.as_ref(), user.require()?, ItemId(id)).await?;
    Ok(Json(rating))
}

/// Deletes the caller's rating of an item
pub async fn delete_rating(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let aggregate_rating =
        services::delete_rating(state.store.as_ref(), user.require()?, ItemId(id)).await?;
    Ok(Json(json!({ "aggregate_rating": aggregate_rating })))
}

/// Records that the caller watched an item
pub async fn watch(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let created = services::mark_watched(state.store.as_ref(), user.require()?, ItemId(id)).await?;
    Ok((created_status(created), Json(json!({ "created": created }))))
}

/// Adds an item to the caller's watchlist
pub async fn add_to_list(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let created = services::add_to_list(state.store.as_ref(), user.require()?, ItemId(id)).await?;
    Ok((created_status(created), Json(json!({ "created": created }))))
}

/// Removes an item from the caller's watchlist
pub async fn remove_from_list(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    services::remove_from_list(state.store.as_ref(), user.require()?, ItemId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The caller's watch history
pub async fn history(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<ItemSummary>>> {
    let items = services::watch_history(state.store.as_ref(), user.require()?).await?;
    Ok(Json(items))
}

/// The caller's watchlist
pub async fn watchlist(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<ItemSummary>>> {
    let items = services::watchlist(state.store.as_ref(), user.require()?).await?;
    Ok(Json(items))
}
