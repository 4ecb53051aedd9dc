use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde_json::{json, Value};

use super::{AppState, LimitQuery};
use crate::{
    error::AppResult,
    middleware::RequestId,
    models::{ItemId, Ranking},
    services::{self, catalog},
};

/// Handler for the similar-items endpoint
pub async fn similar(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Ranking>> {
    tracing::info!(request_id = %request_id, item_id = id, "Processing similar items request");

    let ranking =
        services::similar_items(state.store.as_ref(), ItemId(id), query.or_default(&state.settings))
            .await?;
    Ok(Json(ranking))
}

/// Handler for the popular-items endpoint
pub async fn popular(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Ranking>> {
    let ranking =
        catalog::popular_items(state.store.as_ref(), query.or_default(&state.settings)).await?;
    Ok(Json(ranking))
}

/// Counts one view of an item
pub async fn increment_views(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let views = services::increment_views(state.store.as_ref(), ItemId(id)).await?;
    Ok(Json(json!({ "views": views })))
}
