use axum::{
    extract::{Query, State},
    Extension, Json,
};

use super::{AppState, LimitQuery};
use crate::{
    error::AppResult,
    middleware::{CurrentUser, RequestId},
    models::Recommendation,
    services,
};

/// Handler for recommendations endpoint
pub async fn recommend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Recommendation>> {
    tracing::info!(
        request_id = %request_id,
        user_id = ?user_id,
        "Processing recommendation request"
    );

    let recommendation = services::recommend_for_user(
        state.store.as_ref(),
        &state.settings,
        user_id,
        query.or_default(&state.settings),
    )
    .await?;

    Ok(Json(recommendation))
}
