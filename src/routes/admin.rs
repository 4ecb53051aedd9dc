use axum::{extract::State, Extension, Json};

use super::AppState;
use crate::{error::AppResult, middleware::RequestId, models::BackfillReport, services};

/// Runs the interaction backfill. Exposure is controlled by the upstream gateway.
pub async fn backfill(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> AppResult<Json<BackfillReport>> {
    tracing::info!(request_id = %request_id, "Starting interaction backfill");
    let report = services::backfill_interactions(state.store.as_ref()).await?;
    Ok(Json(report))
}
