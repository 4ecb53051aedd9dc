use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::RecommenderSettings,
    db::Store,
    middleware::{make_span_with_request_id, request_id_middleware},
};

pub mod activity;
pub mod admin;
pub mod items;
pub mod recommendations;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub settings: RecommenderSettings,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, settings: RecommenderSettings) -> Self {
        Self { store, settings }
    }
}

/// Optional `?limit=` parameter; the configured default applies when absent
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    pub fn or_default(&self, settings: &RecommenderSettings) -> i64 {
        self.limit.unwrap_or(settings.default_limit)
    }
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/items/popular", get(items::popular))
        .route("/items/:id/similar", get(items::similar))
        .route("/items/:id/views", post(items::increment_views))
        .route(
            "/items/:id/rating",
            get(activity::my_rating)
                .put(activity::rate)
                .delete(activity::delete_rating),
        )
        .route("/items/:id/watch", post(activity::watch))
        .route(
            "/items/:id/list",
            post(activity::add_to_list).delete(activity::remove_from_list),
        )
        .route("/interactions", post(activity::record_interaction))
        .route("/recommendations", get(recommendations::recommend))
        .route("/me/history", get(activity::history))
        .route("/me/watchlist", get(activity::watchlist))
        .route("/admin/backfill", post(admin::backfill))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
