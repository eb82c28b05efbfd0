//! HTTP endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use super::DashboardState;
use crate::event::ItemView;
use crate::model::WorkId;

/// GET /health
pub async fn health(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "queueSize": state.service.len(),
        "timestamp": Utc::now().timestamp_millis(),
    }))
}

/// GET /queue-stats
pub async fn queue_stats(State(state): State<DashboardState>) -> impl IntoResponse {
    let items: Vec<ItemView> = state
        .service
        .all_items()
        .iter()
        .map(ItemView::from)
        .collect();

    Json(json!({
        "items": items,
        "stats": state.service.report(),
    }))
}

/// POST /queue-delete/:id
///
/// Succeeds for unknown ids too; the item is gone either way.
pub async fn queue_delete(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let removed = state.service.remove(&WorkId::from(id.as_str())).await;
    info!(id = %id, removed, "dashboard delete");
    Json(json!({ "success": true }))
}

/// POST /queue-clear
pub async fn queue_clear(State(state): State<DashboardState>) -> impl IntoResponse {
    let cleared = state.service.clear().await;
    info!(cleared, "dashboard clear");
    Json(json!({ "success": true, "cleared": cleared }))
}

/// POST /queue-purge/:max_priority
///
/// Drops every unclaimed item less urgent than `max_priority`.
pub async fn queue_purge(
    State(state): State<DashboardState>,
    Path(max_priority): Path<u8>,
) -> impl IntoResponse {
    let purged = state.service.purge_above_priority(max_priority).await;
    info!(max_priority, purged, "dashboard purge");
    Json(json!({ "success": true, "purged": purged }))
}
