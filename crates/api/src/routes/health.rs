//! Health endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::context::AppContext;

pub fn router() -> Router<Arc<AppContext>> {
    Router::new().route("/health", get(health))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub queue: QueueSnapshot,
}

/// Sync queue load at the time of the request
#[derive(Serialize)]
pub struct QueueSnapshot {
    pub pending: usize,
    pub in_flight: usize,
    pub lanes: usize,
}

/// GET /health - liveness plus current queue load
async fn health(State(context): State<Arc<AppContext>>) -> Json<HealthResponse> {
    let stats = context.sync.stats();
    let status = if context.sync.is_shutting_down() { "draining" } else { "ok" };
    Json(HealthResponse {
        status,
        queue: QueueSnapshot {
            pending: stats.pending,
            in_flight: stats.in_flight,
            lanes: stats.lanes,
        },
    })
}
