//! HTTP routes
//!
//! One file per surface area; each contributes a [`axum::Router`] merged
//! by [`router`]. Handlers return domain errors and [`ApiError`] maps them
//! onto statuses in one place.

pub mod availability;
pub mod health;
pub mod meetings;
pub mod oauth;
pub mod webhooks;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use calweave_common::QueueError;
use calweave_domain::{CalWeaveError, SyncTask};
use serde::Serialize;
use tracing::warn;

use crate::context::AppContext;

/// Standard API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Convert domain errors to HTTP responses
pub struct ApiError(CalWeaveError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CalWeaveError::Validation(_) => StatusCode::BAD_REQUEST,
            CalWeaveError::AuthExpired(_) => StatusCode::UNAUTHORIZED,
            CalWeaveError::NotFound(_) => StatusCode::NOT_FOUND,
            CalWeaveError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            CalWeaveError::Transient(_)
            | CalWeaveError::Config(_)
            | CalWeaveError::Serialization(_)
            | CalWeaveError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

impl From<CalWeaveError> for ApiError {
    fn from(err: CalWeaveError) -> Self {
        Self(err)
    }
}

/// Enqueue a follow-up sync task without failing the request.
///
/// The durable mutation has already been stored; a refused enqueue only
/// delays mirroring until the next sweep.
pub(crate) fn enqueue_best_effort(context: &AppContext, task: SyncTask) {
    match context.sync.enqueue(task) {
        Ok(ticket) => drop(ticket),
        Err(QueueError::CapacityExceeded(limit)) => {
            warn!(limit, "sync queue full, mirror push deferred to the sweep");
        }
        Err(err) => warn!(error = %err, "sync queue refused mirror push"),
    }
}

/// Assemble the full application router.
pub fn router(context: Arc<AppContext>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(availability::router())
        .merge(meetings::router())
        .merge(oauth::router())
        .merge(webhooks::router())
        .with_state(context)
}
