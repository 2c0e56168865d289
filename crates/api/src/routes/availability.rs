//! Availability read endpoint

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use calweave_domain::{BusyInterval, CalWeaveError, TimeRange};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::routes::ApiError;

/// Free windows shorter than this are not offered.
const DEFAULT_MIN_WINDOW_MINUTES: i64 = 30;
/// Requested minimum window length is clamped to one day.
const MAX_MIN_WINDOW_MINUTES: i64 = 24 * 60;

pub fn router() -> Router<Arc<AppContext>> {
    Router::new().route("/availability", get(availability))
}

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub account: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Minimum free-window length to report, in minutes.
    pub min_minutes: Option<i64>,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub account: String,
    pub busy: Vec<BusyInterval>,
    pub free: Vec<TimeRange>,
    /// Sources whose busy data is missing this pass; free windows may
    /// overstate real availability.
    pub degraded_sources: Vec<String>,
}

/// GET /availability - merged busy intervals and bookable free windows
async fn availability(
    State(context): State<Arc<AppContext>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    if context.accounts.get_account(&query.account).await?.is_none() {
        return Err(
            CalWeaveError::NotFound(format!("Account {} is not known", query.account)).into()
        );
    }
    let range = TimeRange::new(query.start, query.end)?;
    let minutes = query
        .min_minutes
        .unwrap_or(DEFAULT_MIN_WINDOW_MINUTES)
        .clamp(0, MAX_MIN_WINDOW_MINUTES);

    let availability =
        context.availability.availability(&query.account, range, Duration::minutes(minutes)).await?;
    Ok(Json(AvailabilityResponse {
        account: query.account,
        busy: availability.busy,
        free: availability.free,
        degraded_sources: availability.degraded_sources,
    }))
}
