//! Booking endpoints

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use calweave_domain::{CalWeaveError, Meeting, MeetingPayload, MeetingStatus, SyncTask};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::context::AppContext;
use crate::routes::{enqueue_best_effort, ApiError};

pub fn router() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/meetings", post(create_meeting))
        .route("/meetings/{id}", delete(cancel_meeting))
}

/// Request body for booking a meeting
#[derive(Deserialize)]
pub struct BookMeetingRequest {
    /// Account whose availability is being booked.
    pub owner_address: String,
    #[serde(flatten)]
    pub payload: MeetingPayload,
}

/// POST /meetings - book a meeting against an account's availability
///
/// The booking is durable on return; mirroring into connected calendars
/// runs behind it on the sync queue and can lag or fail independently.
async fn create_meeting(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<BookMeetingRequest>,
) -> Result<(StatusCode, Json<Meeting>), ApiError> {
    if request.payload.title.trim().is_empty() {
        return Err(CalWeaveError::Validation("Meeting title must not be empty".into()).into());
    }
    if request.payload.end <= request.payload.start {
        return Err(CalWeaveError::Validation("Meeting must end after it starts".into()).into());
    }
    if context.accounts.get_account(&request.owner_address).await?.is_none() {
        return Err(CalWeaveError::NotFound(format!(
            "Account {} is not known",
            request.owner_address
        ))
        .into());
    }

    let meeting = Meeting::from_payload(request.owner_address, request.payload);
    context.meetings.upsert(&meeting).await?;

    enqueue_best_effort(
        &context,
        SyncTask::Update { account_key: meeting.owner_address.clone(), meeting_id: meeting.id },
    );

    Ok((StatusCode::CREATED, Json(meeting)))
}

/// DELETE /meetings/{id} - cancel a booking and tear down its mirrors
///
/// Cancelling twice is fine; the second call finds the meeting already
/// cancelled and changes nothing.
async fn cancel_meeting(
    State(context): State<Arc<AppContext>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let Some(mut meeting) = context.meetings.find_by_id(id).await? else {
        return Err(CalWeaveError::NotFound(format!("Meeting {id} does not exist")).into());
    };
    if meeting.is_cancelled() {
        return Ok(StatusCode::NO_CONTENT);
    }

    // Identities are captured now because the delete task must not depend
    // on snapshot rows that reconciliation may rewrite in the meantime.
    // Flagging them pending keeps remote edits from being adopted over a
    // mirror that is about to come down.
    let mut identities = Vec::new();
    for mut known in context.known_events.find_for_meeting(id).await? {
        identities.push(known.identity.clone());
        known.pending_local = true;
        context.known_events.upsert(&known).await?;
    }

    meeting.status = MeetingStatus::Cancelled;
    meeting.updated_at = Utc::now();
    context.meetings.upsert(&meeting).await?;

    enqueue_best_effort(
        &context,
        SyncTask::Delete { account_key: meeting.owner_address.clone(), meeting_id: id, identities },
    );

    Ok(StatusCode::NO_CONTENT)
}
