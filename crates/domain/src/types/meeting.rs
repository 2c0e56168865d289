//! Internal meetings booked against published availability

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::{EventAttendee, EventIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Confirmed,
    Cancelled,
}

/// A booked meeting as the platform knows it
///
/// The booking itself lives here and succeeds independently of external
/// sync; `external_refs` records where the meeting has been mirrored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    /// The account whose availability was booked (the account key).
    pub owner_address: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendees: Vec<EventAttendee>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub status: MeetingStatus,
    pub external_refs: Vec<EventIdentity>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Meeting {
    /// Build a confirmed meeting from a booking payload.
    pub fn from_payload(owner_address: impl Into<String>, payload: MeetingPayload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            owner_address: owner_address.into(),
            title: payload.title,
            start: payload.start,
            end: payload.end,
            attendees: payload.attendees,
            description: payload.description,
            location: payload.location,
            status: MeetingStatus::Confirmed,
            external_refs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == MeetingStatus::Cancelled
    }
}

/// Incoming booking request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingPayload {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<EventAttendee>,
    pub description: Option<String>,
    pub location: Option<String>,
}
