//! Internal calendar adapter
//!
//! Serves the platform's own meeting store through the same trait as the
//! remote providers, so availability and reconciliation treat first-party
//! meetings like any other calendar.

use std::sync::Arc;

use async_trait::async_trait;
use calweave_core::ports::MeetingRepository;
use calweave_core::CalendarAdapter;
use calweave_domain::{
    CalWeaveError, CalendarListing, CreateEventRequest, CreatedEvent, EventPatch, Meeting,
    MeetingPayload, MeetingStatus, Provider, Result, TimeRange, UnifiedEvent,
};
use chrono::Utc;
use uuid::Uuid;

/// The single calendar id the internal provider exposes.
pub const INTERNAL_CALENDAR_ID: &str = "meetings";

pub struct InternalCalendarAdapter {
    meetings: Arc<dyn MeetingRepository>,
    owner_address: String,
}

impl InternalCalendarAdapter {
    pub fn new(meetings: Arc<dyn MeetingRepository>, owner_address: impl Into<String>) -> Self {
        Self { meetings, owner_address: owner_address.into() }
    }

    fn meeting_id(source_event_id: &str) -> Result<Uuid> {
        Uuid::parse_str(source_event_id).map_err(|_| {
            CalWeaveError::Validation(format!("Not an internal meeting id: {source_event_id}"))
        })
    }

    fn as_event(&self, meeting: Meeting) -> UnifiedEvent {
        UnifiedEvent {
            id: meeting.id,
            source_event_id: meeting.id.to_string(),
            source: Provider::Internal,
            calendar_id: INTERNAL_CALENDAR_ID.to_string(),
            account_email: self.owner_address.clone(),
            title: meeting.title,
            start: meeting.start,
            end: meeting.end,
            attendees: meeting.attendees,
            is_organizer: true,
            web_link: None,
            provider_data: serde_json::Value::Null,
        }
    }
}

#[async_trait]
impl CalendarAdapter for InternalCalendarAdapter {
    fn provider(&self) -> Provider {
        Provider::Internal
    }

    async fn list_events(&self, _calendar_id: &str, range: TimeRange) -> Result<Vec<UnifiedEvent>> {
        let meetings =
            self.meetings.find_overlapping(&self.owner_address, range.start, range.end).await?;
        Ok(meetings
            .into_iter()
            .filter(|meeting| !meeting.is_cancelled())
            .map(|meeting| self.as_event(meeting))
            .collect())
    }

    async fn create_event(&self, request: &CreateEventRequest) -> Result<CreatedEvent> {
        let meeting = Meeting::from_payload(
            &self.owner_address,
            MeetingPayload {
                title: request.title.clone(),
                start: request.start,
                end: request.end,
                attendees: request.attendees.clone(),
                description: request.description.clone(),
                location: request.location.clone(),
            },
        );
        self.meetings.upsert(&meeting).await?;
        Ok(CreatedEvent { source_event_id: meeting.id.to_string(), additional_info: None })
    }

    async fn update_event(
        &self,
        _calendar_id: &str,
        source_event_id: &str,
        patch: &EventPatch,
    ) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let id = Self::meeting_id(source_event_id)?;
        let Some(mut meeting) = self.meetings.find_by_id(id).await? else {
            return Err(CalWeaveError::NotFound(format!("Meeting {id} does not exist")));
        };
        if let Some(title) = &patch.title {
            meeting.title = title.clone();
        }
        if let Some(start) = patch.start {
            meeting.start = start;
        }
        if let Some(end) = patch.end {
            meeting.end = end;
        }
        if let Some(description) = &patch.description {
            meeting.description = Some(description.clone());
        }
        if let Some(attendees) = &patch.attendees {
            meeting.attendees = attendees.clone();
        }
        meeting.updated_at = Utc::now();
        self.meetings.upsert(&meeting).await
    }

    async fn delete_event(&self, _calendar_id: &str, source_event_id: &str) -> Result<()> {
        // Internal deletes are cancellations; the record stays as the
        // booking history.
        let Ok(id) = Self::meeting_id(source_event_id) else {
            return Ok(());
        };
        let Some(mut meeting) = self.meetings.find_by_id(id).await? else {
            return Ok(());
        };
        meeting.status = MeetingStatus::Cancelled;
        meeting.updated_at = Utc::now();
        self.meetings.upsert(&meeting).await
    }

    async fn refresh_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn list_calendars(&self) -> Result<Vec<CalendarListing>> {
        Ok(vec![CalendarListing {
            calendar_id: INTERNAL_CALENDAR_ID.to_string(),
            name: "Meetings".to_string(),
            color: None,
            is_read_only: false,
            is_primary: true,
        }])
    }
}

#[cfg(test)]
mod tests {
    use calweave_domain::EventIdentity;
    use chrono::TimeZone;

    use crate::repositories::InMemoryMeetingRepository;

    use super::*;

    fn payload(title: &str, day: u32) -> MeetingPayload {
        MeetingPayload {
            title: title.into(),
            start: Utc.with_ymd_and_hms(2022, 5, day, 9, 0, 0).single().unwrap(),
            end: Utc.with_ymd_and_hms(2022, 5, day, 10, 0, 0).single().unwrap(),
            attendees: vec![],
            description: None,
            location: None,
        }
    }

    #[tokio::test]
    async fn listing_skips_cancelled_meetings() {
        let repo = Arc::new(InMemoryMeetingRepository::default());
        let confirmed = Meeting::from_payload("grace@example.com", payload("Kept", 4));
        let mut cancelled = Meeting::from_payload("grace@example.com", payload("Dropped", 5));
        cancelled.status = MeetingStatus::Cancelled;
        repo.upsert(&confirmed).await.unwrap();
        repo.upsert(&cancelled).await.unwrap();

        let adapter = InternalCalendarAdapter::new(repo, "grace@example.com");
        let range = TimeRange::new(
            Utc.with_ymd_and_hms(2022, 5, 1, 0, 0, 0).single().unwrap(),
            Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).single().unwrap(),
        )
        .unwrap();
        let events = adapter.list_events(INTERNAL_CALENDAR_ID, range).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Kept");
        assert!(events[0].is_organizer);
    }

    #[tokio::test]
    async fn created_events_list_back_with_matching_identity_and_times() {
        let repo = Arc::new(InMemoryMeetingRepository::default());
        let adapter = InternalCalendarAdapter::new(repo, "grace@example.com");

        let request = CreateEventRequest {
            calendar_id: INTERNAL_CALENDAR_ID.to_string(),
            owner_address: "grace@example.com".into(),
            title: "Portfolio review".into(),
            start: Utc.with_ymd_and_hms(2022, 5, 4, 14, 0, 0).single().unwrap(),
            end: Utc.with_ymd_and_hms(2022, 5, 4, 15, 30, 0).single().unwrap(),
            attendees: vec![],
            description: Some("Q2 numbers".into()),
            location: None,
            idempotency_key: Uuid::new_v4().simple().to_string(),
        };
        let created = adapter.create_event(&request).await.unwrap();

        let range = TimeRange::new(
            Utc.with_ymd_and_hms(2022, 5, 4, 0, 0, 0).single().unwrap(),
            Utc.with_ymd_and_hms(2022, 5, 5, 0, 0, 0).single().unwrap(),
        )
        .unwrap();
        let events = adapter.list_events(INTERNAL_CALENDAR_ID, range).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].identity(),
            EventIdentity::new(
                Provider::Internal,
                INTERNAL_CALENDAR_ID,
                created.source_event_id.as_str(),
            )
        );
        assert_eq!(events[0].start, request.start);
        assert_eq!(events[0].end, request.end);
    }

    #[tokio::test]
    async fn deleting_marks_the_meeting_cancelled_and_tolerates_absence() {
        let repo = Arc::new(InMemoryMeetingRepository::default());
        let meeting = Meeting::from_payload("grace@example.com", payload("Cancel me", 4));
        repo.upsert(&meeting).await.unwrap();

        let adapter = InternalCalendarAdapter::new(repo.clone(), "grace@example.com");
        adapter.delete_event(INTERNAL_CALENDAR_ID, &meeting.id.to_string()).await.unwrap();
        let stored = repo.find_by_id(meeting.id).await.unwrap().unwrap();
        assert!(stored.is_cancelled());

        // Unknown and malformed ids both come back as success.
        adapter.delete_event(INTERNAL_CALENDAR_ID, &Uuid::now_v7().to_string()).await.unwrap();
        adapter.delete_event(INTERNAL_CALENDAR_ID, "not-a-uuid").await.unwrap();
    }
}
