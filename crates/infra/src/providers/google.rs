//! Google Calendar provider adapter
//!
//! REST v3: windowed event listing, `syncToken` incremental sync, idempotent
//! create through client-chosen event ids, and watch-channel push
//! registration.

use std::sync::Arc;

use async_trait::async_trait;
use calweave_core::{CalendarAdapter, EventDelta};
use calweave_domain::{
    CalWeaveError, CalendarListing, CreateEventRequest, CreatedEvent, Credential, EventAttendee,
    EventPatch, Provider, Result, TimeRange, UnifiedEvent, WebhookChannel, WebhookRegistration,
};
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::credentials::CredentialManager;
use crate::errors::InfraError;
use crate::http::{ensure_success, HttpClient};

const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const MAX_RESULTS: u32 = 2500;

/// Google Calendar adapter bound to one connection
pub struct GoogleCalendarAdapter {
    http: HttpClient,
    credentials: Arc<CredentialManager>,
    connection_id: Uuid,
    email: String,
    credential: Credential,
    base_url: String,
}

impl GoogleCalendarAdapter {
    pub fn new(
        http: HttpClient,
        credentials: Arc<CredentialManager>,
        connection_id: Uuid,
        email: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            http,
            credentials,
            connection_id,
            email: email.into(),
            credential,
            base_url: GOOGLE_CALENDAR_API_BASE.to_string(),
        }
    }

    /// Point the adapter at a different API base, for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn token(&self) -> Result<String> {
        let access = self
            .credentials
            .get_token(self.connection_id, Provider::Google, &self.credential)
            .await?;
        Ok(access.token)
    }

    /// Build an API URL, percent-encoding each path segment. Google calendar
    /// ids routinely contain `@` and `#`.
    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| CalWeaveError::from(InfraError::from(err)))?;
        url.path_segments_mut()
            .map_err(|()| {
                CalWeaveError::Internal(format!(
                    "Google API base {} cannot carry path segments",
                    self.base_url
                ))
            })?
            .extend(segments);
        Ok(url)
    }

    /// Follow `nextPageToken` pagination to exhaustion, collecting items and
    /// the `nextSyncToken` Google attaches to the final page.
    async fn fetch_pages(
        &self,
        calendar_id: &str,
        base_params: &[(&str, String)],
    ) -> Result<(Vec<GoogleEvent>, Option<String>)> {
        let token = self.token().await?;
        let url = self.api_url(&["calendars", calendar_id, "events"])?;

        let mut items = Vec::new();
        let mut sync_token = None;
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .request(Method::GET, url.clone())
                .bearer_auth(&token)
                .query(base_params);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let response = ensure_success(self.http.send(request).await?).await?;
            let page: GoogleEventsResponse = response
                .json()
                .await
                .map_err(|err| CalWeaveError::from(InfraError::from(err)))?;

            items.extend(page.items);
            if page.next_sync_token.is_some() {
                sync_token = page.next_sync_token;
            }
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok((items, sync_token))
    }

    fn map_event(&self, calendar_id: &str, event: GoogleEvent) -> Option<UnifiedEvent> {
        let start = event.start.as_ref().and_then(GoogleEventTime::resolve);
        let end = event.end.as_ref().and_then(GoogleEventTime::resolve);
        let (Some(start), Some(end)) = (start, end) else {
            warn!(event_id = %event.id, "skipping Google event without usable times");
            return None;
        };

        let provider_data = match &event.hangout_link {
            Some(link) => json!({ "hangout_link": link }),
            None => serde_json::Value::Null,
        };
        let attendees = event
            .attendees
            .unwrap_or_default()
            .into_iter()
            .filter_map(|attendee| {
                let email = attendee.email?;
                Some(EventAttendee {
                    email,
                    name: attendee.display_name,
                    response: attendee.response_status,
                })
            })
            .collect();

        Some(UnifiedEvent {
            id: Uuid::now_v7(),
            source_event_id: event.id,
            source: Provider::Google,
            calendar_id: calendar_id.to_string(),
            account_email: self.email.clone(),
            title: event.summary.unwrap_or_default(),
            start,
            end,
            attendees,
            is_organizer: event.organizer.map(|organizer| organizer.is_self).unwrap_or(false),
            web_link: event.html_link,
            provider_data,
        })
    }
}

fn window_params(range: TimeRange) -> Vec<(&'static str, String)> {
    vec![
        ("timeMin", range.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("timeMax", range.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("singleEvents", "true".to_string()),
        ("maxResults", MAX_RESULTS.to_string()),
    ]
}

/// Sanitize an idempotency key into Google's client-chosen event id
/// alphabet (base32hex: lowercase `a`-`v` and digits). Keys that sanitize
/// too short fall back to server-assigned ids, giving up create idempotency
/// for that request.
fn client_event_id(idempotency_key: &str) -> Option<String> {
    let id: String = idempotency_key
        .chars()
        .filter_map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='v' | '0'..='9') => Some(c),
            _ => None,
        })
        .collect();
    (id.len() >= 5 && id.len() <= 1024).then_some(id)
}

#[async_trait]
impl CalendarAdapter for GoogleCalendarAdapter {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn list_events(&self, calendar_id: &str, range: TimeRange) -> Result<Vec<UnifiedEvent>> {
        let params = window_params(range);
        let (items, _) = self.fetch_pages(calendar_id, &params).await?;
        Ok(items
            .into_iter()
            .filter(|event| !event.is_cancelled())
            .filter_map(|event| self.map_event(calendar_id, event))
            .collect())
    }

    async fn sync_events(
        &self,
        calendar_id: &str,
        range: TimeRange,
        cursor: Option<&str>,
    ) -> Result<EventDelta> {
        // A sync-token listing must not carry window parameters; the initial
        // listing must, and its final page yields the first token. A dropped
        // token surfaces here as NotFound (410) for the caller to clear.
        let (params, full_listing) = match cursor {
            Some(token) => (
                vec![
                    ("syncToken", token.to_string()),
                    ("singleEvents", "true".to_string()),
                    ("maxResults", MAX_RESULTS.to_string()),
                ],
                false,
            ),
            None => (window_params(range), true),
        };

        let (items, sync_token) = self.fetch_pages(calendar_id, &params).await?;
        let mut delta = EventDelta { next_cursor: sync_token, full_listing, ..Default::default() };
        for item in items {
            if item.is_cancelled() {
                delta.removed_ids.push(item.id);
            } else if let Some(event) = self.map_event(calendar_id, item) {
                delta.events.push(event);
            }
        }
        Ok(delta)
    }

    async fn create_event(&self, request: &CreateEventRequest) -> Result<CreatedEvent> {
        let token = self.token().await?;
        let url = self.api_url(&["calendars", &request.calendar_id, "events"])?;
        let event_id = client_event_id(&request.idempotency_key);

        let mut body = json!({
            "summary": request.title,
            "start": { "dateTime": request.start.to_rfc3339_opts(SecondsFormat::Secs, true) },
            "end": { "dateTime": request.end.to_rfc3339_opts(SecondsFormat::Secs, true) },
        });
        if let Some(id) = &event_id {
            body["id"] = json!(id);
        }
        if let Some(description) = &request.description {
            body["description"] = json!(description);
        }
        if let Some(location) = &request.location {
            body["location"] = json!(location);
        }
        if !request.attendees.is_empty() {
            body["attendees"] = json!(request
                .attendees
                .iter()
                .map(|attendee| {
                    let mut entry = json!({ "email": attendee.email });
                    if let Some(name) = &attendee.name {
                        entry["displayName"] = json!(name);
                    }
                    entry
                })
                .collect::<Vec<_>>());
        }

        let response = self
            .http
            .send(self.http.request(Method::POST, url).bearer_auth(&token).json(&body))
            .await?;

        // A conflict on a client-chosen id means an earlier attempt already
        // landed; the mirror exists and the create is done.
        if response.status() == StatusCode::CONFLICT {
            if let Some(id) = event_id {
                debug!(event_id = %id, "Google event already exists, treating create as done");
                return Ok(CreatedEvent { source_event_id: id, additional_info: None });
            }
        }

        let response = ensure_success(response).await?;
        let created: GoogleEvent = response
            .json()
            .await
            .map_err(|err| CalWeaveError::from(InfraError::from(err)))?;
        Ok(CreatedEvent {
            source_event_id: created.id,
            additional_info: created.hangout_link.map(|link| json!({ "hangout_link": link })),
        })
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        source_event_id: &str,
        patch: &EventPatch,
    ) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let token = self.token().await?;
        let url = self.api_url(&["calendars", calendar_id, "events", source_event_id])?;

        let mut body = serde_json::Map::new();
        if let Some(title) = &patch.title {
            body.insert("summary".into(), json!(title));
        }
        if let Some(start) = patch.start {
            body.insert(
                "start".into(),
                json!({ "dateTime": start.to_rfc3339_opts(SecondsFormat::Secs, true) }),
            );
        }
        if let Some(end) = patch.end {
            body.insert(
                "end".into(),
                json!({ "dateTime": end.to_rfc3339_opts(SecondsFormat::Secs, true) }),
            );
        }
        if let Some(description) = &patch.description {
            body.insert("description".into(), json!(description));
        }
        if let Some(attendees) = &patch.attendees {
            body.insert(
                "attendees".into(),
                json!(attendees
                    .iter()
                    .map(|attendee| json!({ "email": attendee.email }))
                    .collect::<Vec<_>>()),
            );
        }

        let response = self
            .http
            .send(self.http.request(Method::PATCH, url).bearer_auth(&token).json(&body))
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn delete_event(&self, calendar_id: &str, source_event_id: &str) -> Result<()> {
        let token = self.token().await?;
        let url = self.api_url(&["calendars", calendar_id, "events", source_event_id])?;
        let response =
            self.http.send(self.http.request(Method::DELETE, url).bearer_auth(&token)).await?;
        match ensure_success(response).await {
            Ok(_) => Ok(()),
            // Already gone is the state we wanted.
            Err(CalWeaveError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn refresh_connection(&self) -> Result<()> {
        self.token().await.map(|_| ())
    }

    async fn list_calendars(&self) -> Result<Vec<CalendarListing>> {
        let token = self.token().await?;
        let url = self.api_url(&["users", "me", "calendarList"])?;
        let response = ensure_success(
            self.http
                .send(
                    self.http
                        .request(Method::GET, url)
                        .bearer_auth(&token)
                        .query(&[("maxResults", "250")]),
                )
                .await?,
        )
        .await?;
        let listing: GoogleCalendarListResponse = response
            .json()
            .await
            .map_err(|err| CalWeaveError::from(InfraError::from(err)))?;

        Ok(listing
            .items
            .into_iter()
            .map(|entry| CalendarListing {
                calendar_id: entry.id,
                name: entry.summary.unwrap_or_else(|| "Unnamed calendar".to_string()),
                color: entry.background_color,
                is_read_only: matches!(
                    entry.access_role.as_deref(),
                    Some("reader" | "freeBusyReader")
                ),
                is_primary: entry.primary,
            })
            .collect())
    }

    async fn register_webhook(
        &self,
        registration: &WebhookRegistration,
    ) -> Result<Option<WebhookChannel>> {
        let token = self.token().await?;
        let url = self.api_url(&["calendars", &registration.calendar_id, "events", "watch"])?;
        let channel_id = Uuid::now_v7().to_string();

        let mut body = json!({
            "id": channel_id,
            "type": "web_hook",
            "address": registration.callback_url,
        });
        if let Some(client_token) = &registration.client_token {
            body["token"] = json!(client_token);
        }

        let response = ensure_success(
            self.http
                .send(self.http.request(Method::POST, url).bearer_auth(&token).json(&body))
                .await?,
        )
        .await?;
        let watch: GoogleWatchResponse = response
            .json()
            .await
            .map_err(|err| CalWeaveError::from(InfraError::from(err)))?;

        // The expiration comes back as epoch milliseconds in a string.
        let expiry = watch
            .expiration
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(|| Utc::now() + chrono::Duration::days(7));

        Ok(Some(WebhookChannel { channel_id, resource_id: watch.resource_id, expiry }))
    }

    async fn stop_webhook(&self, channel: &WebhookChannel) -> Result<()> {
        let token = self.token().await?;
        let url = self.api_url(&["channels", "stop"])?;
        let body = json!({ "id": channel.channel_id, "resourceId": channel.resource_id });
        let response = self
            .http
            .send(self.http.request(Method::POST, url).bearer_auth(&token).json(&body))
            .await?;
        match ensure_success(response).await {
            Ok(_) => Ok(()),
            Err(CalWeaveError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleEventsResponse {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(rename = "nextSyncToken")]
    next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    start: Option<GoogleEventTime>,
    end: Option<GoogleEventTime>,
    attendees: Option<Vec<GoogleAttendee>>,
    organizer: Option<GoogleOrganizer>,
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
    #[serde(rename = "hangoutLink")]
    hangout_link: Option<String>,
}

impl GoogleEvent {
    fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }
}

#[derive(Debug, Deserialize)]
struct GoogleEventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}

impl GoogleEventTime {
    /// Timed events carry RFC 3339 `dateTime`; all-day events carry a bare
    /// `date`, taken as UTC midnight.
    fn resolve(&self) -> Option<DateTime<Utc>> {
        if let Some(instant) = &self.date_time {
            return DateTime::parse_from_rfc3339(instant)
                .ok()
                .map(|parsed| parsed.with_timezone(&Utc));
        }
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
    }
}

#[derive(Debug, Deserialize)]
struct GoogleAttendee {
    email: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "responseStatus")]
    response_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleOrganizer {
    #[serde(rename = "self", default)]
    is_self: bool,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarListResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarListEntry>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarListEntry {
    id: String,
    summary: Option<String>,
    #[serde(rename = "backgroundColor")]
    background_color: Option<String>,
    #[serde(rename = "accessRole")]
    access_role: Option<String>,
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Deserialize)]
struct GoogleWatchResponse {
    #[serde(rename = "resourceId")]
    resource_id: String,
    expiration: Option<String>,
}

#[cfg(test)]
mod tests {
    use calweave_core::ports::{CredentialStore, TokenRefresher};
    use calweave_domain::CredentialPayload;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    struct NeverRefresh;

    #[async_trait]
    impl TokenRefresher for NeverRefresh {
        async fn refresh(&self, _provider: Provider, _credential: &Credential) -> Result<Credential> {
            Err(CalWeaveError::Internal("refresh not expected in this test".into()))
        }
    }

    struct NullStore;

    #[async_trait]
    impl CredentialStore for NullStore {
        async fn load(&self, _connection_id: Uuid) -> Result<Option<CredentialPayload>> {
            Ok(None)
        }

        async fn persist(
            &self,
            _connection_id: Uuid,
            _payload: &CredentialPayload,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn adapter(base_url: &str) -> GoogleCalendarAdapter {
        let credentials =
            Arc::new(CredentialManager::new(Arc::new(NeverRefresh), Arc::new(NullStore)));
        let credential = Credential::new(
            "test-access-token",
            "test-refresh-token",
            (Utc::now() + chrono::Duration::hours(1)).timestamp(),
        );
        GoogleCalendarAdapter::new(
            HttpClient::new().expect("http client"),
            credentials,
            Uuid::now_v7(),
            "alice@example.com",
            credential,
        )
        .with_base_url(base_url)
    }

    fn window() -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2022, 5, 1, 0, 0, 0).single().unwrap(),
            Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).single().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn client_event_ids_stay_inside_the_google_alphabet() {
        assert_eq!(client_event_id("018F-3c65-Aa11").as_deref(), Some("018f3c65aa11"));
        // 'w'..'z' fall outside base32hex; what survives here is too short.
        assert_eq!(client_event_id("wxyz-ab1"), None);
        assert_eq!(client_event_id("!!"), None);
    }

    #[test]
    fn event_times_resolve_datetime_and_all_day_forms() {
        let timed = GoogleEventTime {
            date_time: Some("2022-05-04T10:00:00+02:00".to_string()),
            date: None,
        };
        assert_eq!(
            timed.resolve(),
            Some(Utc.with_ymd_and_hms(2022, 5, 4, 8, 0, 0).single().unwrap())
        );

        let all_day = GoogleEventTime { date_time: None, date: Some("2022-05-05".to_string()) };
        assert_eq!(
            all_day.resolve(),
            Some(Utc.with_ymd_and_hms(2022, 5, 5, 0, 0, 0).single().unwrap())
        );

        let empty = GoogleEventTime { date_time: None, date: None };
        assert_eq!(empty.resolve(), None);
    }

    #[tokio::test]
    async fn list_events_maps_items_and_drops_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("singleEvents", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {
                        "id": "evt-1",
                        "status": "confirmed",
                        "summary": "Standup",
                        "start": { "dateTime": "2022-05-04T09:00:00Z" },
                        "end": { "dateTime": "2022-05-04T09:15:00Z" },
                        "attendees": [
                            { "email": "bob@example.com", "responseStatus": "accepted" }
                        ],
                        "organizer": { "self": true },
                        "htmlLink": "https://calendar.google.com/event?eid=evt-1"
                    },
                    {
                        "id": "evt-2",
                        "status": "cancelled"
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let events =
            adapter(&server.uri()).list_events("primary", window()).await.expect("listing works");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source_event_id, "evt-1");
        assert_eq!(events[0].title, "Standup");
        assert_eq!(events[0].attendees[0].email, "bob@example.com");
        assert!(events[0].is_organizer);
        assert_eq!(events[0].account_email, "alice@example.com");
    }

    #[tokio::test]
    async fn initial_sync_pages_through_and_captures_the_sync_token() {
        let server = MockServer::start().await;
        // Mounted first so the paged request is checked against it first.
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "evt-2",
                    "summary": "Review",
                    "start": { "dateTime": "2022-05-04T14:00:00Z" },
                    "end": { "dateTime": "2022-05-04T15:00:00Z" }
                }],
                "nextSyncToken": "sync-token-1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("timeMin", "2022-05-01T00:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "evt-1",
                    "summary": "Standup",
                    "start": { "dateTime": "2022-05-04T09:00:00Z" },
                    "end": { "dateTime": "2022-05-04T09:15:00Z" }
                }],
                "nextPageToken": "page-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let delta =
            adapter(&server.uri()).sync_events("primary", window(), None).await.expect("sync works");

        assert!(delta.full_listing);
        assert_eq!(delta.events.len(), 2);
        assert_eq!(delta.next_cursor.as_deref(), Some("sync-token-1"));
        assert!(delta.removed_ids.is_empty());
    }

    #[tokio::test]
    async fn incremental_sync_reports_cancellations_as_removals() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("syncToken", "sync-token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {
                        "id": "evt-1",
                        "summary": "Standup (moved)",
                        "start": { "dateTime": "2022-05-04T10:00:00Z" },
                        "end": { "dateTime": "2022-05-04T10:15:00Z" }
                    },
                    { "id": "evt-2", "status": "cancelled" }
                ],
                "nextSyncToken": "sync-token-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let delta = adapter(&server.uri())
            .sync_events("primary", window(), Some("sync-token-1"))
            .await
            .expect("incremental sync works");

        assert!(!delta.full_listing);
        assert_eq!(delta.events.len(), 1);
        assert_eq!(delta.removed_ids, vec!["evt-2".to_string()]);
        assert_eq!(delta.next_cursor.as_deref(), Some("sync-token-2"));
    }

    #[tokio::test]
    async fn expired_sync_token_surfaces_as_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let result =
            adapter(&server.uri()).sync_events("primary", window(), Some("stale-token")).await;
        assert!(matches!(result, Err(CalWeaveError::NotFound(_))));
    }

    #[tokio::test]
    async fn create_sends_the_client_chosen_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .and(body_partial_json(json!({ "id": "0a1b2c3d4e5f", "summary": "Intro call" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "0a1b2c3d4e5f",
                "hangoutLink": "https://meet.google.com/abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = CreateEventRequest {
            calendar_id: "primary".into(),
            owner_address: "alice@example.com".into(),
            title: "Intro call".into(),
            start: Utc.with_ymd_and_hms(2022, 5, 4, 9, 0, 0).single().unwrap(),
            end: Utc.with_ymd_and_hms(2022, 5, 4, 9, 30, 0).single().unwrap(),
            attendees: vec![],
            description: None,
            location: None,
            idempotency_key: "0A1B-2C3D-4E5F".into(),
        };
        let created = adapter(&server.uri()).create_event(&request).await.expect("create works");

        assert_eq!(created.source_event_id, "0a1b2c3d4e5f");
        assert_eq!(
            created.additional_info,
            Some(json!({ "hangout_link": "https://meet.google.com/abc" }))
        );
    }

    #[tokio::test]
    async fn create_conflict_on_retried_id_counts_as_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(409))
            .expect(1)
            .mount(&server)
            .await;

        let request = CreateEventRequest {
            calendar_id: "primary".into(),
            owner_address: "alice@example.com".into(),
            title: "Intro call".into(),
            start: Utc.with_ymd_and_hms(2022, 5, 4, 9, 0, 0).single().unwrap(),
            end: Utc.with_ymd_and_hms(2022, 5, 4, 9, 30, 0).single().unwrap(),
            attendees: vec![],
            description: None,
            location: None,
            idempotency_key: "0a1b2c3d4e5f".into(),
        };
        let created = adapter(&server.uri()).create_event(&request).await.expect("retry is done");
        assert_eq!(created.source_event_id, "0a1b2c3d4e5f");
    }

    #[tokio::test]
    async fn deleting_a_missing_event_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/calendars/primary/events/evt-gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        adapter(&server.uri())
            .delete_event("primary", "evt-gone")
            .await
            .expect("missing event deletes cleanly");
    }
}
