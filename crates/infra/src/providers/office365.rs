//! Microsoft 365 provider adapter
//!
//! Graph v1.0: `calendarView` listing, delta-link incremental sync, event
//! mutations, and change-notification subscriptions. Event times are
//! requested in UTC through the `Prefer` header and come back as naive
//! timestamps.

use std::sync::Arc;

use async_trait::async_trait;
use calweave_core::{CalendarAdapter, EventDelta};
use calweave_domain::{
    CalWeaveError, CalendarListing, CreateEventRequest, CreatedEvent, Credential, EventAttendee,
    EventPatch, Provider, Result, TimeRange, UnifiedEvent, WebhookChannel, WebhookRegistration,
};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::credentials::CredentialManager;
use crate::errors::InfraError;
use crate::http::{ensure_success, HttpClient};

const MICROSOFT_GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const OUTLOOK_TIMEZONE_HEADER: &str = r#"outlook.timezone="UTC""#;
const OUTLOOK_MAX_PAGE_SIZE_HEADER: &str = "odata.maxpagesize=50";
const OUTLOOK_ID_TYPE_HEADER: &str = r#"IdType="ImmutableId""#;
/// Outlook event subscriptions top out just short of three days.
const SUBSCRIPTION_LIFETIME_MINUTES: i64 = 4230;

/// Microsoft 365 adapter bound to one connection
pub struct Office365CalendarAdapter {
    http: HttpClient,
    credentials: Arc<CredentialManager>,
    connection_id: Uuid,
    email: String,
    credential: Credential,
    base_url: String,
}

impl Office365CalendarAdapter {
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
            base_url: MICROSOFT_GRAPH_API_BASE.to_string(),
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
            .get_token(self.connection_id, Provider::Office365, &self.credential)
            .await?;
        Ok(access.token)
    }

    /// Follow `@odata.nextLink` pagination to exhaustion, collecting items
    /// and the `@odata.deltaLink` Graph attaches to the final delta page.
    /// Continuation links are absolute URLs and already carry their query.
    async fn collect_view(
        &self,
        first_url: String,
        token: &str,
        params: Option<&[(&str, String)]>,
    ) -> Result<(Vec<GraphEvent>, Option<String>)> {
        let mut items = Vec::new();
        let mut delta_link = None;
        let mut next = Some(first_url);
        let mut first = true;

        while let Some(url) = next.take() {
            let mut request = self.http.request(Method::GET, &url);
            if first {
                if let Some(params) = params {
                    request = request.query(params);
                }
                first = false;
            }

            let response =
                ensure_success(self.http.send(with_graph_headers(request, token)).await?).await?;
            let page: GraphEventsResponse = response
                .json()
                .await
                .map_err(|err| CalWeaveError::from(InfraError::from(err)))?;

            items.extend(page.value);
            if page.delta_link.is_some() {
                delta_link = page.delta_link;
            }
            next = page.next_link;
        }

        Ok((items, delta_link))
    }

    fn map_event(&self, calendar_id: &str, event: GraphEvent) -> Option<UnifiedEvent> {
        let start = event.start.as_ref().and_then(GraphDateTime::resolve);
        let end = event.end.as_ref().and_then(GraphDateTime::resolve);
        let (Some(start), Some(end)) = (start, end) else {
            warn!(event_id = %event.id, "skipping Graph event without usable times");
            return None;
        };

        let provider_data =
            match event.online_meeting.as_ref().and_then(|meeting| meeting.join_url.as_ref()) {
                Some(link) => json!({ "join_url": link }),
                None => serde_json::Value::Null,
            };
        let attendees = event
            .attendees
            .unwrap_or_default()
            .into_iter()
            .filter_map(|attendee| {
                let GraphEmailAddress { address, name } = attendee.email_address;
                let address = address.trim().to_string();
                if address.is_empty() {
                    warn!(event_id = %event.id, "dropping Graph attendee with empty address");
                    return None;
                }
                Some(EventAttendee {
                    email: address,
                    name,
                    response: attendee.status.and_then(|status| status.response),
                })
            })
            .collect();

        Some(UnifiedEvent {
            id: Uuid::now_v7(),
            source_event_id: event.id,
            source: Provider::Office365,
            calendar_id: calendar_id.to_string(),
            account_email: self.email.clone(),
            title: event.subject.unwrap_or_default(),
            start,
            end,
            attendees,
            is_organizer: event.is_organizer,
            web_link: event.web_link,
            provider_data,
        })
    }
}

fn with_graph_headers(builder: RequestBuilder, token: &str) -> RequestBuilder {
    builder
        .bearer_auth(token)
        .header("Prefer", OUTLOOK_TIMEZONE_HEADER)
        .header("Prefer", OUTLOOK_MAX_PAGE_SIZE_HEADER)
        .header("Prefer", OUTLOOK_ID_TYPE_HEADER)
}

/// Graph's `dateTimeTimeZone` form for outbound bodies.
fn graph_time(instant: DateTime<Utc>) -> serde_json::Value {
    json!({
        "dateTime": instant.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "timeZone": "UTC",
    })
}

fn view_params(range: TimeRange) -> Vec<(&'static str, String)> {
    vec![
        ("startDateTime", range.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("endDateTime", range.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
    ]
}

#[async_trait]
impl CalendarAdapter for Office365CalendarAdapter {
    fn provider(&self) -> Provider {
        Provider::Office365
    }

    async fn list_events(&self, calendar_id: &str, range: TimeRange) -> Result<Vec<UnifiedEvent>> {
        let token = self.token().await?;
        let url = format!("{}/me/calendars/{}/calendarView", self.base_url, calendar_id);
        let params = view_params(range);
        let (items, _) = self.collect_view(url, &token, Some(&params)).await?;

        Ok(items
            .into_iter()
            .filter(|event| event.removed.is_none() && !event.is_cancelled)
            .filter_map(|event| self.map_event(calendar_id, event))
            .collect())
    }

    async fn sync_events(
        &self,
        calendar_id: &str,
        range: TimeRange,
        cursor: Option<&str>,
    ) -> Result<EventDelta> {
        let token = self.token().await?;
        // The stored cursor is the previous round's delta link. Without one,
        // the initial delta round lists the whole window and the final page
        // yields the first link. Graph reports a dropped link as 410, which
        // surfaces as NotFound for the caller to clear.
        let (items, delta_link, full_listing) = match cursor {
            Some(link) => {
                let (items, delta_link) = self.collect_view(link.to_string(), &token, None).await?;
                (items, delta_link, false)
            }
            None => {
                let url =
                    format!("{}/me/calendars/{}/calendarView/delta", self.base_url, calendar_id);
                let params = view_params(range);
                let (items, delta_link) = self.collect_view(url, &token, Some(&params)).await?;
                (items, delta_link, true)
            }
        };

        let mut delta = EventDelta { next_cursor: delta_link, full_listing, ..Default::default() };
        for item in items {
            if item.removed.is_some() || item.is_cancelled {
                delta.removed_ids.push(item.id);
            } else if let Some(event) = self.map_event(calendar_id, item) {
                delta.events.push(event);
            }
        }
        Ok(delta)
    }

    async fn create_event(&self, request: &CreateEventRequest) -> Result<CreatedEvent> {
        let token = self.token().await?;
        let url = format!("{}/me/calendars/{}/events", self.base_url, request.calendar_id);

        // transactionId makes retried creates collapse onto one event
        // server-side.
        let mut body = json!({
            "subject": request.title,
            "start": graph_time(request.start),
            "end": graph_time(request.end),
            "transactionId": request.idempotency_key,
        });
        if let Some(description) = &request.description {
            body["body"] = json!({ "contentType": "text", "content": description });
        }
        if let Some(location) = &request.location {
            body["location"] = json!({ "displayName": location });
        }
        if !request.attendees.is_empty() {
            body["attendees"] = json!(request
                .attendees
                .iter()
                .map(|attendee| {
                    json!({
                        "emailAddress": {
                            "address": attendee.email,
                            "name": attendee.name,
                        },
                        "type": "required",
                    })
                })
                .collect::<Vec<_>>());
        }

        let response = ensure_success(
            self.http
                .send(with_graph_headers(self.http.request(Method::POST, &url), &token).json(&body))
                .await?,
        )
        .await?;
        let created: GraphEvent = response
            .json()
            .await
            .map_err(|err| CalWeaveError::from(InfraError::from(err)))?;

        let additional_info = created
            .online_meeting
            .and_then(|meeting| meeting.join_url)
            .map(|link| json!({ "join_url": link }));
        Ok(CreatedEvent { source_event_id: created.id, additional_info })
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
        let token = self.token().await?;
        // Graph events are addressable without their calendar.
        let url = format!("{}/me/events/{}", self.base_url, source_event_id);

        let mut body = serde_json::Map::new();
        if let Some(title) = &patch.title {
            body.insert("subject".into(), json!(title));
        }
        if let Some(start) = patch.start {
            body.insert("start".into(), graph_time(start));
        }
        if let Some(end) = patch.end {
            body.insert("end".into(), graph_time(end));
        }
        if let Some(description) = &patch.description {
            body.insert("body".into(), json!({ "contentType": "text", "content": description }));
        }
        if let Some(attendees) = &patch.attendees {
            body.insert(
                "attendees".into(),
                json!(attendees
                    .iter()
                    .map(|attendee| {
                        json!({
                            "emailAddress": { "address": attendee.email },
                            "type": "required",
                        })
                    })
                    .collect::<Vec<_>>()),
            );
        }

        let response = self
            .http
            .send(with_graph_headers(self.http.request(Method::PATCH, &url), &token).json(&body))
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn delete_event(&self, _calendar_id: &str, source_event_id: &str) -> Result<()> {
        let token = self.token().await?;
        let url = format!("{}/me/events/{}", self.base_url, source_event_id);
        let response = self
            .http
            .send(with_graph_headers(self.http.request(Method::DELETE, &url), &token))
            .await?;
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
        let url = format!("{}/me/calendars", self.base_url);
        let response = ensure_success(
            self.http
                .send(
                    with_graph_headers(self.http.request(Method::GET, &url), &token)
                        .query(&[("$top", "100")]),
                )
                .await?,
        )
        .await?;
        let listing: GraphCalendarsResponse = response
            .json()
            .await
            .map_err(|err| CalWeaveError::from(InfraError::from(err)))?;

        Ok(listing
            .value
            .into_iter()
            .map(|entry| CalendarListing {
                calendar_id: entry.id,
                name: entry.name.unwrap_or_else(|| "Unnamed calendar".to_string()),
                color: entry.hex_color.filter(|color| !color.is_empty()),
                is_read_only: !entry.can_edit.unwrap_or(true),
                is_primary: entry.is_default,
            })
            .collect())
    }

    async fn register_webhook(
        &self,
        registration: &WebhookRegistration,
    ) -> Result<Option<WebhookChannel>> {
        let token = self.token().await?;
        let url = format!("{}/subscriptions", self.base_url);
        let resource = format!("/me/calendars/{}/events", registration.calendar_id);
        let requested_expiry =
            Utc::now() + chrono::Duration::minutes(SUBSCRIPTION_LIFETIME_MINUTES);

        let mut body = json!({
            "changeType": "created,updated,deleted",
            "notificationUrl": registration.callback_url,
            "resource": resource,
            "expirationDateTime": requested_expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        if let Some(client_token) = &registration.client_token {
            body["clientState"] = json!(client_token);
        }

        let response = ensure_success(
            self.http
                .send(self.http.request(Method::POST, &url).bearer_auth(&token).json(&body))
                .await?,
        )
        .await?;
        let subscription: GraphSubscription = response
            .json()
            .await
            .map_err(|err| CalWeaveError::from(InfraError::from(err)))?;

        let expiry = subscription.expiry().unwrap_or(requested_expiry);
        Ok(Some(WebhookChannel { channel_id: subscription.id, resource_id: resource, expiry }))
    }

    async fn renew_webhook(
        &self,
        current: &WebhookChannel,
        registration: &WebhookRegistration,
    ) -> Result<Option<WebhookChannel>> {
        let token = self.token().await?;
        let url = format!("{}/subscriptions/{}", self.base_url, current.channel_id);
        let requested_expiry =
            Utc::now() + chrono::Duration::minutes(SUBSCRIPTION_LIFETIME_MINUTES);
        let body = json!({
            "expirationDateTime": requested_expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
        });

        let response = self
            .http
            .send(self.http.request(Method::PATCH, &url).bearer_auth(&token).json(&body))
            .await?;
        match ensure_success(response).await {
            Ok(response) => {
                let subscription: GraphSubscription = response
                    .json()
                    .await
                    .map_err(|err| CalWeaveError::from(InfraError::from(err)))?;
                let expiry = subscription.expiry().unwrap_or(requested_expiry);
                Ok(Some(WebhookChannel {
                    channel_id: subscription.id,
                    resource_id: current.resource_id.clone(),
                    expiry,
                }))
            }
            // A lapsed subscription cannot be patched; start a fresh one.
            Err(CalWeaveError::NotFound(_)) => self.register_webhook(registration).await,
            Err(err) => Err(err),
        }
    }

    async fn stop_webhook(&self, channel: &WebhookChannel) -> Result<()> {
        let token = self.token().await?;
        let url = format!("{}/subscriptions/{}", self.base_url, channel.channel_id);
        let response =
            self.http.send(self.http.request(Method::DELETE, &url).bearer_auth(&token)).await?;
        match ensure_success(response).await {
            Ok(_) => Ok(()),
            Err(CalWeaveError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphEventsResponse {
    #[serde(default)]
    value: Vec<GraphEvent>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
    #[serde(rename = "@odata.deltaLink")]
    delta_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphEvent {
    id: String,
    subject: Option<String>,
    start: Option<GraphDateTime>,
    end: Option<GraphDateTime>,
    #[serde(rename = "isCancelled", default)]
    is_cancelled: bool,
    #[serde(rename = "isOrganizer", default)]
    is_organizer: bool,
    attendees: Option<Vec<GraphAttendee>>,
    #[serde(rename = "webLink")]
    web_link: Option<String>,
    #[serde(rename = "onlineMeeting")]
    online_meeting: Option<GraphOnlineMeeting>,
    /// Delta entries for deleted events carry only an id and this marker.
    #[serde(rename = "@removed")]
    removed: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GraphDateTime {
    #[serde(rename = "dateTime")]
    date_time: String,
    #[serde(rename = "timeZone")]
    time_zone: Option<String>,
}

impl GraphDateTime {
    /// Graph returns naive timestamps with a separate zone name; the Prefer
    /// header pins that zone to UTC, so the naive value is taken as UTC.
    fn resolve(&self) -> Option<DateTime<Utc>> {
        if let Some(zone) = &self.time_zone {
            if !zone.eq_ignore_ascii_case("UTC") {
                warn!(time_zone = %zone, "Graph returned a non-UTC time; taking it as UTC");
            }
        }
        let naive = NaiveDateTime::parse_from_str(&self.date_time, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        Some(Utc.from_utc_datetime(&naive))
    }
}

#[derive(Debug, Deserialize)]
struct GraphAttendee {
    #[serde(rename = "emailAddress")]
    email_address: GraphEmailAddress,
    status: Option<GraphResponseStatus>,
}

#[derive(Debug, Deserialize)]
struct GraphEmailAddress {
    address: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphResponseStatus {
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphOnlineMeeting {
    #[serde(rename = "joinUrl")]
    join_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphCalendarsResponse {
    #[serde(default)]
    value: Vec<GraphCalendarEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphCalendarEntry {
    id: String,
    name: Option<String>,
    #[serde(rename = "hexColor")]
    hex_color: Option<String>,
    #[serde(rename = "canEdit")]
    can_edit: Option<bool>,
    #[serde(rename = "isDefaultCalendar", default)]
    is_default: bool,
}

#[derive(Debug, Deserialize)]
struct GraphSubscription {
    id: String,
    #[serde(rename = "expirationDateTime")]
    expiration_date_time: Option<String>,
}

impl GraphSubscription {
    fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiration_date_time
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
    }
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

    fn adapter(base_url: &str) -> Office365CalendarAdapter {
        let credentials =
            Arc::new(CredentialManager::new(Arc::new(NeverRefresh), Arc::new(NullStore)));
        let credential = Credential::new(
            "test-access-token",
            "test-refresh-token",
            (Utc::now() + chrono::Duration::hours(1)).timestamp(),
        );
        Office365CalendarAdapter::new(
            HttpClient::new().expect("http client"),
            credentials,
            Uuid::now_v7(),
            "carol@example.com",
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
    fn graph_naive_times_resolve_as_utc() {
        let time = GraphDateTime {
            date_time: "2022-05-04T10:00:00.0000000".to_string(),
            time_zone: Some("UTC".to_string()),
        };
        assert_eq!(
            time.resolve(),
            Some(Utc.with_ymd_and_hms(2022, 5, 4, 10, 0, 0).single().unwrap())
        );

        let unparsable =
            GraphDateTime { date_time: "yesterday-ish".to_string(), time_zone: None };
        assert_eq!(unparsable.resolve(), None);
    }

    #[tokio::test]
    async fn list_events_maps_graph_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/calendars/cal-1/calendarView"))
            .and(query_param("startDateTime", "2022-05-01T00:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "id": "graph-evt-1",
                    "subject": "Planning",
                    "isOrganizer": true,
                    "start": { "dateTime": "2022-05-04T09:00:00.0000000", "timeZone": "UTC" },
                    "end": { "dateTime": "2022-05-04T10:00:00.0000000", "timeZone": "UTC" },
                    "attendees": [{
                        "emailAddress": { "address": "dave@example.com", "name": "Dave" },
                        "status": { "response": "accepted" }
                    }],
                    "webLink": "https://outlook.office365.com/calendar/item/graph-evt-1",
                    "onlineMeeting": { "joinUrl": "https://teams.microsoft.com/l/meet/1" }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let events =
            adapter(&server.uri()).list_events("cal-1", window()).await.expect("listing works");

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.source_event_id, "graph-evt-1");
        assert_eq!(event.title, "Planning");
        assert_eq!(event.start, Utc.with_ymd_and_hms(2022, 5, 4, 9, 0, 0).single().unwrap());
        assert_eq!(event.attendees[0].name.as_deref(), Some("Dave"));
        assert_eq!(event.provider_data["join_url"], "https://teams.microsoft.com/l/meet/1");
    }

    #[tokio::test]
    async fn initial_sync_follows_next_links_and_keeps_the_delta_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/calendars/cal-1/calendarView/delta"))
            .and(query_param("$skiptoken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "id": "graph-evt-2",
                    "subject": "Retro",
                    "start": { "dateTime": "2022-05-05T15:00:00", "timeZone": "UTC" },
                    "end": { "dateTime": "2022-05-05T16:00:00", "timeZone": "UTC" }
                }],
                "@odata.deltaLink": format!("{}/me/calendars/cal-1/calendarView/delta?$deltatoken=d1", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me/calendars/cal-1/calendarView/delta"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "id": "graph-evt-1",
                    "subject": "Planning",
                    "start": { "dateTime": "2022-05-04T09:00:00", "timeZone": "UTC" },
                    "end": { "dateTime": "2022-05-04T10:00:00", "timeZone": "UTC" }
                }],
                "@odata.nextLink": format!("{}/me/calendars/cal-1/calendarView/delta?$skiptoken=page-2", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;

        let delta =
            adapter(&server.uri()).sync_events("cal-1", window(), None).await.expect("sync works");

        assert!(delta.full_listing);
        assert_eq!(delta.events.len(), 2);
        assert!(delta.next_cursor.as_deref().is_some_and(|link| link.contains("$deltatoken=d1")));
    }

    #[tokio::test]
    async fn incremental_sync_reports_removed_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/calendars/cal-1/calendarView/delta"))
            .and(query_param("$deltatoken", "d1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    { "id": "graph-evt-1", "@removed": { "reason": "deleted" } },
                    {
                        "id": "graph-evt-3",
                        "subject": "New 1:1",
                        "start": { "dateTime": "2022-05-06T08:00:00", "timeZone": "UTC" },
                        "end": { "dateTime": "2022-05-06T08:30:00", "timeZone": "UTC" }
                    }
                ],
                "@odata.deltaLink": format!("{}/me/calendars/cal-1/calendarView/delta?$deltatoken=d2", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cursor =
            format!("{}/me/calendars/cal-1/calendarView/delta?$deltatoken=d1", server.uri());
        let delta = adapter(&server.uri())
            .sync_events("cal-1", window(), Some(&cursor))
            .await
            .expect("incremental sync works");

        assert!(!delta.full_listing);
        assert_eq!(delta.removed_ids, vec!["graph-evt-1".to_string()]);
        assert_eq!(delta.events.len(), 1);
        assert!(delta.next_cursor.as_deref().is_some_and(|link| link.contains("$deltatoken=d2")));
    }

    #[tokio::test]
    async fn create_carries_a_transaction_id_for_retry_safety() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/calendars/cal-1/events"))
            .and(body_partial_json(json!({
                "subject": "Intro call",
                "transactionId": "meeting-42-cal-1",
                "start": { "dateTime": "2022-05-04T09:00:00", "timeZone": "UTC" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "graph-created-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = CreateEventRequest {
            calendar_id: "cal-1".into(),
            owner_address: "carol@example.com".into(),
            title: "Intro call".into(),
            start: Utc.with_ymd_and_hms(2022, 5, 4, 9, 0, 0).single().unwrap(),
            end: Utc.with_ymd_and_hms(2022, 5, 4, 9, 30, 0).single().unwrap(),
            attendees: vec![EventAttendee::new("dave@example.com")],
            description: None,
            location: None,
            idempotency_key: "meeting-42-cal-1".into(),
        };
        let created = adapter(&server.uri()).create_event(&request).await.expect("create works");
        assert_eq!(created.source_event_id, "graph-created-1");
    }

    #[tokio::test]
    async fn renewing_a_lapsed_subscription_registers_a_fresh_one() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/subscriptions/sub-old"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "sub-new",
                "expirationDateTime": "2022-05-07T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let current = WebhookChannel {
            channel_id: "sub-old".to_string(),
            resource_id: "/me/calendars/cal-1/events".to_string(),
            expiry: Utc::now(),
        };
        let registration = WebhookRegistration {
            calendar_id: "cal-1".to_string(),
            callback_url: "https://calweave.example.com/webhooks/microsoft".to_string(),
            client_token: Some("opaque-state".to_string()),
        };

        let renewed = adapter(&server.uri())
            .renew_webhook(&current, &registration)
            .await
            .expect("renewal works")
            .expect("Graph always yields a channel");
        assert_eq!(renewed.channel_id, "sub-new");
        assert_eq!(renewed.expiry, Utc.with_ymd_and_hms(2022, 5, 7, 0, 0, 0).single().unwrap());
    }
}
