//! Webcal feed adapter
//!
//! Read-only ICS feeds over HTTP, including `webcal://` URLs. The whole
//! feed is fetched and windowed on every listing; there is no incremental
//! protocol, no push, and mutations are rejected by the trait defaults.

use async_trait::async_trait;
use calweave_core::CalendarAdapter;
use calweave_domain::{CalendarListing, Provider, Result, TimeRange, UnifiedEvent};
use reqwest::Method;

use crate::errors::InfraError;
use crate::http::{ensure_success, HttpClient};
use crate::providers::ics;

pub struct WebcalCalendarAdapter {
    http: HttpClient,
    email: String,
    url: String,
}

impl WebcalCalendarAdapter {
    pub fn new(http: HttpClient, email: impl Into<String>, url: impl Into<String>) -> Self {
        Self { http, email: email.into(), url: normalize_feed_url(url.into()) }
    }
}

/// `webcal://` is plain HTTPS under a vanity scheme.
fn normalize_feed_url(url: String) -> String {
    match url.strip_prefix("webcal://") {
        Some(rest) => format!("https://{rest}"),
        None => url,
    }
}

#[async_trait]
impl CalendarAdapter for WebcalCalendarAdapter {
    fn provider(&self) -> Provider {
        Provider::Webcal
    }

    async fn list_events(&self, calendar_id: &str, range: TimeRange) -> Result<Vec<UnifiedEvent>> {
        let response =
            ensure_success(self.http.send(self.http.request(Method::GET, &self.url)).await?)
                .await?;
        let feed = response.text().await.map_err(InfraError::from)?;
        ics::events_from_ics(&feed, Provider::Webcal, calendar_id, &self.email, range)
    }

    async fn refresh_connection(&self) -> Result<()> {
        let response = self.http.send(self.http.request(Method::GET, &self.url)).await?;
        ensure_success(response).await?;
        Ok(())
    }

    /// A feed is exactly one calendar; its URL doubles as the id.
    async fn list_calendars(&self) -> Result<Vec<CalendarListing>> {
        Ok(vec![CalendarListing {
            calendar_id: self.url.clone(),
            name: "Subscribed feed".to_string(),
            color: None,
            is_read_only: true,
            is_primary: true,
        }])
    }
}

#[cfg(test)]
mod tests {
    use calweave_domain::{CalWeaveError, CreateEventRequest};
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const FEED: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:feed-1\r\nDTSTART:20220504T090000Z\r\nDTEND:20220504T100000Z\r\nSUMMARY:Town hall\r\nEND:VEVENT\r\nBEGIN:VEVENT\r\nUID:feed-2\r\nDTSTART:20230101T090000Z\r\nDTEND:20230101T100000Z\r\nSUMMARY:Far future\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    fn window() -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2022, 5, 1, 0, 0, 0).single().unwrap(),
            Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).single().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn webcal_scheme_normalizes_to_https() {
        assert_eq!(
            normalize_feed_url("webcal://example.com/team.ics".into()),
            "https://example.com/team.ics"
        );
        assert_eq!(
            normalize_feed_url("https://example.com/team.ics".into()),
            "https://example.com/team.ics"
        );
    }

    #[tokio::test]
    async fn feed_listing_windows_events() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/team.ics"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(FEED, "text/calendar"))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = WebcalCalendarAdapter::new(
            HttpClient::new().expect("http client"),
            "frank@example.com",
            format!("{}/team.ics", server.uri()),
        );
        let events = adapter.list_events("feed", window()).await.expect("listing works");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Town hall");
        assert_eq!(events[0].source, Provider::Webcal);
    }

    #[tokio::test]
    async fn feeds_reject_mutations() {
        let adapter = WebcalCalendarAdapter::new(
            HttpClient::new().expect("http client"),
            "frank@example.com",
            "https://example.com/team.ics",
        );
        let request = CreateEventRequest {
            calendar_id: "feed".into(),
            owner_address: "frank@example.com".into(),
            title: "Nope".into(),
            start: Utc.with_ymd_and_hms(2022, 5, 4, 9, 0, 0).single().unwrap(),
            end: Utc.with_ymd_and_hms(2022, 5, 4, 10, 0, 0).single().unwrap(),
            attendees: vec![],
            description: None,
            location: None,
            idempotency_key: "k".into(),
        };

        let err = adapter.create_event(&request).await.expect_err("feeds are read-only");
        assert!(matches!(err, CalWeaveError::Validation(_)));
    }

    #[tokio::test]
    async fn the_single_listed_calendar_is_read_only() {
        let adapter = WebcalCalendarAdapter::new(
            HttpClient::new().expect("http client"),
            "frank@example.com",
            "webcal://example.com/team.ics",
        );
        let listings = adapter.list_calendars().await.expect("listing works");
        assert_eq!(listings.len(), 1);
        assert!(listings[0].is_read_only);
        assert_eq!(listings[0].calendar_id, "https://example.com/team.ics");
    }
}
