//! CalDAV provider adapter
//!
//! Speaks the calendar-query subset of RFC 4791 over Basic auth. Serves
//! both generic CalDAV servers and iCloud, which differ only in their
//! endpoint. Calendar ids are collection hrefs as reported by the server's
//! own listing; events created here are stored at `{uid}.ics` inside the
//! collection, so the UID doubles as the resource name.

use async_trait::async_trait;
use calweave_core::CalendarAdapter;
use calweave_domain::{
    CalWeaveError, CalendarListing, CreateEventRequest, CreatedEvent, EventAttendee, EventPatch,
    Provider, Result, TimeRange, UnifiedEvent,
};
use icalendar::{Calendar, CalendarComponent, Component};
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use reqwest::{Method, RequestBuilder, StatusCode};
use url::Url;
use uuid::Uuid;

use crate::errors::InfraError;
use crate::http::{ensure_success, HttpClient};
use crate::providers::ics;

const COLLECTIONS_PROPFIND: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:" xmlns:a="http://apple.com/ns/ical/">
  <d:prop>
    <d:displayname/>
    <d:resourcetype/>
    <d:current-user-privilege-set/>
    <a:calendar-color/>
  </d:prop>
</d:propfind>"#;

const PING_PROPFIND: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:"><d:prop><d:displayname/></d:prop></d:propfind>"#;

/// CalDAV adapter bound to one account
///
/// `provider` distinguishes iCloud from generic servers so that events and
/// identities keep their origin; the wire protocol is identical.
pub struct CalDavCalendarAdapter {
    http: HttpClient,
    provider: Provider,
    email: String,
    username: String,
    password: String,
    base_url: String,
}

impl CalDavCalendarAdapter {
    pub fn new(
        http: HttpClient,
        provider: Provider,
        email: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            provider,
            email: email.into(),
            username: username.into(),
            password: password.into(),
            base_url: base_url.into(),
        }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.username, Some(&self.password))
    }

    fn dav_method(name: &'static str) -> Result<Method> {
        Method::from_bytes(name.as_bytes())
            .map_err(|err| CalWeaveError::Internal(format!("invalid HTTP method {name}: {err}")))
    }

    /// Calendar ids are stored as the server's hrefs. Absolute URLs pass
    /// through, server-relative hrefs are joined onto the endpoint, and
    /// bare names become collections under it.
    fn collection_url(&self, calendar_id: &str) -> Result<String> {
        if calendar_id.starts_with("http://") || calendar_id.starts_with("https://") {
            return Ok(calendar_id.to_string());
        }
        if calendar_id.starts_with('/') {
            let base = Url::parse(&self.base_url).map_err(InfraError::from)?;
            let joined = base.join(calendar_id).map_err(InfraError::from)?;
            return Ok(joined.to_string());
        }
        Ok(format!("{}/{}/", self.base_url.trim_end_matches('/'), calendar_id.trim_matches('/')))
    }

    fn event_url(&self, calendar_id: &str, uid: &str) -> Result<String> {
        let collection = self.collection_url(calendar_id)?;
        Ok(format!("{}/{}.ics", collection.trim_end_matches('/'), uid))
    }
}

#[async_trait]
impl CalendarAdapter for CalDavCalendarAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn list_events(&self, calendar_id: &str, range: TimeRange) -> Result<Vec<UnifiedEvent>> {
        let url = self.collection_url(calendar_id)?;
        let response = ensure_success(
            self.http
                .send(
                    self.authed(self.http.request(Self::dav_method("REPORT")?, &url))
                        .header("Depth", "1")
                        .header("Content-Type", "application/xml; charset=utf-8")
                        .body(calendar_query_body(range)),
                )
                .await?,
        )
        .await?;
        let body = response.text().await.map_err(InfraError::from)?;

        let mut events = Vec::new();
        for blob in parse_calendar_data_blobs(&body)? {
            events.extend(ics::events_from_ics(&blob, self.provider, calendar_id, &self.email, range)?);
        }
        Ok(events)
    }

    async fn create_event(&self, request: &CreateEventRequest) -> Result<CreatedEvent> {
        let uid = dav_uid(&request.idempotency_key);
        let body = ics::build_event_ics(
            &uid,
            &request.title,
            request.start,
            request.end,
            request.description.as_deref(),
            request.location.as_deref(),
            &request.attendees,
        );
        let url = self.event_url(&request.calendar_id, &uid)?;

        // If-None-Match makes the PUT a pure create; a 412 means an earlier
        // attempt with this UID already landed.
        let response = self
            .http
            .send(
                self.authed(self.http.request(Method::PUT, &url))
                    .header("Content-Type", "text/calendar; charset=utf-8")
                    .header("If-None-Match", "*")
                    .body(body),
            )
            .await?;
        if response.status() != StatusCode::PRECONDITION_FAILED {
            ensure_success(response).await?;
        }
        Ok(CreatedEvent { source_event_id: uid, additional_info: None })
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
        let url = self.event_url(calendar_id, source_event_id)?;

        // DAV has no partial update; fetch the stored copy, fold the patch
        // in, and PUT the rebuilt event. A missing resource stays an error.
        let response = ensure_success(
            self.http.send(self.authed(self.http.request(Method::GET, &url))).await?,
        )
        .await?;
        let stored_ics = response.text().await.map_err(InfraError::from)?;
        let calendar: Calendar = stored_ics
            .parse()
            .map_err(|err| CalWeaveError::Serialization(format!("Invalid iCalendar at {url}: {err}")))?;
        let Some(CalendarComponent::Event(stored)) =
            calendar.iter().find(|component| matches!(component, CalendarComponent::Event(_)))
        else {
            return Err(CalWeaveError::NotFound(format!("No VEVENT stored at {url}")));
        };

        let title = match &patch.title {
            Some(title) => title.clone(),
            None => stored.get_summary().unwrap_or_default().to_string(),
        };
        let start = match patch.start {
            Some(start) => start,
            None => stored.get_start().map(ics::to_utc).ok_or_else(|| {
                CalWeaveError::Serialization(format!("Stored event at {url} has no DTSTART"))
            })?,
        };
        let end = match patch.end {
            Some(end) => end,
            None => stored.get_end().map(ics::to_utc).ok_or_else(|| {
                CalWeaveError::Serialization(format!("Stored event at {url} has no DTEND"))
            })?,
        };
        let description = match &patch.description {
            Some(description) => Some(description.clone()),
            None => stored.get_description().map(str::to_string),
        };
        let location = stored.property_value("LOCATION").map(str::to_string);
        // Attendee parameters are not carried over; the rebuilt copy keeps
        // addresses only.
        let attendees = match &patch.attendees {
            Some(attendees) => attendees.clone(),
            None => stored
                .multi_properties()
                .get("ATTENDEE")
                .map(|props| {
                    props
                        .iter()
                        .map(|prop| {
                            EventAttendee::new(prop.value().trim_start_matches("mailto:"))
                        })
                        .collect()
                })
                .unwrap_or_default(),
        };

        let rebuilt = ics::build_event_ics(
            source_event_id,
            &title,
            start,
            end,
            description.as_deref(),
            location.as_deref(),
            &attendees,
        );
        let response = self
            .http
            .send(
                self.authed(self.http.request(Method::PUT, &url))
                    .header("Content-Type", "text/calendar; charset=utf-8")
                    .body(rebuilt),
            )
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn delete_event(&self, calendar_id: &str, source_event_id: &str) -> Result<()> {
        let url = self.event_url(calendar_id, source_event_id)?;
        let response =
            self.http.send(self.authed(self.http.request(Method::DELETE, &url))).await?;
        match ensure_success(response).await {
            Ok(_) => Ok(()),
            // Already gone is the state we wanted.
            Err(CalWeaveError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn refresh_connection(&self) -> Result<()> {
        let response = self
            .http
            .send(
                self.authed(self.http.request(Self::dav_method("PROPFIND")?, &self.base_url))
                    .header("Depth", "0")
                    .header("Content-Type", "application/xml; charset=utf-8")
                    .body(PING_PROPFIND),
            )
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn list_calendars(&self) -> Result<Vec<CalendarListing>> {
        let response = ensure_success(
            self.http
                .send(
                    self.authed(self.http.request(Self::dav_method("PROPFIND")?, &self.base_url))
                        .header("Depth", "1")
                        .header("Content-Type", "application/xml; charset=utf-8")
                        .body(COLLECTIONS_PROPFIND),
                )
                .await?,
        )
        .await?;
        let body = response.text().await.map_err(InfraError::from)?;

        Ok(parse_calendar_collections(&body)?
            .into_iter()
            .map(|collection| {
                let name = if collection.display_name.is_empty() {
                    collection
                        .href
                        .trim_end_matches('/')
                        .rsplit('/')
                        .next()
                        .unwrap_or("calendar")
                        .to_string()
                } else {
                    collection.display_name
                };
                CalendarListing {
                    calendar_id: collection.href,
                    name,
                    color: collection.color,
                    is_read_only: collection.read_only,
                    is_primary: false,
                }
            })
            .collect())
    }
}

/// A UID both path-safe and deterministic per idempotency key, so a retried
/// create lands on the same resource.
fn dav_uid(idempotency_key: &str) -> String {
    let cleaned: String = idempotency_key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if cleaned.is_empty() {
        Uuid::now_v7().to_string()
    } else {
        format!("calweave-{cleaned}")
    }
}

fn calendar_query_body(range: TimeRange) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <d:getetag/>
    <c:calendar-data/>
  </d:prop>
  <c:filter>
    <c:comp-filter name="VCALENDAR">
      <c:comp-filter name="VEVENT">
        <c:time-range start="{}" end="{}"/>
      </c:comp-filter>
    </c:comp-filter>
  </c:filter>
</c:calendar-query>"#,
        ics::format_utc_stamp(range.start),
        ics::format_utc_stamp(range.end),
    )
}

/// Element name without its namespace prefix. Servers disagree on prefixes
/// (`d:`, `D:`, none), so matching happens on local names only.
fn local_name(raw: &[u8]) -> String {
    let full = String::from_utf8_lossy(raw);
    match full.rsplit(':').next() {
        Some(local) => local.to_string(),
        None => full.into_owned(),
    }
}

/// Pull every `calendar-data` payload out of a REPORT multistatus.
fn parse_calendar_data_blobs(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut blobs = Vec::new();
    let mut current_element: Option<String> = None;
    let mut current_data = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) => {
                let name = local_name(e.name().as_ref());
                if name == "response" {
                    current_data.clear();
                }
                current_element = Some(name);
            }
            Ok(XmlEvent::Text(e)) => {
                if current_element.as_deref() == Some("calendar-data") {
                    current_data.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(XmlEvent::CData(e)) => {
                if current_element.as_deref() == Some("calendar-data") {
                    current_data.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(XmlEvent::End(e)) => {
                if local_name(e.name().as_ref()) == "response" && !current_data.is_empty() {
                    blobs.push(std::mem::take(&mut current_data));
                }
                current_element = None;
            }
            Ok(XmlEvent::Eof) => break,
            Err(err) => return Err(CalWeaveError::from(InfraError::from(err))),
            _ => {}
        }
        buf.clear();
    }
    Ok(blobs)
}

struct CalendarCollection {
    href: String,
    display_name: String,
    color: Option<String>,
    read_only: bool,
}

/// Pull the calendar collections out of a depth-1 PROPFIND multistatus.
/// Responses whose resourcetype lacks a `calendar` element (the home
/// collection itself, contact books) are skipped. Writability comes from
/// the privilege set; servers that omit it are assumed writable.
fn parse_calendar_collections(xml: &str) -> Result<Vec<CalendarCollection>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut collections = Vec::new();
    let mut current_element: Option<String> = None;
    let mut href = String::new();
    let mut display_name = String::new();
    let mut color: Option<String> = None;
    let mut is_calendar = false;
    let mut in_privileges = false;
    let mut saw_privileges = false;
    let mut can_write = false;

    let note_element =
        |name: &str, in_privileges: bool, is_calendar: &mut bool, can_write: &mut bool| match name {
            "calendar" if !in_privileges => *is_calendar = true,
            "write" | "write-content" | "all" if in_privileges => *can_write = true,
            _ => {}
        };

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "response" => {
                        href.clear();
                        display_name.clear();
                        color = None;
                        is_calendar = false;
                        saw_privileges = false;
                        can_write = false;
                    }
                    "current-user-privilege-set" => {
                        in_privileges = true;
                        saw_privileges = true;
                    }
                    other => note_element(other, in_privileges, &mut is_calendar, &mut can_write),
                }
                current_element = Some(name);
            }
            Ok(XmlEvent::Empty(e)) => {
                let name = local_name(e.name().as_ref());
                note_element(&name, in_privileges, &mut is_calendar, &mut can_write);
            }
            Ok(XmlEvent::Text(e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                match current_element.as_deref() {
                    Some("href") => href = text,
                    Some("displayname") => display_name = text,
                    Some("calendar-color") if !text.is_empty() => color = Some(text),
                    _ => {}
                }
            }
            Ok(XmlEvent::End(e)) => {
                match local_name(e.name().as_ref()).as_str() {
                    "current-user-privilege-set" => in_privileges = false,
                    "response" => {
                        if is_calendar && !href.is_empty() {
                            collections.push(CalendarCollection {
                                href: std::mem::take(&mut href),
                                display_name: std::mem::take(&mut display_name),
                                color: color.take(),
                                read_only: saw_privileges && !can_write,
                            });
                        }
                    }
                    _ => {}
                }
                current_element = None;
            }
            Ok(XmlEvent::Eof) => break,
            Err(err) => return Err(CalWeaveError::from(InfraError::from(err))),
            _ => {}
        }
        buf.clear();
    }
    Ok(collections)
}
