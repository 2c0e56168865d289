//! Shared iCalendar payload handling
//!
//! CalDAV, iCloud, and webcal all speak RFC 5545. This module turns raw ICS
//! text into [`UnifiedEvent`]s and renders outbound events back to ICS for
//! the DAV providers that accept writes.

use calweave_domain::{CalWeaveError, EventAttendee, Provider, Result, TimeRange, UnifiedEvent};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use icalendar::{
    Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event, EventLike,
    EventStatus, Property,
};
use tracing::warn;
use uuid::Uuid;

/// Parse ICS text into unified events, keeping only those overlapping
/// `range`.
///
/// A payload that fails to parse is an error: treating it as an empty
/// calendar would make a full listing look like mass deletion. Individual
/// malformed VEVENTs are skipped with a warning instead.
pub(crate) fn events_from_ics(
    ics: &str,
    source: Provider,
    calendar_id: &str,
    account_email: &str,
    range: TimeRange,
) -> Result<Vec<UnifiedEvent>> {
    let calendar: Calendar = ics
        .parse()
        .map_err(|err| CalWeaveError::Serialization(format!("Invalid iCalendar payload: {err}")))?;

    let mut events = Vec::new();
    for component in calendar.iter() {
        let CalendarComponent::Event(vevent) = component else {
            continue;
        };
        if let Some(event) = map_vevent(vevent, source, calendar_id, account_email) {
            if event.start < range.end && event.end > range.start {
                events.push(event);
            }
        }
    }
    Ok(events)
}

fn map_vevent(
    vevent: &Event,
    source: Provider,
    calendar_id: &str,
    account_email: &str,
) -> Option<UnifiedEvent> {
    let Some(uid) = vevent.get_uid() else {
        warn!(calendar_id, "skipping VEVENT without a UID");
        return None;
    };
    if matches!(vevent.get_status(), Some(EventStatus::Cancelled)) {
        return None;
    }

    let Some(start_raw) = vevent.get_start() else {
        warn!(uid, "skipping VEVENT without DTSTART");
        return None;
    };
    let all_day = matches!(start_raw, DatePerhapsTime::Date(_));
    let start = to_utc(start_raw);
    let end = match vevent.get_end() {
        Some(end_raw) => to_utc(end_raw),
        // RFC 5545 gives date-valued starts an implied one-day duration.
        None if all_day => start + chrono::Duration::days(1),
        None => {
            warn!(uid, "skipping VEVENT without DTEND");
            return None;
        }
    };
    if end <= start {
        warn!(uid, %start, %end, "skipping VEVENT with non-positive duration");
        return None;
    }

    Some(UnifiedEvent {
        id: Uuid::now_v7(),
        source_event_id: uid.to_string(),
        source,
        calendar_id: calendar_id.to_string(),
        account_email: account_email.to_string(),
        title: vevent.get_summary().unwrap_or_default().to_string(),
        start,
        end,
        attendees: Vec::new(),
        is_organizer: false,
        web_link: vevent.property_value("URL").map(str::to_string),
        provider_data: serde_json::Value::Null,
    })
}

pub(crate) fn to_utc(value: DatePerhapsTime) -> DateTime<Utc> {
    match value {
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(instant)) => instant,
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => {
            Utc.from_utc_datetime(&naive)
        }
        // No VTIMEZONE resolution here; TZID-qualified times are taken as
        // UTC. DAV servers are asked for UTC calendar-data.
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, .. }) => {
            Utc.from_utc_datetime(&date_time)
        }
        DatePerhapsTime::Date(date) => Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)),
    }
}

/// Render one outbound event as a single-VEVENT calendar.
pub(crate) fn build_event_ics(
    uid: &str,
    title: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    description: Option<&str>,
    location: Option<&str>,
    attendees: &[EventAttendee],
) -> String {
    let mut vevent = Event::new();
    vevent.uid(uid);
    vevent.summary(title);
    vevent.add_property("DTSTAMP", format_utc_stamp(Utc::now()));
    vevent.add_property("DTSTART", format_utc_stamp(start));
    vevent.add_property("DTEND", format_utc_stamp(end));
    if let Some(description) = description {
        vevent.description(description);
    }
    if let Some(location) = location {
        vevent.location(location);
    }
    for attendee in attendees {
        let mut property = Property::new("ATTENDEE", format!("mailto:{}", attendee.email));
        if let Some(name) = &attendee.name {
            property.add_parameter("CN", name);
        }
        vevent.append_multi_property(property);
    }

    let mut calendar = Calendar::new();
    calendar.push(vevent.done());
    calendar.done().to_string()
}

/// The `YYYYMMDDTHHMMSSZ` form used by DTSTART/DTEND and DAV time-range
/// filters.
pub(crate) fn format_utc_stamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y%m%dT%H%M%SZ").to_string()
}
