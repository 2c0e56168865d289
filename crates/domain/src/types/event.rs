//! Canonical event and interval types
//!
//! [`UnifiedEvent`] is the provider-independent representation every adapter
//! normalizes into; [`BusyInterval`] is the slice of it the merge engine
//! consumes. Both are transient: recomputed on every read, never persisted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CalWeaveError, Result};

/// Calendar providers the engine can aggregate from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Google,
    Office365,
    Caldav,
    Icloud,
    Webcal,
    Internal,
}

impl Provider {
    /// Stable string form used in identities, routes, and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Office365 => "office365",
            Self::Caldav => "caldav",
            Self::Icloud => "icloud",
            Self::Webcal => "webcal",
            Self::Internal => "internal",
        }
    }

    /// Whether the provider can push change notifications to us.
    /// Everything else is reconciled by the scheduled sweep only.
    pub fn supports_push(self) -> bool {
        matches!(self, Self::Google | Self::Office365)
    }

    /// Webcal feeds never accept mutations.
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::Webcal)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = CalWeaveError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "google" => Ok(Self::Google),
            "office365" => Ok(Self::Office365),
            "caldav" => Ok(Self::Caldav),
            "icloud" => Ok(Self::Icloud),
            "webcal" => Ok(Self::Webcal),
            "internal" => Ok(Self::Internal),
            other => Err(CalWeaveError::Validation(format!("Unknown provider: {other}"))),
        }
    }
}

/// Identity of an event at its provider
///
/// The engine's canonical identity is `(source, calendar_id,
/// source_event_id)`; the internal surrogate id on [`UnifiedEvent`] exists
/// only for cross-referencing within one process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventIdentity {
    pub source: Provider,
    pub calendar_id: String,
    pub source_event_id: String,
}

impl EventIdentity {
    pub fn new(
        source: Provider,
        calendar_id: impl Into<String>,
        source_event_id: impl Into<String>,
    ) -> Self {
        Self { source, calendar_id: calendar_id.into(), source_event_id: source_event_id.into() }
    }
}

impl fmt::Display for EventIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.source, self.calendar_id, self.source_event_id)
    }
}

/// One participant on an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttendee {
    pub email: String,
    pub name: Option<String>,
    /// Provider response status as reported (`accepted`, `declined`, ...).
    pub response: Option<String>,
}

impl EventAttendee {
    pub fn new(email: impl Into<String>) -> Self {
        Self { email: email.into(), name: None, response: None }
    }
}

/// Canonical representation of a calendar event independent of provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEvent {
    /// Internal surrogate id.
    pub id: Uuid,
    pub source_event_id: String,
    pub source: Provider,
    pub calendar_id: String,
    pub account_email: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendees: Vec<EventAttendee>,
    pub is_organizer: bool,
    pub web_link: Option<String>,
    /// Opaque provider-specific detail carried through untouched.
    #[serde(default)]
    pub provider_data: serde_json::Value,
}

impl UnifiedEvent {
    /// The provider-level identity of this event.
    pub fn identity(&self) -> EventIdentity {
        EventIdentity::new(self.source, self.calendar_id.clone(), self.source_event_id.clone())
    }

    /// Enforce the `start < end` invariant.
    pub fn validate(&self) -> Result<()> {
        if self.start < self.end {
            Ok(())
        } else {
            Err(CalWeaveError::Validation(format!(
                "Event {} has start {} not before end {}",
                self.source_event_id, self.start, self.end
            )))
        }
    }

    /// The busy slice of this event for availability computation.
    pub fn busy_interval(&self) -> BusyInterval {
        BusyInterval {
            start: self.start,
            end: self.end,
            source: self.source,
            account_address: self.account_email.clone(),
        }
    }
}

/// A `[start, end)` range during which an account is unavailable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub source: Provider,
    pub account_address: String,
}

impl BusyInterval {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        source: Provider,
        account_address: impl Into<String>,
    ) -> Self {
        Self { start, end, source, account_address: account_address.into() }
    }

    /// Invalid intervals (zero-length or inverted) are dropped by the
    /// merge engine rather than rejected.
    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }
}

/// A half-open `[start, end)` query or sync window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(CalWeaveError::Validation(format!("Range start {start} is not before end {end}")))
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Request to create a remote event mirroring an internal meeting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub calendar_id: String,
    pub owner_address: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendees: Vec<EventAttendee>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Caller-supplied key used for idempotent create where the provider
    /// supports one (client-chosen event id / UID).
    pub idempotency_key: String,
}

/// Outcome of a remote event create
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedEvent {
    pub source_event_id: String,
    /// Provider-specific extra detail, e.g. a conferencing join link.
    pub additional_info: Option<serde_json::Value>,
}

/// Field-level changes pushed by an update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub attendees: Option<Vec<EventAttendee>>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.description.is_none()
            && self.attendees.is_none()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 5, 4, h, m, 0).single().unwrap()
    }

    #[test]
    fn provider_round_trips_through_str() {
        for provider in [
            Provider::Google,
            Provider::Office365,
            Provider::Caldav,
            Provider::Icloud,
            Provider::Webcal,
            Provider::Internal,
        ] {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
        assert!("outlook".parse::<Provider>().is_err());
    }

    #[test]
    fn time_range_rejects_inverted_bounds() {
        assert!(TimeRange::new(at(10, 0), at(9, 0)).is_err());
        assert!(TimeRange::new(at(9, 0), at(9, 0)).is_err());

        let range = TimeRange::new(at(9, 0), at(10, 0)).unwrap();
        assert!(range.contains(at(9, 30)));
        assert!(!range.contains(at(10, 0)));
    }

    #[test]
    fn overlap_is_exclusive_of_touching_ranges() {
        let morning = TimeRange::new(at(9, 0), at(10, 0)).unwrap();
        let touching = TimeRange::new(at(10, 0), at(11, 0)).unwrap();
        let overlapping = TimeRange::new(at(9, 30), at(11, 0)).unwrap();
        assert!(!morning.overlaps(&touching));
        assert!(morning.overlaps(&overlapping));
    }

    #[test]
    fn event_validation_enforces_start_before_end() {
        let event = UnifiedEvent {
            id: Uuid::nil(),
            source_event_id: "evt-1".into(),
            source: Provider::Google,
            calendar_id: "primary".into(),
            account_email: "alice@example.com".into(),
            title: "Standup".into(),
            start: at(10, 0),
            end: at(9, 0),
            attendees: vec![],
            is_organizer: true,
            web_link: None,
            provider_data: serde_json::Value::Null,
        };
        assert!(event.validate().is_err());
    }
}
