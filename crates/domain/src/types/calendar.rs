//! Connected-calendar records and sync bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::credential::CredentialPayload;
use super::event::Provider;

/// A scheduling account holder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Stable address identifying the account; also the sync queue key.
    pub address: String,
    pub display_name: Option<String>,
}

/// One sub-calendar under a connection
///
/// Only calendars with `sync && enabled` participate in outbound mutation;
/// every enabled calendar contributes busy intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCalendar {
    pub calendar_id: String,
    pub name: String,
    pub color: Option<String>,
    pub sync: bool,
    pub enabled: bool,
    pub is_read_only: bool,
}

impl SubCalendar {
    pub fn contributes_busy(&self) -> bool {
        self.enabled
    }

    pub fn accepts_mutations(&self) -> bool {
        self.sync && self.enabled && !self.is_read_only
    }
}

/// One connection per (account, provider, email)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedCalendar {
    pub id: Uuid,
    /// The scheduling account this connection belongs to (the account key).
    pub account_address: String,
    pub provider: Provider,
    pub email: String,
    pub payload: CredentialPayload,
    pub calendars: Vec<SubCalendar>,
    /// Cleared on irrecoverable auth failure; inactive connections are
    /// skipped by the sweep until reconnected.
    pub active: bool,
}

impl ConnectedCalendar {
    /// Sub-calendars that accept outbound mutations.
    pub fn writable_calendars(&self) -> impl Iterator<Item = &SubCalendar> {
        self.calendars.iter().filter(|c| c.accepts_mutations())
    }

    /// Sub-calendars contributing busy intervals.
    pub fn busy_calendars(&self) -> impl Iterator<Item = &SubCalendar> {
        self.calendars.iter().filter(|c| c.contributes_busy())
    }
}

/// A calendar as enumerated by the provider on connect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarListing {
    pub calendar_id: String,
    pub name: String,
    pub color: Option<String>,
    pub is_read_only: bool,
    pub is_primary: bool,
}

/// Sync bookkeeping row per connected calendar
///
/// Created on connect, refreshed by the orchestrator, deleted on
/// disconnect. Channel fields are absent for sweep-only providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSyncInfo {
    pub connection_id: Uuid,
    pub calendar_id: String,
    pub channel_id: Option<String>,
    pub resource_id: Option<String>,
    pub channel_expiry: Option<DateTime<Utc>>,
    /// Provider incremental-listing cursor (Google syncToken, Graph delta
    /// link); cleared when the provider reports it gone.
    pub sync_cursor: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
}

impl CalendarSyncInfo {
    pub fn new(connection_id: Uuid, calendar_id: impl Into<String>) -> Self {
        Self {
            connection_id,
            calendar_id: calendar_id.into(),
            channel_id: None,
            resource_id: None,
            channel_expiry: None,
            sync_cursor: None,
            last_sync: None,
        }
    }

    /// Whether the push channel is still alive at `now`.
    pub fn channel_live_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.channel_id, self.channel_expiry) {
            (Some(_), Some(expiry)) => expiry > now,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn sub(sync: bool, enabled: bool, read_only: bool) -> SubCalendar {
        SubCalendar {
            calendar_id: "cal".into(),
            name: "Cal".into(),
            color: None,
            sync,
            enabled,
            is_read_only: read_only,
        }
    }

    #[test]
    fn mutation_requires_sync_and_enabled_and_writable() {
        assert!(sub(true, true, false).accepts_mutations());
        assert!(!sub(true, false, false).accepts_mutations());
        assert!(!sub(false, true, false).accepts_mutations());
        assert!(!sub(true, true, true).accepts_mutations());
    }

    #[test]
    fn disabled_calendars_do_not_contribute_busy_time() {
        assert!(sub(false, true, true).contributes_busy());
        assert!(!sub(true, false, false).contributes_busy());
    }

    #[test]
    fn channel_liveness_needs_an_unexpired_channel() {
        let now = Utc::now();
        let mut info = CalendarSyncInfo::new(Uuid::nil(), "primary");
        assert!(!info.channel_live_at(now));

        info.channel_id = Some("chan-1".into());
        info.channel_expiry = Some(now + Duration::hours(1));
        assert!(info.channel_live_at(now));

        info.channel_expiry = Some(now - Duration::hours(1));
        assert!(!info.channel_live_at(now));
    }
}
