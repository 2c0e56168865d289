//! Persistence and collaborator ports
//!
//! The engine talks to storage and the outside world exclusively through
//! these traits. Infrastructure supplies the implementations (in-memory for
//! the composition root and tests); the engine does not prescribe a storage
//! format.

use async_trait::async_trait;
use calweave_domain::{
    Account, AccountNotification, CalendarSyncInfo, ConnectedCalendar, Credential,
    CredentialPayload, EventIdentity, KnownEvent, Meeting, Provider, Result,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Accounts known to the scheduling platform
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get_account(&self, address: &str) -> Result<Option<Account>>;
}

/// Connected external calendars per account
#[async_trait]
pub trait ConnectedCalendarRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ConnectedCalendar>>;

    /// All connections for one account, active or not.
    async fn find_by_account(&self, account_address: &str) -> Result<Vec<ConnectedCalendar>>;

    /// Every active connection across all accounts (the sweep's work list).
    async fn find_active(&self) -> Result<Vec<ConnectedCalendar>>;

    /// Insert or replace a connection.
    async fn upsert(&self, connection: &ConnectedCalendar) -> Result<()>;

    /// Replace the stored credential blob after a token rotation.
    async fn update_payload(&self, id: Uuid, payload: &CredentialPayload) -> Result<()>;

    /// Activate or deactivate a connection (deactivated on auth expiry).
    async fn set_active(&self, id: Uuid, active: bool) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Sync bookkeeping rows, one per (connection, sub-calendar)
#[async_trait]
pub trait SyncInfoRepository: Send + Sync {
    async fn find(&self, connection_id: Uuid, calendar_id: &str)
        -> Result<Option<CalendarSyncInfo>>;

    /// Resolve an inbound webhook channel id to its bookkeeping row.
    async fn find_by_channel(&self, channel_id: &str) -> Result<Option<CalendarSyncInfo>>;

    /// Rows whose push channel expires at or before `cutoff`.
    async fn find_channels_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CalendarSyncInfo>>;

    async fn upsert(&self, info: &CalendarSyncInfo) -> Result<()>;

    async fn delete(&self, connection_id: Uuid, calendar_id: &str) -> Result<()>;
}

/// Last-known remote event snapshots the reconciler diffs against
#[async_trait]
pub trait KnownEventRepository: Send + Sync {
    async fn find(&self, identity: &EventIdentity) -> Result<Option<KnownEvent>>;

    async fn find_for_calendar(
        &self,
        source: Provider,
        calendar_id: &str,
    ) -> Result<Vec<KnownEvent>>;

    /// Every snapshot linked to an internal meeting.
    async fn find_for_meeting(&self, meeting_id: Uuid) -> Result<Vec<KnownEvent>>;

    async fn upsert(&self, event: &KnownEvent) -> Result<()>;

    async fn remove(&self, identity: &EventIdentity) -> Result<()>;
}

/// Internal meeting store backing the internal adapter and booking surface
#[async_trait]
pub trait MeetingRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Meeting>>;

    async fn find_by_owner(&self, owner_address: &str) -> Result<Vec<Meeting>>;

    /// Meetings overlapping the given range for an owner.
    async fn find_overlapping(
        &self,
        owner_address: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<Meeting>>;

    async fn upsert(&self, meeting: &Meeting) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Outbound notification fan-out (email/push happens elsewhere)
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn notify(&self, notification: &AccountNotification) -> Result<()>;
}

/// Durable storage for rotated credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, connection_id: Uuid) -> Result<Option<CredentialPayload>>;

    /// Persist a rotated credential; called on every successful refresh.
    async fn persist(&self, connection_id: Uuid, payload: &CredentialPayload) -> Result<()>;
}

/// Performs the provider token-refresh round trip
///
/// Exists as a seam so the credential manager's single-flight and latching
/// behavior can be tested without a network.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, provider: Provider, credential: &Credential) -> Result<Credential>;
}
