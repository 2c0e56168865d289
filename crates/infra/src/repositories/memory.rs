//! In-memory repositories behind `parking_lot` locks

use std::collections::HashMap;

use async_trait::async_trait;
use calweave_core::ports::{
    AccountRepository, ConnectedCalendarRepository, CredentialStore, KnownEventRepository,
    MeetingRepository, NotificationPort, SyncInfoRepository,
};
use calweave_domain::{
    Account, AccountNotification, CalWeaveError, CalendarSyncInfo, ConnectedCalendar,
    CredentialPayload, EventIdentity, KnownEvent, Meeting, Provider, Result,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryAccountRepository {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryAccountRepository {
    pub fn insert(&self, account: Account) {
        self.accounts.write().insert(account.address.clone(), account);
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn get_account(&self, address: &str) -> Result<Option<Account>> {
        Ok(self.accounts.read().get(address).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryConnectedCalendarRepository {
    connections: RwLock<HashMap<Uuid, ConnectedCalendar>>,
}

#[async_trait]
impl ConnectedCalendarRepository for InMemoryConnectedCalendarRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ConnectedCalendar>> {
        Ok(self.connections.read().get(&id).cloned())
    }

    async fn find_by_account(&self, account_address: &str) -> Result<Vec<ConnectedCalendar>> {
        Ok(self
            .connections
            .read()
            .values()
            .filter(|connection| connection.account_address == account_address)
            .cloned()
            .collect())
    }

    async fn find_active(&self) -> Result<Vec<ConnectedCalendar>> {
        Ok(self.connections.read().values().filter(|connection| connection.active).cloned().collect())
    }

    async fn upsert(&self, connection: &ConnectedCalendar) -> Result<()> {
        self.connections.write().insert(connection.id, connection.clone());
        Ok(())
    }

    async fn update_payload(&self, id: Uuid, payload: &CredentialPayload) -> Result<()> {
        match self.connections.write().get_mut(&id) {
            Some(connection) => {
                connection.payload = payload.clone();
                Ok(())
            }
            None => Err(CalWeaveError::NotFound(format!("Connection {id} does not exist"))),
        }
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<()> {
        // Deactivating a connection deleted in the meantime is a no-op.
        if let Some(connection) = self.connections.write().get_mut(&id) {
            connection.active = active;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.connections.write().remove(&id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySyncInfoRepository {
    rows: RwLock<HashMap<(Uuid, String), CalendarSyncInfo>>,
}

#[async_trait]
impl SyncInfoRepository for InMemorySyncInfoRepository {
    async fn find(
        &self,
        connection_id: Uuid,
        calendar_id: &str,
    ) -> Result<Option<CalendarSyncInfo>> {
        Ok(self.rows.read().get(&(connection_id, calendar_id.to_string())).cloned())
    }

    async fn find_by_channel(&self, channel_id: &str) -> Result<Option<CalendarSyncInfo>> {
        Ok(self
            .rows
            .read()
            .values()
            .find(|info| info.channel_id.as_deref() == Some(channel_id))
            .cloned())
    }

    async fn find_channels_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CalendarSyncInfo>> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|info| {
                info.channel_id.is_some()
                    && info.channel_expiry.is_some_and(|expiry| expiry <= cutoff)
            })
            .cloned()
            .collect())
    }

    async fn upsert(&self, info: &CalendarSyncInfo) -> Result<()> {
        self.rows
            .write()
            .insert((info.connection_id, info.calendar_id.clone()), info.clone());
        Ok(())
    }

    async fn delete(&self, connection_id: Uuid, calendar_id: &str) -> Result<()> {
        self.rows.write().remove(&(connection_id, calendar_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryKnownEventRepository {
    events: RwLock<HashMap<EventIdentity, KnownEvent>>,
}

#[async_trait]
impl KnownEventRepository for InMemoryKnownEventRepository {
    async fn find(&self, identity: &EventIdentity) -> Result<Option<KnownEvent>> {
        Ok(self.events.read().get(identity).cloned())
    }

    async fn find_for_calendar(
        &self,
        source: Provider,
        calendar_id: &str,
    ) -> Result<Vec<KnownEvent>> {
        Ok(self
            .events
            .read()
            .values()
            .filter(|event| {
                event.identity.source == source && event.identity.calendar_id == calendar_id
            })
            .cloned()
            .collect())
    }

    async fn find_for_meeting(&self, meeting_id: Uuid) -> Result<Vec<KnownEvent>> {
        Ok(self
            .events
            .read()
            .values()
            .filter(|event| event.meeting_id == Some(meeting_id))
            .cloned()
            .collect())
    }

    async fn upsert(&self, event: &KnownEvent) -> Result<()> {
        self.events.write().insert(event.identity.clone(), event.clone());
        Ok(())
    }

    async fn remove(&self, identity: &EventIdentity) -> Result<()> {
        self.events.write().remove(identity);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMeetingRepository {
    meetings: RwLock<HashMap<Uuid, Meeting>>,
}

#[async_trait]
impl MeetingRepository for InMemoryMeetingRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Meeting>> {
        Ok(self.meetings.read().get(&id).cloned())
    }

    async fn find_by_owner(&self, owner_address: &str) -> Result<Vec<Meeting>> {
        Ok(self
            .meetings
            .read()
            .values()
            .filter(|meeting| meeting.owner_address == owner_address)
            .cloned()
            .collect())
    }

    async fn find_overlapping(
        &self,
        owner_address: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<Meeting>> {
        Ok(self
            .meetings
            .read()
            .values()
            .filter(|meeting| {
                meeting.owner_address == owner_address
                    && meeting.start < range_end
                    && meeting.end > range_start
            })
            .cloned()
            .collect())
    }

    async fn upsert(&self, meeting: &Meeting) -> Result<()> {
        self.meetings.write().insert(meeting.id, meeting.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.meetings.write().remove(&id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    payloads: RwLock<HashMap<Uuid, CredentialPayload>>,
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(&self, connection_id: Uuid) -> Result<Option<CredentialPayload>> {
        Ok(self.payloads.read().get(&connection_id).cloned())
    }

    async fn persist(&self, connection_id: Uuid, payload: &CredentialPayload) -> Result<()> {
        self.payloads.write().insert(connection_id, payload.clone());
        Ok(())
    }
}

/// Captures notifications for assertion in tests.
#[derive(Default)]
pub struct RecordingNotificationPort {
    sent: RwLock<Vec<AccountNotification>>,
}

impl RecordingNotificationPort {
    pub fn sent(&self) -> Vec<AccountNotification> {
        self.sent.read().clone()
    }
}

#[async_trait]
impl NotificationPort for RecordingNotificationPort {
    async fn notify(&self, notification: &AccountNotification) -> Result<()> {
        self.sent.write().push(notification.clone());
        Ok(())
    }
}

/// Emits notifications into the log stream. The composition root uses this
/// until a real delivery channel is wired up.
pub struct LogNotificationPort;

#[async_trait]
impl NotificationPort for LogNotificationPort {
    async fn notify(&self, notification: &AccountNotification) -> Result<()> {
        info!(
            account = %notification.account_address,
            kind = ?notification.kind,
            payload = %notification.payload,
            "account notification"
        );
        Ok(())
    }
}
