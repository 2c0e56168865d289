//! Reconciliation of one connected calendar against remote state
//!
//! A cycle moves the calendar `Idle -> Syncing -> Idle`, or to `Degraded`
//! when the provider reports the credential irrecoverably dead. Remote
//! listings are diffed against known-event snapshots; foreign events follow
//! the remote copy, events with an internal mutation still in flight keep
//! the internal copy and surface a conflict notification instead.
//!
//! Degradation latches per connection: the first calendar to observe auth
//! expiry sends the reconnect notification and deactivates the connection,
//! every later cycle skips until [`Reconciler::reinstate`] clears the latch.

use std::sync::Arc;

use calweave_common::{RetryConfig, RetryExecutor};
use calweave_core::ports::{
    ConnectedCalendarRepository, KnownEventRepository, NotificationPort, SyncInfoRepository,
};
use calweave_core::{diff_remote_state, AdapterFactory, CalendarAdapter, EventDelta, ReconcileInput};
use calweave_domain::{
    AccountNotification, CalWeaveError, CalendarSyncInfo, CalendarSyncState, ConnectedCalendar,
    NotificationKind, Result, SyncConfig, SyncTaskKind, TimeRange,
};
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::{DashMap, DashSet};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::service::SyncReport;
use super::{flatten_retry, provider_retry_config, ProviderRetryPolicy};

/// Converges connected calendars with their remote listings.
pub struct Reconciler {
    connections: Arc<dyn ConnectedCalendarRepository>,
    sync_info: Arc<dyn SyncInfoRepository>,
    known_events: Arc<dyn KnownEventRepository>,
    adapters: Arc<dyn AdapterFactory>,
    notifications: Arc<dyn NotificationPort>,
    /// Per-calendar sync state, keyed by (connection, sub-calendar).
    states: DashMap<(Uuid, String), CalendarSyncState>,
    /// Connections whose credentials died; first inserter owns the
    /// notification and deactivation.
    degraded: DashSet<Uuid>,
    window_past: ChronoDuration,
    window_future: ChronoDuration,
    retry: RetryConfig,
}

impl Reconciler {
    pub fn new(
        connections: Arc<dyn ConnectedCalendarRepository>,
        sync_info: Arc<dyn SyncInfoRepository>,
        known_events: Arc<dyn KnownEventRepository>,
        adapters: Arc<dyn AdapterFactory>,
        notifications: Arc<dyn NotificationPort>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            connections,
            sync_info,
            known_events,
            adapters,
            notifications,
            states: DashMap::new(),
            degraded: DashSet::new(),
            window_past: ChronoDuration::days(config.window_past_days),
            window_future: ChronoDuration::days(config.window_future_days),
            retry: provider_retry_config(config.max_retries),
        }
    }

    /// Current sync state of one calendar. Calendars never reconciled
    /// report `Idle`.
    pub fn state(&self, connection_id: Uuid, calendar_id: &str) -> CalendarSyncState {
        self.states
            .get(&(connection_id, calendar_id.to_string()))
            .map_or(CalendarSyncState::Idle, |entry| *entry)
    }

    /// Whether the connection's auth-expiry latch is set.
    pub fn is_degraded(&self, connection_id: Uuid) -> bool {
        self.degraded.contains(&connection_id)
    }

    /// Clears the degraded latch after fresh credentials arrive.
    ///
    /// Called by the reconnect flow together with reactivating the
    /// connection; the next sweep picks the calendars up again.
    pub fn reinstate(&self, connection_id: Uuid) {
        self.degraded.remove(&connection_id);
        self.states.retain(|(id, _), _| *id != connection_id);
    }

    /// Runs one reconciliation cycle for a single calendar.
    pub async fn reconcile_calendar(
        &self,
        connection_id: Uuid,
        calendar_id: &str,
    ) -> Result<SyncReport> {
        let key = (connection_id, calendar_id.to_string());

        if self.degraded.contains(&connection_id) {
            debug!(%connection_id, calendar_id, "skipping reconciliation, connection degraded");
            return Ok(SyncReport::empty(SyncTaskKind::Reconcile));
        }

        let Some(connection) = self.connections.find_by_id(connection_id).await? else {
            debug!(%connection_id, calendar_id, "connection gone, dropping sync bookkeeping");
            self.sync_info.delete(connection_id, calendar_id).await?;
            self.states.remove(&key);
            return Ok(SyncReport::empty(SyncTaskKind::Reconcile));
        };
        if !connection.active {
            debug!(%connection_id, calendar_id, "skipping reconciliation, connection inactive");
            return Ok(SyncReport::empty(SyncTaskKind::Reconcile));
        }

        self.states.insert(key.clone(), CalendarSyncState::Syncing);
        let result = self.run_cycle(&connection, calendar_id).await;
        match &result {
            Err(CalWeaveError::AuthExpired(_)) => {
                self.states.insert(key, CalendarSyncState::Degraded);
                self.degrade(&connection).await;
            }
            // Transient failures leave the calendar idle for the next sweep.
            _ => {
                self.states.insert(key, CalendarSyncState::Idle);
            }
        }
        result
    }

    async fn run_cycle(
        &self,
        connection: &ConnectedCalendar,
        calendar_id: &str,
    ) -> Result<SyncReport> {
        let adapter = self.adapters.adapter_for(connection).await?;
        let executor = RetryExecutor::new(self.retry.clone(), ProviderRetryPolicy);

        executor
            .execute(|| adapter.refresh_connection())
            .await
            .map_err(flatten_retry)?;

        let now = Utc::now();
        let range = TimeRange::new(now - self.window_past, now + self.window_future)?;

        let mut info = match self.sync_info.find(connection.id, calendar_id).await? {
            Some(info) => info,
            None => CalendarSyncInfo::new(connection.id, calendar_id),
        };

        let delta = self
            .fetch_delta(adapter.as_ref(), &executor, calendar_id, range, info.sync_cursor.clone())
            .await?;

        let known = self.known_events.find_for_calendar(connection.provider, calendar_id).await?;
        let plan = diff_remote_state(&ReconcileInput {
            remote: &delta.events,
            removed_ids: &delta.removed_ids,
            known: &known,
            full_listing: delta.full_listing,
        });

        for row in &plan.upserts {
            self.known_events.upsert(row).await?;
        }
        for identity in &plan.removals {
            self.known_events.remove(identity).await?;
        }
        if !plan.conflicts.is_empty() {
            let events: Vec<&str> =
                plan.conflicts.iter().map(|id| id.source_event_id.as_str()).collect();
            let note = AccountNotification::new(
                connection.account_address.clone(),
                NotificationKind::SyncConflict,
                json!({
                    "connection_id": connection.id,
                    "calendar_id": calendar_id,
                    "provider": connection.provider.as_str(),
                    "events": events,
                }),
            );
            if let Err(err) = self.notifications.notify(&note).await {
                warn!(error = %err, "failed to deliver conflict notification");
            }
        }

        info.sync_cursor = delta.next_cursor;
        info.last_sync = Some(now);
        self.sync_info.upsert(&info).await?;

        info!(
            connection_id = %connection.id,
            calendar_id,
            upserts = plan.upserts.len(),
            removals = plan.removals.len(),
            conflicts = plan.conflicts.len(),
            "reconciliation cycle complete"
        );

        Ok(SyncReport {
            kind: SyncTaskKind::Reconcile,
            mutations: plan.upserts.len() + plan.removals.len(),
            conflicts: plan.conflicts.len(),
            failures: 0,
        })
    }

    /// Change listing with cursor-invalidation fallback: a `NotFound` on a
    /// cursored call means the provider expired the cursor, so the cycle
    /// re-enters once with a full listing.
    async fn fetch_delta(
        &self,
        adapter: &dyn CalendarAdapter,
        executor: &RetryExecutor<ProviderRetryPolicy>,
        calendar_id: &str,
        range: TimeRange,
        cursor: Option<String>,
    ) -> Result<EventDelta> {
        let attempt = executor
            .execute(|| adapter.sync_events(calendar_id, range, cursor.as_deref()))
            .await
            .map_err(flatten_retry);
        match attempt {
            Err(CalWeaveError::NotFound(_)) if cursor.is_some() => {
                info!(calendar_id, "sync cursor invalidated, falling back to a full listing");
                executor
                    .execute(|| adapter.sync_events(calendar_id, range, None))
                    .await
                    .map_err(flatten_retry)
            }
            other => other,
        }
    }

    /// Latches the connection degraded. First caller wins: it alone sends
    /// the reconnect notification and deactivates the connection.
    async fn degrade(&self, connection: &ConnectedCalendar) {
        if !self.degraded.insert(connection.id) {
            return;
        }
        warn!(
            connection_id = %connection.id,
            email = %connection.email,
            provider = %connection.provider,
            "credentials expired, degrading connection"
        );
        let note = AccountNotification::new(
            connection.account_address.clone(),
            NotificationKind::ReconnectRequired,
            json!({
                "connection_id": connection.id,
                "provider": connection.provider.as_str(),
                "email": connection.email,
            }),
        );
        if let Err(err) = self.notifications.notify(&note).await {
            warn!(error = %err, "failed to deliver reconnect notification");
        }
        if let Err(err) = self.connections.set_active(connection.id, false).await {
            warn!(error = %err, connection_id = %connection.id, "failed to deactivate connection");
        }
    }
}
