//! Inbound webhook notification intake
//!
//! Providers push thin change signals that carry no event data. Intake
//! resolves the channel to its sync bookkeeping row, drops duplicates
//! inside a TTL window, and enqueues a reconcile task on the owning
//! account's lane. The HTTP surface always answers the provider with a
//! success status; the [`IngestOutcome`] only drives logging.

use std::sync::Arc;
use std::time::Duration;

use calweave_common::QueueError;
use calweave_core::ports::{ConnectedCalendarRepository, SyncInfoRepository};
use calweave_domain::{Result, SyncTask, WebhookConfig, WebhookNotification};
use chrono::Utc;
use moka::sync::Cache;
use tracing::{debug, warn};

use super::service::SyncService;

/// Upper bound on distinct notification keys held for deduplication.
const DEDUPE_CACHE_CAPACITY: u64 = 65_536;

/// What intake did with one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A reconcile task was enqueued for the owning calendar.
    Enqueued,
    /// Same notification already seen inside the dedupe window.
    Duplicate,
    /// No bookkeeping row knows this channel id.
    UnknownChannel,
    /// The channel exists but its registration lapsed.
    ExpiredChannel,
    /// The owning connection is gone or deactivated.
    Inactive,
    /// The queue refused the task; the provider will redeliver or the
    /// sweep catches up.
    QueueFull,
}

/// Turns provider push notifications into reconcile tasks.
pub struct WebhookIngest {
    sync_info: Arc<dyn SyncInfoRepository>,
    connections: Arc<dyn ConnectedCalendarRepository>,
    service: SyncService,
    seen: Cache<String, ()>,
}

impl WebhookIngest {
    pub fn new(
        sync_info: Arc<dyn SyncInfoRepository>,
        connections: Arc<dyn ConnectedCalendarRepository>,
        service: SyncService,
        config: &WebhookConfig,
    ) -> Self {
        let seen = Cache::builder()
            .time_to_live(Duration::from_secs(config.dedupe_ttl_seconds))
            .max_capacity(DEDUPE_CACHE_CAPACITY)
            .build();
        Self { sync_info, connections, service, seen }
    }

    /// Processes one normalized notification.
    ///
    /// Never blocks on sync work: the reconcile task is enqueued and its
    /// ticket dropped, so the provider's delivery loop sees an immediate
    /// answer regardless of queue depth.
    pub async fn ingest(&self, notification: &WebhookNotification) -> Result<IngestOutcome> {
        let key = notification.dedupe_key();
        if self.seen.get(&key).is_some() {
            debug!(channel_id = %notification.channel_id, "duplicate notification dropped");
            return Ok(IngestOutcome::Duplicate);
        }
        self.seen.insert(key, ());

        let Some(info) = self.sync_info.find_by_channel(&notification.channel_id).await? else {
            debug!(channel_id = %notification.channel_id, "notification for unknown channel");
            return Ok(IngestOutcome::UnknownChannel);
        };
        if !info.channel_live_at(Utc::now()) {
            debug!(channel_id = %notification.channel_id, "notification for lapsed channel");
            return Ok(IngestOutcome::ExpiredChannel);
        }

        let Some(connection) = self.connections.find_by_id(info.connection_id).await? else {
            debug!(connection_id = %info.connection_id, "channel's connection is gone");
            return Ok(IngestOutcome::Inactive);
        };
        if !connection.active {
            debug!(connection_id = %connection.id, "channel's connection is deactivated");
            return Ok(IngestOutcome::Inactive);
        }

        let task = SyncTask::Reconcile {
            account_key: connection.account_address.clone(),
            connection_id: connection.id,
            calendar_id: info.calendar_id.clone(),
        };
        match self.service.enqueue(task) {
            Ok(ticket) => {
                drop(ticket);
                debug!(
                    channel_id = %notification.channel_id,
                    calendar_id = %info.calendar_id,
                    "webhook notification enqueued reconcile"
                );
                Ok(IngestOutcome::Enqueued)
            }
            Err(QueueError::CapacityExceeded(limit)) => {
                warn!(
                    channel_id = %notification.channel_id,
                    limit,
                    "sync queue full, webhook notification dropped"
                );
                Ok(IngestOutcome::QueueFull)
            }
            Err(err) => {
                warn!(error = %err, "sync queue refused webhook notification");
                Ok(IngestOutcome::QueueFull)
            }
        }
    }
}
