//! Scheduled reconciliation sweep and push channel renewal
//!
//! Push notifications cover the fast path; the sweep is the backstop. On
//! every tick it enqueues a reconcile task for each busy calendar of each
//! active connection, which also covers providers without push support.
//! The same tick renews push channels that would lapse before the next
//! pass, so webhook coverage never silently gaps.

use std::sync::Arc;
use std::time::Duration;

use calweave_common::QueueError;
use calweave_core::ports::{ConnectedCalendarRepository, SyncInfoRepository};
use calweave_core::AdapterFactory;
use calweave_domain::{
    CalWeaveError, Provider, Result, SyncConfig, SyncTask, WebhookChannel, WebhookConfig,
    WebhookRegistration,
};
use chrono::{Duration as ChronoDuration, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::service::SyncService;

/// Wait for the sweep task to finish before detaching on stop.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Periodic sweep driver with explicit lifecycle management.
pub struct SyncScheduler {
    connections: Arc<dyn ConnectedCalendarRepository>,
    sync_info: Arc<dyn SyncInfoRepository>,
    adapters: Arc<dyn AdapterFactory>,
    service: SyncService,
    sync_config: SyncConfig,
    webhook_config: WebhookConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

/// Everything one sweep pass needs, detached from the scheduler's lifetime.
struct SweepContext {
    connections: Arc<dyn ConnectedCalendarRepository>,
    sync_info: Arc<dyn SyncInfoRepository>,
    adapters: Arc<dyn AdapterFactory>,
    service: SyncService,
    renewal_lead: ChronoDuration,
    callback_base_url: Option<String>,
}

impl SyncScheduler {
    pub fn new(
        connections: Arc<dyn ConnectedCalendarRepository>,
        sync_info: Arc<dyn SyncInfoRepository>,
        adapters: Arc<dyn AdapterFactory>,
        service: SyncService,
        sync_config: SyncConfig,
        webhook_config: WebhookConfig,
    ) -> Self {
        Self {
            connections,
            sync_info,
            adapters,
            service,
            sync_config,
            webhook_config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Spawns the background sweep loop.
    ///
    /// A disabled sweep configuration is not an error; the scheduler simply
    /// never ticks and the queue runs on webhooks and explicit enqueues.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(CalWeaveError::Internal("sync scheduler already running".into()));
        }
        if !self.sync_config.enabled {
            info!("scheduled sweep disabled by configuration");
            return Ok(());
        }

        // Fresh token so the scheduler can restart after a stop.
        self.cancellation = CancellationToken::new();
        let context = self.context();
        let interval = Duration::from_secs(self.sync_config.sweep_interval_seconds);
        let cancel = self.cancellation.clone();

        self.task_handle = Some(tokio::spawn(async move {
            sweep_loop(context, interval, cancel).await;
        }));

        info!(
            interval_seconds = self.sync_config.sweep_interval_seconds,
            "sync scheduler started"
        );
        Ok(())
    }

    /// Cancels the sweep loop and waits briefly for it to wind down.
    pub async fn stop(&mut self) {
        self.cancellation.cancel();
        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(JOIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "sweep task ended abnormally"),
                Err(_) => warn!("sweep task did not stop in time, detaching"),
            }
        }
        info!("sync scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Runs one sweep plus renewal pass immediately, outside the schedule.
    /// Used at startup to catch up on changes missed while down.
    pub async fn run_once(&self) -> Result<()> {
        let context = self.context();
        run_sweep(&context).await?;
        renew_channels(&context).await
    }

    fn context(&self) -> SweepContext {
        SweepContext {
            connections: Arc::clone(&self.connections),
            sync_info: Arc::clone(&self.sync_info),
            adapters: Arc::clone(&self.adapters),
            service: self.service.clone(),
            renewal_lead: ChronoDuration::seconds(
                i64::try_from(self.webhook_config.channel_renewal_lead_seconds).unwrap_or(i64::MAX),
            ),
            callback_base_url: self.webhook_config.callback_base_url.clone(),
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if !self.cancellation.is_cancelled() {
            self.cancellation.cancel();
        }
    }
}

async fn sweep_loop(context: SweepContext, interval: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("sweep loop cancelled");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                if let Err(err) = run_sweep(&context).await {
                    warn!(error = %err, "reconciliation sweep failed");
                }
                if let Err(err) = renew_channels(&context).await {
                    warn!(error = %err, "channel renewal pass failed");
                }
            }
        }
    }
}

/// Enqueues a reconcile task for every busy calendar of every active
/// connection. A full queue ends the pass early; the next tick retries.
async fn run_sweep(context: &SweepContext) -> Result<()> {
    let connections = context.connections.find_active().await?;
    let mut enqueued = 0usize;
    for connection in &connections {
        for calendar in connection.busy_calendars() {
            let task = SyncTask::Reconcile {
                account_key: connection.account_address.clone(),
                connection_id: connection.id,
                calendar_id: calendar.calendar_id.clone(),
            };
            match context.service.enqueue(task) {
                Ok(ticket) => {
                    drop(ticket);
                    enqueued += 1;
                }
                Err(QueueError::CapacityExceeded(limit)) => {
                    warn!(limit, enqueued, "queue full during sweep, stopping this pass");
                    return Ok(());
                }
                Err(QueueError::ShuttingDown) => return Ok(()),
                Err(err) => return Err(CalWeaveError::Internal(err.to_string())),
            }
        }
    }
    debug!(connections = connections.len(), enqueued, "reconciliation sweep enqueued");
    Ok(())
}

/// Renews push channels lapsing before the renewal lead runs out.
///
/// Renewal is best effort per channel: one failure is logged and the row
/// keeps its old expiry, so the next pass tries again before the lapse.
async fn renew_channels(context: &SweepContext) -> Result<()> {
    let Some(base_url) = context.callback_base_url.as_deref() else {
        return Ok(());
    };
    let cutoff = Utc::now() + context.renewal_lead;
    let expiring = context.sync_info.find_channels_expiring_before(cutoff).await?;

    for mut info in expiring {
        let Some(connection) = context.connections.find_by_id(info.connection_id).await? else {
            continue;
        };
        if !connection.active || !connection.provider.supports_push() {
            continue;
        }
        let (Some(channel_id), Some(resource_id), Some(expiry)) =
            (info.channel_id.clone(), info.resource_id.clone(), info.channel_expiry)
        else {
            continue;
        };

        let current = WebhookChannel { channel_id, resource_id, expiry };
        let registration = WebhookRegistration {
            calendar_id: info.calendar_id.clone(),
            callback_url: callback_url_for(base_url, connection.provider),
            client_token: None,
        };
        let adapter = match context.adapters.adapter_for(&connection).await {
            Ok(adapter) => adapter,
            Err(err) => {
                warn!(connection_id = %connection.id, error = %err, "no adapter for renewal");
                continue;
            }
        };
        match adapter.renew_webhook(&current, &registration).await {
            Ok(Some(renewed)) => {
                debug!(
                    calendar_id = %info.calendar_id,
                    channel_id = %renewed.channel_id,
                    "push channel renewed"
                );
                info.channel_id = Some(renewed.channel_id);
                info.resource_id = Some(renewed.resource_id);
                info.channel_expiry = Some(renewed.expiry);
                context.sync_info.upsert(&info).await?;
            }
            Ok(None) => {
                // The provider no longer offers push here; sweep-only from
                // now on.
                info.channel_id = None;
                info.resource_id = None;
                info.channel_expiry = None;
                context.sync_info.upsert(&info).await?;
            }
            Err(err) => {
                warn!(
                    connection_id = %connection.id,
                    calendar_id = %info.calendar_id,
                    error = %err,
                    "push channel renewal failed"
                );
            }
        }
    }
    Ok(())
}

/// Providers push to per-family webhook routes under the public base URL.
pub fn callback_url_for(base: &str, provider: Provider) -> String {
    let path = match provider {
        Provider::Office365 => "/webhooks/microsoft",
        _ => "/webhooks/google",
    };
    format!("{}{path}", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use calweave_core::CalendarAdapter;
    use calweave_domain::{
        CalendarListing, CalendarSyncInfo, ConnectedCalendar, CredentialPayload, SubCalendar,
        TimeRange, UnifiedEvent,
    };
    use parking_lot::Mutex;
    use uuid::Uuid;

    use super::super::reconciler::Reconciler;
    use super::*;
    use crate::repositories::{
        InMemoryConnectedCalendarRepository, InMemoryKnownEventRepository,
        InMemoryMeetingRepository, InMemorySyncInfoRepository, RecordingNotificationPort,
    };

    #[derive(Default)]
    struct CountingAdapter {
        refreshes: AtomicUsize,
        renew_callbacks: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CalendarAdapter for CountingAdapter {
        fn provider(&self) -> Provider {
            Provider::Google
        }

        async fn list_events(&self, _: &str, _: TimeRange) -> Result<Vec<UnifiedEvent>> {
            Ok(Vec::new())
        }

        async fn refresh_connection(&self) -> Result<()> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn list_calendars(&self) -> Result<Vec<CalendarListing>> {
            Ok(Vec::new())
        }

        async fn renew_webhook(
            &self,
            _: &WebhookChannel,
            registration: &WebhookRegistration,
        ) -> Result<Option<WebhookChannel>> {
            self.renew_callbacks.lock().push(registration.callback_url.clone());
            Ok(Some(WebhookChannel {
                channel_id: "chan-fresh".into(),
                resource_id: "res-1".into(),
                expiry: Utc::now() + ChronoDuration::days(7),
            }))
        }
    }

    struct StubFactory(Arc<CountingAdapter>);

    #[async_trait]
    impl AdapterFactory for StubFactory {
        async fn adapter_for(&self, _: &ConnectedCalendar) -> Result<Arc<dyn CalendarAdapter>> {
            Ok(Arc::clone(&self.0) as Arc<dyn CalendarAdapter>)
        }
    }

    struct Bed {
        scheduler: SyncScheduler,
        connections: Arc<InMemoryConnectedCalendarRepository>,
        sync_info: Arc<InMemorySyncInfoRepository>,
        adapter: Arc<CountingAdapter>,
    }

    fn bed(sync_config: SyncConfig, webhook_config: WebhookConfig) -> Bed {
        let connections = Arc::new(InMemoryConnectedCalendarRepository::default());
        let sync_info = Arc::new(InMemorySyncInfoRepository::default());
        let known = Arc::new(InMemoryKnownEventRepository::default());
        let meetings = Arc::new(InMemoryMeetingRepository::default());
        let notifications = Arc::new(RecordingNotificationPort::default());
        let adapter = Arc::new(CountingAdapter::default());
        let factory: Arc<dyn AdapterFactory> = Arc::new(StubFactory(adapter.clone()));
        let reconciler = Arc::new(Reconciler::new(
            connections.clone(),
            sync_info.clone(),
            known.clone(),
            factory.clone(),
            notifications.clone(),
            &sync_config,
        ));
        let service = SyncService::new(
            meetings,
            connections.clone(),
            known,
            factory.clone(),
            notifications,
            reconciler,
            &sync_config,
        )
        .unwrap();
        let scheduler = SyncScheduler::new(
            connections.clone(),
            sync_info.clone(),
            factory,
            service,
            sync_config,
            webhook_config,
        );
        Bed { scheduler, connections, sync_info, adapter }
    }

    fn connection(active: bool, calendars: Vec<(&str, bool)>) -> ConnectedCalendar {
        ConnectedCalendar {
            id: Uuid::now_v7(),
            account_address: "olga@example.com".into(),
            provider: Provider::Google,
            email: "olga@example.com".into(),
            payload: CredentialPayload::None,
            calendars: calendars
                .into_iter()
                .map(|(id, enabled)| SubCalendar {
                    calendar_id: id.into(),
                    name: id.into(),
                    color: None,
                    sync: true,
                    enabled,
                    is_read_only: false,
                })
                .collect(),
            active,
        }
    }

    #[tokio::test]
    async fn a_sweep_reconciles_only_active_busy_calendars() {
        let bed = bed(SyncConfig { max_retries: 0, ..SyncConfig::default() }, WebhookConfig::default());
        bed.connections
            .upsert(&connection(true, vec![("primary", true), ("holidays", false)]))
            .await
            .unwrap();
        bed.connections.upsert(&connection(false, vec![("work", true)])).await.unwrap();

        bed.scheduler.run_once().await.unwrap();

        // The reconcile tasks run on queue lanes; wait for them to land.
        for _ in 0..200 {
            if bed.adapter.refreshes.load(Ordering::SeqCst) >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(bed.adapter.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expiring_channels_are_renewed_through_the_adapter() {
        let webhook_config = WebhookConfig {
            channel_renewal_lead_seconds: 7_200,
            callback_base_url: Some("https://hooks.example.com".into()),
            ..WebhookConfig::default()
        };
        let bed = bed(SyncConfig { max_retries: 0, ..SyncConfig::default() }, webhook_config);

        // The calendar is paused so the sweep stays out of the row and the
        // renewal pass is the only writer.
        let conn = connection(true, vec![("primary", false)]);
        bed.connections.upsert(&conn).await.unwrap();
        let mut info = CalendarSyncInfo::new(conn.id, "primary");
        info.channel_id = Some("chan-old".into());
        info.resource_id = Some("res-1".into());
        info.channel_expiry = Some(Utc::now() + ChronoDuration::hours(1));
        bed.sync_info.upsert(&info).await.unwrap();

        bed.scheduler.run_once().await.unwrap();

        let updated = bed.sync_info.find(conn.id, "primary").await.unwrap().unwrap();
        assert_eq!(updated.channel_id.as_deref(), Some("chan-fresh"));
        assert!(updated.channel_expiry.unwrap() > Utc::now() + ChronoDuration::days(6));

        let callbacks = bed.adapter.renew_callbacks.lock();
        assert_eq!(callbacks.as_slice(), ["https://hooks.example.com/webhooks/google"]);
    }

    #[tokio::test]
    async fn channels_with_comfortable_expiry_are_left_alone() {
        let webhook_config = WebhookConfig {
            channel_renewal_lead_seconds: 3_600,
            callback_base_url: Some("https://hooks.example.com".into()),
            ..WebhookConfig::default()
        };
        let bed = bed(SyncConfig { max_retries: 0, ..SyncConfig::default() }, webhook_config);

        let conn = connection(true, vec![("primary", false)]);
        bed.connections.upsert(&conn).await.unwrap();
        let mut info = CalendarSyncInfo::new(conn.id, "primary");
        info.channel_id = Some("chan-old".into());
        info.resource_id = Some("res-1".into());
        info.channel_expiry = Some(Utc::now() + ChronoDuration::days(3));
        bed.sync_info.upsert(&info).await.unwrap();

        bed.scheduler.run_once().await.unwrap();

        let untouched = bed.sync_info.find(conn.id, "primary").await.unwrap().unwrap();
        assert_eq!(untouched.channel_id.as_deref(), Some("chan-old"));
        assert!(bed.adapter.renew_callbacks.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_start_and_stop() {
        let sync_config = SyncConfig {
            sweep_interval_seconds: 3_600,
            ..SyncConfig::default()
        };
        let mut bed = bed(sync_config, WebhookConfig::default());

        assert!(!bed.scheduler.is_running());
        bed.scheduler.start().unwrap();
        assert!(bed.scheduler.is_running());

        // Second start is refused while the loop lives.
        assert!(bed.scheduler.start().is_err());

        bed.scheduler.stop().await;
        assert!(!bed.scheduler.is_running());
    }

    #[tokio::test]
    async fn a_disabled_sweep_never_spawns() {
        let sync_config = SyncConfig { enabled: false, ..SyncConfig::default() };
        let mut bed = bed(sync_config, WebhookConfig::default());
        bed.scheduler.start().unwrap();
        assert!(!bed.scheduler.is_running());
    }
}
