//! Keyed sync task queue service
//!
//! One [`SyncService`] instance owns the engine's task queue: tasks for the
//! same account key run strictly in enqueue order, tasks for different
//! accounts run in parallel under the global concurrency cap. Update and
//! delete tasks push internal meeting state out to every writable connected
//! calendar; reconcile tasks hand off to the [`Reconciler`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calweave_common::{
    KeyedTaskQueue, QueueConfig, QueueError, QueueStats, RetryConfig, RetryExecutor, TaskHandler,
    TaskTicket,
};
use calweave_core::ports::{
    ConnectedCalendarRepository, KnownEventRepository, MeetingRepository, NotificationPort,
};
use calweave_core::{AdapterFactory, CalendarAdapter};
use calweave_domain::{
    AccountNotification, CalWeaveError, CreateEventRequest, EventIdentity, EventPatch, KnownEvent,
    Meeting, NotificationKind, Provider, Result, SyncConfig, SyncTask, SyncTaskKind,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use super::reconciler::Reconciler;
use super::{flatten_retry, provider_retry_config, ProviderRetryPolicy};

/// Outcome summary of one executed sync task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub kind: SyncTaskKind,
    /// Remote mutations applied, or snapshot rows adopted for reconcile.
    pub mutations: usize,
    pub conflicts: usize,
    /// Mirrors that could not be brought up to date.
    pub failures: usize,
}

impl SyncReport {
    pub(crate) fn empty(kind: SyncTaskKind) -> Self {
        Self { kind, mutations: 0, conflicts: 0, failures: 0 }
    }
}

/// Resolves to the report of one enqueued sync task.
pub type SyncTicket = TaskTicket<SyncReport, CalWeaveError>;

/// Executes queue tasks against provider adapters and repositories.
struct SyncTaskHandler {
    meetings: Arc<dyn MeetingRepository>,
    connections: Arc<dyn ConnectedCalendarRepository>,
    known_events: Arc<dyn KnownEventRepository>,
    adapters: Arc<dyn AdapterFactory>,
    notifications: Arc<dyn NotificationPort>,
    reconciler: Arc<Reconciler>,
    retry: RetryConfig,
}

#[async_trait]
impl TaskHandler for SyncTaskHandler {
    type Task = SyncTask;
    type Output = SyncReport;
    type Error = CalWeaveError;

    async fn run(&self, task: SyncTask) -> std::result::Result<SyncReport, CalWeaveError> {
        let kind = task.kind();
        let account_key = task.account_key().to_string();
        let result = match task {
            SyncTask::Update { meeting_id, .. } => {
                self.push_meeting(&account_key, meeting_id, None, kind).await
            }
            SyncTask::UpdateInstance { meeting_id, instance_start, .. } => {
                self.push_meeting(&account_key, meeting_id, Some(instance_start), kind).await
            }
            SyncTask::Delete { meeting_id, identities, .. } => {
                self.remove_mirrors(&account_key, meeting_id, &identities, kind).await
            }
            SyncTask::DeleteInstance { meeting_id, identities, .. } => {
                self.remove_mirrors(&account_key, meeting_id, &identities, kind).await
            }
            SyncTask::Reconcile { connection_id, calendar_id, .. } => {
                self.reconciler.reconcile_calendar(connection_id, &calendar_id).await
            }
        };
        // Tickets from fire-and-forget enqueues are dropped, so failures are
        // logged here rather than only travelling with the ticket.
        if let Err(err) = &result {
            warn!(kind = ?kind, account_key = %account_key, error = %err, "sync task failed");
        }
        result
    }
}

impl SyncTaskHandler {
    /// Pushes the current state of a meeting to every writable calendar of
    /// the account's active connections.
    async fn push_meeting(
        &self,
        account_key: &str,
        meeting_id: Uuid,
        instance_start: Option<DateTime<Utc>>,
        kind: SyncTaskKind,
    ) -> Result<SyncReport> {
        let Some(meeting) = self.meetings.find_by_id(meeting_id).await? else {
            debug!(%meeting_id, "meeting gone before its update task ran");
            return Ok(SyncReport::empty(kind));
        };
        if meeting.is_cancelled() {
            // Cancellations travel as delete tasks with captured identities.
            return Ok(SyncReport::empty(kind));
        }

        let mirrors = self.known_events.find_for_meeting(meeting.id).await?;
        let connections = self.connections.find_by_account(account_key).await?;
        let executor = RetryExecutor::new(self.retry.clone(), ProviderRetryPolicy);

        let mut mutations = 0usize;
        let mut failures = 0usize;
        for connection in &connections {
            // The meeting already lives in the internal store.
            if !connection.active || connection.provider == Provider::Internal {
                continue;
            }
            let adapter = match self.adapters.adapter_for(connection).await {
                Ok(adapter) => adapter,
                Err(err) => {
                    warn!(
                        connection_id = %connection.id,
                        error = %err,
                        "could not build adapter for push"
                    );
                    failures += 1;
                    continue;
                }
            };
            for calendar in connection.writable_calendars() {
                let pushed = self
                    .push_to_calendar(
                        adapter.as_ref(),
                        &calendar.calendar_id,
                        &meeting,
                        &mirrors,
                        instance_start,
                        &executor,
                    )
                    .await;
                match pushed {
                    Ok(count) => mutations += count,
                    Err(err) => {
                        warn!(
                            meeting_id = %meeting.id,
                            calendar_id = %calendar.calendar_id,
                            error = %err,
                            "failed to push meeting to calendar"
                        );
                        failures += 1;
                    }
                }
            }
        }

        if failures > 0 {
            self.notify_failure(account_key, meeting_id, kind, failures).await;
        }
        Ok(SyncReport { kind, mutations, conflicts: 0, failures })
    }

    /// Creates or updates the mirror of one meeting in one calendar.
    ///
    /// Instance pushes only patch occurrence rows already adopted by
    /// reconciliation; they never create, and they leave occurrence times
    /// untouched.
    async fn push_to_calendar(
        &self,
        adapter: &dyn CalendarAdapter,
        calendar_id: &str,
        meeting: &Meeting,
        mirrors: &[KnownEvent],
        instance_start: Option<DateTime<Utc>>,
        executor: &RetryExecutor<ProviderRetryPolicy>,
    ) -> Result<usize> {
        let provider = adapter.provider();
        let targets: Vec<&KnownEvent> = mirrors
            .iter()
            .filter(|row| {
                row.identity.source == provider && row.identity.calendar_id == calendar_id
            })
            .filter(|row| match instance_start {
                Some(start) => row.start == start,
                None => true,
            })
            .collect();

        if targets.is_empty() {
            if instance_start.is_some() {
                return Ok(0);
            }
            // The key is stable per (meeting, provider, calendar): a retried
            // create lands on the same remote event.
            let request = CreateEventRequest {
                calendar_id: calendar_id.to_string(),
                owner_address: meeting.owner_address.clone(),
                title: meeting.title.clone(),
                start: meeting.start,
                end: meeting.end,
                attendees: meeting.attendees.clone(),
                description: meeting.description.clone(),
                location: meeting.location.clone(),
                idempotency_key: Uuid::new_v5(
                    &meeting.id,
                    format!("{provider}/{calendar_id}").as_bytes(),
                )
                .simple()
                .to_string(),
            };
            let created = executor
                .execute(|| adapter.create_event(&request))
                .await
                .map_err(flatten_retry)?;
            self.known_events
                .upsert(&KnownEvent {
                    identity: EventIdentity::new(provider, calendar_id, created.source_event_id),
                    meeting_id: Some(meeting.id),
                    title: meeting.title.clone(),
                    start: meeting.start,
                    end: meeting.end,
                    pending_local: false,
                })
                .await?;
            return Ok(1);
        }

        let mut pushed = 0usize;
        for row in targets {
            let patch = EventPatch {
                title: Some(meeting.title.clone()),
                start: instance_start.is_none().then_some(meeting.start),
                end: instance_start.is_none().then_some(meeting.end),
                description: meeting.description.clone(),
                attendees: Some(meeting.attendees.clone()),
            };
            executor
                .execute(|| {
                    adapter.update_event(calendar_id, &row.identity.source_event_id, &patch)
                })
                .await
                .map_err(flatten_retry)?;
            let (start, end) = match instance_start {
                Some(_) => (row.start, row.end),
                None => (meeting.start, meeting.end),
            };
            self.known_events
                .upsert(&KnownEvent {
                    identity: row.identity.clone(),
                    meeting_id: Some(meeting.id),
                    title: meeting.title.clone(),
                    start,
                    end,
                    pending_local: false,
                })
                .await?;
            pushed += 1;
        }
        Ok(pushed)
    }

    /// Deletes remote mirrors by the identities captured at enqueue time.
    /// Identities whose connection no longer exists only lose their
    /// snapshot row.
    async fn remove_mirrors(
        &self,
        account_key: &str,
        meeting_id: Uuid,
        identities: &[EventIdentity],
        kind: SyncTaskKind,
    ) -> Result<SyncReport> {
        let connections = self.connections.find_by_account(account_key).await?;
        let executor = RetryExecutor::new(self.retry.clone(), ProviderRetryPolicy);

        let mut mutations = 0usize;
        let mut failures = 0usize;
        for identity in identities {
            let owner = connections.iter().find(|connection| {
                connection.provider == identity.source
                    && connection
                        .calendars
                        .iter()
                        .any(|calendar| calendar.calendar_id == identity.calendar_id)
            });
            let Some(connection) = owner else {
                debug!(%identity, "no connection for mirror, dropping snapshot only");
                self.known_events.remove(identity).await?;
                continue;
            };
            let adapter = match self.adapters.adapter_for(connection).await {
                Ok(adapter) => adapter,
                Err(err) => {
                    warn!(%identity, error = %err, "could not build adapter for delete");
                    failures += 1;
                    continue;
                }
            };
            let deleted = executor
                .execute(|| {
                    adapter.delete_event(&identity.calendar_id, &identity.source_event_id)
                })
                .await
                .map_err(flatten_retry);
            match deleted {
                Ok(()) => {
                    self.known_events.remove(identity).await?;
                    mutations += 1;
                }
                Err(err) => {
                    warn!(%identity, error = %err, "failed to remove mirror");
                    failures += 1;
                }
            }
        }

        if failures > 0 {
            self.notify_failure(account_key, meeting_id, kind, failures).await;
        }
        Ok(SyncReport { kind, mutations, conflicts: 0, failures })
    }

    async fn notify_failure(
        &self,
        account_key: &str,
        meeting_id: Uuid,
        kind: SyncTaskKind,
        failures: usize,
    ) {
        let note = AccountNotification::new(
            account_key.to_string(),
            NotificationKind::SyncFailed,
            json!({
                "meeting_id": meeting_id,
                "kind": kind,
                "failures": failures,
            }),
        );
        if let Err(err) = self.notifications.notify(&note).await {
            warn!(error = %err, "failed to deliver sync-failure notification");
        }
    }
}

/// Sync task queue front door
///
/// Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct SyncService {
    queue: KeyedTaskQueue<SyncTaskHandler>,
}

impl SyncService {
    /// Builds the service and its queue from the sync configuration.
    pub fn new(
        meetings: Arc<dyn MeetingRepository>,
        connections: Arc<dyn ConnectedCalendarRepository>,
        known_events: Arc<dyn KnownEventRepository>,
        adapters: Arc<dyn AdapterFactory>,
        notifications: Arc<dyn NotificationPort>,
        reconciler: Arc<Reconciler>,
        config: &SyncConfig,
    ) -> Result<Self> {
        let handler = SyncTaskHandler {
            meetings,
            connections,
            known_events,
            adapters,
            notifications,
            reconciler,
            retry: provider_retry_config(config.max_retries),
        };
        let queue_config = QueueConfig {
            global_concurrency: config.global_concurrency,
            max_pending: config.max_pending_tasks,
            task_timeout: (config.task_timeout_seconds > 0)
                .then_some(Duration::from_secs(config.task_timeout_seconds)),
        };
        let queue = KeyedTaskQueue::new(handler, queue_config)
            .map_err(|err| CalWeaveError::Config(err.to_string()))?;
        Ok(Self { queue })
    }

    /// Admits a task into its account lane.
    ///
    /// Returns [`QueueError::CapacityExceeded`] when the pending cap is hit
    /// and [`QueueError::ShuttingDown`] during drain; callers decide whether
    /// that is fatal.
    pub fn enqueue(&self, task: SyncTask) -> std::result::Result<SyncTicket, QueueError> {
        let key = task.account_key().to_string();
        self.queue.enqueue(key, task)
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.queue.is_shutting_down()
    }

    /// Stops admission and waits for in-flight tasks to settle.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }
}
