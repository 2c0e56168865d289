//! Sync tasks and reconciliation state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::EventIdentity;

/// Task kinds processed by the sync task queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTaskKind {
    Update,
    Delete,
    UpdateInstance,
    DeleteInstance,
    Reconcile,
}

/// One unit of work on the sync task queue
///
/// Ephemeral: exists only in the queue, at-most-once execution per enqueue.
/// A crash before execution loses the task; the next reconciliation sweep
/// catches the divergence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncTask {
    /// Push the current state of a meeting to all writable calendars.
    Update { account_key: String, meeting_id: Uuid },
    /// Remove a cancelled meeting's mirrors. Identities are captured at
    /// enqueue time because the meeting row may already be gone.
    Delete { account_key: String, meeting_id: Uuid, identities: Vec<EventIdentity> },
    /// Push one occurrence of a recurring meeting.
    UpdateInstance { account_key: String, meeting_id: Uuid, instance_start: DateTime<Utc> },
    /// Remove one occurrence of a recurring meeting's mirrors.
    DeleteInstance {
        account_key: String,
        meeting_id: Uuid,
        instance_start: DateTime<Utc>,
        identities: Vec<EventIdentity>,
    },
    /// Reconcile one connected calendar against remote state.
    Reconcile { account_key: String, connection_id: Uuid, calendar_id: String },
}

impl SyncTask {
    /// The key this task is serialized under: same key, strict FIFO.
    pub fn account_key(&self) -> &str {
        match self {
            Self::Update { account_key, .. }
            | Self::Delete { account_key, .. }
            | Self::UpdateInstance { account_key, .. }
            | Self::DeleteInstance { account_key, .. }
            | Self::Reconcile { account_key, .. } => account_key,
        }
    }

    pub fn kind(&self) -> SyncTaskKind {
        match self {
            Self::Update { .. } => SyncTaskKind::Update,
            Self::Delete { .. } => SyncTaskKind::Delete,
            Self::UpdateInstance { .. } => SyncTaskKind::UpdateInstance,
            Self::DeleteInstance { .. } => SyncTaskKind::DeleteInstance,
            Self::Reconcile { .. } => SyncTaskKind::Reconcile,
        }
    }
}

/// Per-calendar reconciliation state machine
///
/// `Idle -> Syncing -> (Idle | Degraded)`. Degraded latches until a new
/// credential arrives; the sweep skips degraded calendars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarSyncState {
    Idle,
    Syncing,
    Degraded,
}

/// Last-known internal snapshot of one remote event
///
/// The reconciler diffs remote listings against these rows. `pending_local`
/// marks an event whose internal mutation is still in flight on the queue;
/// remote edits never overwrite it (internal wins), they surface a conflict
/// instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownEvent {
    pub identity: EventIdentity,
    /// Internal meeting this event mirrors, when it mirrors one.
    pub meeting_id: Option<Uuid>,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub pending_local: bool,
}

impl KnownEvent {
    /// Whether the remote copy observably diverged from this snapshot.
    pub fn differs_from(&self, title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.title != title || self.start != start || self.end != end
    }
}
