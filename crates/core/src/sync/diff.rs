//! Remote-vs-known event diffing with an explicit last-writer policy
//!
//! Policy: remote wins for foreign edits; internal wins for
//! locally-initiated edits still in flight. A known event whose
//! `pending_local` flag is set is never overwritten or removed by remote
//! state; it is reported as a conflict for the notification port instead.

use std::collections::{HashMap, HashSet};

use calweave_domain::{EventIdentity, KnownEvent, UnifiedEvent};

/// Inputs to one reconciliation diff, scoped to a single calendar
#[derive(Debug)]
pub struct ReconcileInput<'a> {
    /// Events listed from the provider (full window or incremental page).
    pub remote: &'a [UnifiedEvent],
    /// Source event ids the provider explicitly reported deleted.
    pub removed_ids: &'a [String],
    /// Last-known snapshots for the same calendar.
    pub known: &'a [KnownEvent],
    /// True when `remote` covers the whole sync window, so absence from it
    /// means deletion. False for incremental pages, where absence means
    /// nothing.
    pub full_listing: bool,
}

/// Side effects one reconciliation pass should apply
#[derive(Debug, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Snapshots to insert or update.
    pub upserts: Vec<KnownEvent>,
    /// Snapshots to drop because the remote event is gone.
    pub removals: Vec<EventIdentity>,
    /// Pending-local events the remote tried to change or delete.
    pub conflicts: Vec<EventIdentity>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty() && self.conflicts.is_empty()
    }
}

/// Diff remote state against known snapshots.
///
/// Pure function; the caller guarantees `remote` and `known` are scoped to
/// one calendar. Applying the same plan twice is harmless: upserts are
/// idempotent snapshots and removals of already-absent rows are no-ops,
/// which is what makes webhook-triggered reconciliation safe to repeat.
pub fn diff_remote_state(input: &ReconcileInput<'_>) -> ReconcilePlan {
    let known_by_identity: HashMap<&EventIdentity, &KnownEvent> =
        input.known.iter().map(|k| (&k.identity, k)).collect();

    let mut plan = ReconcilePlan::default();
    let mut seen: HashSet<&EventIdentity> = HashSet::new();

    for event in input.remote {
        let identity = event.identity();
        match known_by_identity.get(&identity) {
            None => {
                plan.upserts.push(KnownEvent {
                    identity,
                    meeting_id: None,
                    title: event.title.clone(),
                    start: event.start,
                    end: event.end,
                    pending_local: false,
                });
            }
            Some(known) => {
                seen.insert(&known.identity);
                if !known.differs_from(&event.title, event.start, event.end) {
                    continue;
                }
                if known.pending_local {
                    plan.conflicts.push(known.identity.clone());
                } else {
                    plan.upserts.push(KnownEvent {
                        identity: known.identity.clone(),
                        meeting_id: known.meeting_id,
                        title: event.title.clone(),
                        start: event.start,
                        end: event.end,
                        pending_local: false,
                    });
                }
            }
        }
    }

    let explicitly_removed: HashSet<&str> =
        input.removed_ids.iter().map(String::as_str).collect();
    for known in input.known {
        let reported_deleted = explicitly_removed.contains(known.identity.source_event_id.as_str());
        let absent_from_full = input.full_listing && !seen.contains(&known.identity);
        if reported_deleted || absent_from_full {
            if known.pending_local {
                plan.conflicts.push(known.identity.clone());
            } else {
                plan.removals.push(known.identity.clone());
            }
        }
    }

    plan
}
