//! Interval merge engine
//!
//! Pure functions answering the one question availability cares about: when
//! is the account busy. Merging intentionally discards per-source
//! attribution; a merged interval keeps the fields of its earliest
//! contributor only so the output type stays uniform.

use calweave_domain::{BusyInterval, TimeRange};
use chrono::Duration;
use tracing::debug;

/// Merge busy intervals into their minimal ordered, non-overlapping cover.
///
/// Sorts by start (ties by end), then sweeps: an interval starting at or
/// before the current merged end extends it; anything else opens a new
/// merged interval. Zero-length and inverted inputs are invalid and are
/// dropped before the sweep. Intervals spanning midnight need no special
/// casing because comparisons are on absolute timestamps.
///
/// O(n log n); contained or duplicate intervals change nothing in the
/// output, so `merge_slots(merge_slots(x)) == merge_slots(x)`.
pub fn merge_slots(intervals: Vec<BusyInterval>) -> Vec<BusyInterval> {
    let total = intervals.len();
    let mut valid: Vec<BusyInterval> = intervals.into_iter().filter(BusyInterval::is_valid).collect();
    if valid.len() < total {
        debug!(dropped = total - valid.len(), "dropped invalid busy intervals before merge");
    }
    valid.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));

    let mut merged: Vec<BusyInterval> = Vec::with_capacity(valid.len());
    for next in valid {
        match merged.last_mut() {
            Some(current) if next.start <= current.end => {
                if next.end > current.end {
                    current.end = next.end;
                }
            }
            _ => merged.push(next),
        }
    }
    merged
}

/// Free windows within `window`: the complement of the merged busy set,
/// keeping only gaps at least `min_len` long.
pub fn free_windows(
    busy: &[BusyInterval],
    window: TimeRange,
    min_len: Duration,
) -> Vec<TimeRange> {
    let merged = merge_slots(busy.to_vec());

    let mut free = Vec::new();
    let mut cursor = window.start;
    for interval in &merged {
        if interval.end <= window.start || interval.start >= window.end {
            continue;
        }
        if interval.start > cursor {
            push_gap(&mut free, cursor, interval.start.min(window.end), min_len);
        }
        if interval.end > cursor {
            cursor = interval.end;
        }
    }
    if cursor < window.end {
        push_gap(&mut free, cursor, window.end, min_len);
    }
    free
}

fn push_gap(
    free: &mut Vec<TimeRange>,
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
    min_len: Duration,
) {
    if end - start >= min_len && start < end {
        free.push(TimeRange { start, end });
    }
}
