//! Availability service: aggregate busy time across every connected calendar

use std::sync::Arc;

use calweave_domain::{BusyInterval, Result, TimeRange};
use chrono::Duration;
use futures::future::{join_all, BoxFuture};
use tracing::{instrument, warn};

use super::merge::{free_windows, merge_slots};
use crate::calendar_ports::AdapterFactory;
use crate::ports::ConnectedCalendarRepository;

/// Merged busy intervals and free windows for one account over one range
#[derive(Debug, Clone)]
pub struct Availability {
    pub busy: Vec<BusyInterval>,
    pub free: Vec<TimeRange>,
    /// Connections that could not be fetched this pass, as
    /// `provider/email` labels. Busy data from these sources is missing,
    /// so callers treating free windows as bookable should surface this.
    pub degraded_sources: Vec<String>,
}

/// Read side of the engine: answers "when is this account busy/free"
pub struct AvailabilityService {
    connections: Arc<dyn ConnectedCalendarRepository>,
    adapters: Arc<dyn AdapterFactory>,
}

impl AvailabilityService {
    pub fn new(
        connections: Arc<dyn ConnectedCalendarRepository>,
        adapters: Arc<dyn AdapterFactory>,
    ) -> Self {
        Self { connections, adapters }
    }

    /// Collect busy intervals for `account` across all active connections.
    ///
    /// Sub-calendar fetches run concurrently. A connection that fails to
    /// fetch contributes no intervals and is reported in the returned
    /// degraded list instead of being conflated with "no events".
    #[instrument(skip(self), fields(account = %account))]
    pub async fn busy_intervals(
        &self,
        account: &str,
        range: TimeRange,
    ) -> Result<(Vec<BusyInterval>, Vec<String>)> {
        let connections = self.connections.find_by_account(account).await?;

        // One boxed fetch per connection, failures carried as the source
        // label so partial outage never masquerades as an empty calendar.
        let mut fetches: Vec<BoxFuture<'static, std::result::Result<Vec<BusyInterval>, String>>> =
            Vec::new();
        for connection in connections.into_iter().filter(|c| c.active) {
            let label = format!("{}/{}", connection.provider, connection.email);
            let adapter = match self.adapters.adapter_for(&connection).await {
                Ok(adapter) => adapter,
                Err(error) => {
                    warn!(source = %label, %error, "adapter unavailable for connection");
                    fetches.push(Box::pin(async move { Err(label) }));
                    continue;
                }
            };
            let calendar_ids: Vec<String> =
                connection.busy_calendars().map(|c| c.calendar_id.clone()).collect();
            fetches.push(Box::pin(async move {
                let mut intervals = Vec::new();
                for calendar_id in calendar_ids {
                    match adapter.list_events(&calendar_id, range).await {
                        Ok(events) => {
                            intervals.extend(events.iter().map(|e| e.busy_interval()));
                        }
                        Err(error) => {
                            warn!(source = %label, calendar = %calendar_id, %error,
                                "busy-interval fetch failed");
                            return Err(label);
                        }
                    }
                }
                Ok(intervals)
            }));
        }

        let mut busy = Vec::new();
        let mut degraded = Vec::new();
        for outcome in join_all(fetches).await {
            match outcome {
                Ok(intervals) => busy.extend(intervals),
                Err(label) => degraded.push(label),
            }
        }
        Ok((busy, degraded))
    }

    /// Merged busy intervals plus free windows of at least `min_len`.
    pub async fn availability(
        &self,
        account: &str,
        range: TimeRange,
        min_len: Duration,
    ) -> Result<Availability> {
        let (raw, degraded_sources) = self.busy_intervals(account, range).await?;
        let busy = merge_slots(raw);
        let free = free_windows(&busy, range, min_len);
        Ok(Availability { busy, free, degraded_sources })
    }
}
