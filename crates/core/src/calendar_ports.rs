//! Calendar provider capability trait and adapter factory
//!
//! Every provider (Google, Office 365, CalDAV, iCloud, webcal, internal)
//! implements [`CalendarAdapter`]; a factory keyed on the [`Provider`] enum
//! selects the implementation for a connection. Capabilities a provider
//! lacks fall back to the trait's defaults: read-only providers reject
//! mutations, push-less providers return `None` from webhook registration
//! and are covered by the scheduled sweep instead.

use std::sync::Arc;

use async_trait::async_trait;
use calweave_domain::{
    CalWeaveError, CalendarListing, ConnectedCalendar, CreateEventRequest, CreatedEvent,
    EventPatch, Provider, Result, TimeRange, UnifiedEvent, WebhookChannel, WebhookRegistration,
};

/// One page of remote changes for a calendar.
///
/// Produced by [`CalendarAdapter::sync_events`]. When `full_listing` is
/// true, `events` covers the whole requested window and anything known but
/// absent can be treated as deleted; when false, only `events` and
/// `removed_ids` carry information and absence means nothing.
#[derive(Debug, Clone, Default)]
pub struct EventDelta {
    pub events: Vec<UnifiedEvent>,
    /// Source event ids the provider explicitly reported as deleted.
    pub removed_ids: Vec<String>,
    /// Cursor to persist for the next incremental pass, when supported.
    pub next_cursor: Option<String>,
    pub full_listing: bool,
}

/// Capability set implemented per provider
///
/// Error contract: implementations never swallow provider failures; a call
/// that could not reach the provider fails with an explicit error so the
/// caller can distinguish "no events" from "could not fetch". Deleting an
/// event the provider no longer has is success (already consistent).
#[async_trait]
pub trait CalendarAdapter: Send + Sync {
    /// Which provider this adapter talks to.
    fn provider(&self) -> Provider;

    /// List events overlapping `range` in the given sub-calendar.
    async fn list_events(&self, calendar_id: &str, range: TimeRange) -> Result<Vec<UnifiedEvent>>;

    /// Incremental change listing from a stored cursor.
    ///
    /// The default covers providers without a change API: a full window
    /// listing with no cursor. Implementations with cursor support return
    /// `NotFound` when the provider reports the cursor gone, signalling the
    /// caller to clear it and re-enter with `cursor = None`.
    async fn sync_events(
        &self,
        calendar_id: &str,
        range: TimeRange,
        cursor: Option<&str>,
    ) -> Result<EventDelta> {
        let _ = cursor;
        let events = self.list_events(calendar_id, range).await?;
        Ok(EventDelta { events, removed_ids: Vec::new(), next_cursor: None, full_listing: true })
    }

    /// Create one remote event.
    ///
    /// Implementations use the request's idempotency key as a client-chosen
    /// event id where the provider supports it, making retries safe.
    async fn create_event(&self, request: &CreateEventRequest) -> Result<CreatedEvent> {
        let _ = request;
        Err(CalWeaveError::Validation(format!(
            "{} calendars do not accept event creation",
            self.provider()
        )))
    }

    /// Apply a partial update to one remote event.
    async fn update_event(
        &self,
        calendar_id: &str,
        source_event_id: &str,
        patch: &EventPatch,
    ) -> Result<()> {
        let _ = (calendar_id, source_event_id, patch);
        Err(CalWeaveError::Validation(format!(
            "{} calendars do not accept event updates",
            self.provider()
        )))
    }

    /// Delete one remote event. A missing remote event is success.
    async fn delete_event(&self, calendar_id: &str, source_event_id: &str) -> Result<()> {
        let _ = (calendar_id, source_event_id);
        Err(CalWeaveError::Validation(format!(
            "{} calendars do not accept event deletion",
            self.provider()
        )))
    }

    /// Validate or renew the stored credential.
    ///
    /// Fails with `AuthExpired` when the credential is irrecoverably dead;
    /// the orchestrator turns that into calendar removal, never a retry
    /// loop.
    async fn refresh_connection(&self) -> Result<()>;

    /// Enumerate the account's sub-calendars.
    async fn list_calendars(&self) -> Result<Vec<CalendarListing>>;

    /// Register a push channel for a calendar.
    ///
    /// Providers without push support return `Ok(None)`; the scheduler then
    /// relies on sweep-only reconciliation for them.
    async fn register_webhook(
        &self,
        registration: &WebhookRegistration,
    ) -> Result<Option<WebhookChannel>> {
        let _ = registration;
        Ok(None)
    }

    /// Replace an expiring push channel with a fresh one.
    async fn renew_webhook(
        &self,
        current: &WebhookChannel,
        registration: &WebhookRegistration,
    ) -> Result<Option<WebhookChannel>> {
        self.stop_webhook(current).await?;
        self.register_webhook(registration).await
    }

    /// Tear down a push channel. Best effort; a missing channel is success.
    async fn stop_webhook(&self, channel: &WebhookChannel) -> Result<()> {
        let _ = channel;
        Ok(())
    }
}

impl std::fmt::Debug for dyn CalendarAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CalendarAdapter({})", self.provider())
    }
}

/// Builds the adapter for a connection, keyed on its provider
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn adapter_for(&self, connection: &ConnectedCalendar) -> Result<Arc<dyn CalendarAdapter>>;
}
