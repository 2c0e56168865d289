//! OAuth connect callback
//!
//! The consent redirect and account sign-in live outside the engine. The
//! registrant parks a [`PendingConnection`] under the state value it hands
//! the provider, and this callback finishes the connect once the provider
//! redirects back with a code.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use calweave_domain::{
    CalWeaveError, CalendarListing, CalendarSyncInfo, ConnectedCalendar, CredentialPayload,
    Provider, SubCalendar, SyncTask, WebhookRegistration,
};
use calweave_infra::sync::callback_url_for;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::AppContext;
use crate::routes::{enqueue_best_effort, ApiError};

pub fn router() -> Router<Arc<AppContext>> {
    Router::new().route("/oauth/callback", get(callback))
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

/// Summary returned once the connection is live
#[derive(Serialize)]
pub struct ConnectedResponse {
    pub connection_id: Uuid,
    pub provider: Provider,
    pub email: String,
    pub calendars: usize,
}

/// GET /oauth/callback - finish an OAuth connect
///
/// Exchanges the authorization code, persists the connection with its
/// enumerated calendars, registers push channels where the provider offers
/// them, and queues the first reconciliation for every enabled calendar.
async fn callback(
    State(context): State<Arc<AppContext>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<ConnectedResponse>, ApiError> {
    let Some(pending) = context.take_pending(&query.state) else {
        return Err(CalWeaveError::Validation(
            "OAuth state does not match any pending connection".into(),
        )
        .into());
    };

    let credential = context.oauth.exchange_code(pending.provider, &query.code).await?;

    // Reconnecting the same mailbox reuses the connection id so sync rows
    // and degraded latches resolve against the existing record.
    let id = context
        .connections
        .find_by_account(&pending.account_address)
        .await?
        .into_iter()
        .find(|c| c.provider == pending.provider && c.email == pending.email)
        .map_or_else(Uuid::now_v7, |c| c.id);

    let mut connection = ConnectedCalendar {
        id,
        account_address: pending.account_address,
        provider: pending.provider,
        email: pending.email,
        payload: CredentialPayload::OAuth(credential),
        calendars: Vec::new(),
        active: true,
    };
    context.connections.upsert(&connection).await?;

    let adapter = context.adapters.adapter_for(&connection).await?;
    let listings = adapter.list_calendars().await?;
    connection.calendars = listings.into_iter().map(sub_calendar_from).collect();
    context.connections.upsert(&connection).await?;

    context.credentials.reinstate(id);
    context.reconciler.reinstate(id);

    let base_url = context.config.webhook.callback_base_url.clone();
    for calendar in connection.busy_calendars() {
        let mut sync_row = CalendarSyncInfo::new(id, &calendar.calendar_id);
        if connection.provider.supports_push() {
            if let Some(base) = base_url.as_deref() {
                let registration = WebhookRegistration {
                    calendar_id: calendar.calendar_id.clone(),
                    callback_url: callback_url_for(base, connection.provider),
                    client_token: None,
                };
                match adapter.register_webhook(&registration).await {
                    Ok(Some(channel)) => {
                        sync_row.channel_id = Some(channel.channel_id);
                        sync_row.resource_id = Some(channel.resource_id);
                        sync_row.channel_expiry = Some(channel.expiry);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        // Sweep-only until the scheduler gets a channel up.
                        warn!(
                            connection_id = %id,
                            calendar_id = %calendar.calendar_id,
                            error = %err,
                            "webhook registration failed on connect"
                        );
                    }
                }
            }
        }
        context.sync_info.upsert(&sync_row).await?;

        enqueue_best_effort(
            &context,
            SyncTask::Reconcile {
                account_key: connection.account_address.clone(),
                connection_id: id,
                calendar_id: calendar.calendar_id.clone(),
            },
        );
    }

    info!(
        connection_id = %id,
        provider = %connection.provider,
        email = %connection.email,
        calendars = connection.calendars.len(),
        "calendar connected"
    );

    Ok(Json(ConnectedResponse {
        connection_id: id,
        provider: connection.provider,
        email: connection.email,
        calendars: connection.calendars.len(),
    }))
}

/// New connections start with every calendar contributing busy time, and
/// only the writable primary receiving mirrored bookings.
fn sub_calendar_from(listing: CalendarListing) -> SubCalendar {
    SubCalendar {
        sync: listing.is_primary && !listing.is_read_only,
        enabled: true,
        calendar_id: listing.calendar_id,
        name: listing.name,
        color: listing.color,
        is_read_only: listing.is_read_only,
    }
}
