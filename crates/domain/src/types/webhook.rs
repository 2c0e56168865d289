//! Webhook channels, inbound notifications, and outbound account signals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::Provider;

/// A provider push subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChannel {
    pub channel_id: String,
    pub resource_id: String,
    pub expiry: DateTime<Utc>,
}

/// Request to register a push channel for one calendar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRegistration {
    pub calendar_id: String,
    /// Public URL the provider will POST notifications to.
    pub callback_url: String,
    /// Opaque verification token echoed back by the provider
    /// (Google channel token / Graph clientState).
    pub client_token: Option<String>,
}

/// A normalized inbound push notification
///
/// Google sends these as headers, Graph as a JSON body; the routes
/// normalize both into this shape before ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookNotification {
    pub provider: Provider,
    pub channel_id: String,
    pub resource_id: Option<String>,
    /// Provider state hint (`exists`, `sync`, `updated`, ...).
    pub resource_state: Option<String>,
    /// Message number / notification id used for duplicate detection.
    pub message_id: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl WebhookNotification {
    /// Duplicate deliveries of the same notification share this key.
    /// Without a message id the whole channel state collapses onto one
    /// key, which is still safe: reconciliation is idempotent.
    pub fn dedupe_key(&self) -> String {
        match &self.message_id {
            Some(message_id) => format!("{}:{}:{message_id}", self.provider, self.channel_id),
            None => format!(
                "{}:{}:{}",
                self.provider,
                self.channel_id,
                self.resource_state.as_deref().unwrap_or("-")
            ),
        }
    }
}

/// Signals surfaced to the account through the notification collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Credential is dead; the user must reconnect the calendar.
    ReconnectRequired,
    /// Remote and pending-local edits collided during reconciliation.
    SyncConflict,
    /// An outbound best-effort mutation ultimately failed.
    SyncFailed,
}

/// One outbound notification handed to the notification system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountNotification {
    pub account_address: String,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AccountNotification {
    pub fn new(
        account_address: impl Into<String>,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Self {
        Self { account_address: account_address.into(), kind, payload, created_at: Utc::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_key_tracks_message_id_when_present() {
        let mut notification = WebhookNotification {
            provider: Provider::Google,
            channel_id: "chan-1".into(),
            resource_id: Some("res-1".into()),
            resource_state: Some("exists".into()),
            message_id: Some("41".into()),
            expiration: None,
        };
        let first = notification.dedupe_key();
        assert_eq!(first, notification.dedupe_key());

        notification.message_id = Some("42".into());
        assert_ne!(first, notification.dedupe_key());

        notification.message_id = None;
        assert_eq!(notification.dedupe_key(), "google:chan-1:exists");
    }
}
