//! Inbound webhook endpoints
//!
//! Providers get a success answer whenever the request parses as one of
//! their notifications; what became of it (enqueued, duplicate, unknown
//! channel) is the ingest pipeline's business and only drives logging.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use calweave_domain::{CalWeaveError, Provider, WebhookNotification};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::context::AppContext;
use crate::routes::ApiError;

pub fn router() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/webhooks/google", post(google))
        .route("/webhooks/microsoft", post(microsoft))
}

/// POST /webhooks/google - Google push notification, carried in headers
async fn google(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let notification = notification_from_goog_headers(&headers)?;
    context.webhooks.ingest(&notification).await?;
    Ok(StatusCode::OK)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}

fn notification_from_goog_headers(
    headers: &HeaderMap,
) -> Result<WebhookNotification, CalWeaveError> {
    let Some(channel_id) = header_value(headers, "x-goog-channel-id") else {
        return Err(CalWeaveError::Validation("Missing X-Goog-Channel-ID header".into()));
    };
    // Google sends the channel expiration in RFC 2822 form.
    let expiration = header_value(headers, "x-goog-channel-expiration")
        .and_then(|raw| DateTime::parse_from_rfc2822(&raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc));

    Ok(WebhookNotification {
        provider: Provider::Google,
        channel_id,
        resource_id: header_value(headers, "x-goog-resource-id"),
        resource_state: header_value(headers, "x-goog-resource-state"),
        message_id: header_value(headers, "x-goog-message-number"),
        expiration,
    })
}

#[derive(Deserialize)]
pub struct GraphQuery {
    #[serde(rename = "validationToken")]
    pub validation_token: Option<String>,
}

/// One Microsoft Graph change notification
#[derive(Deserialize)]
struct GraphNotification {
    #[serde(rename = "subscriptionId")]
    subscription_id: String,
    resource: Option<String>,
    #[serde(rename = "changeType")]
    change_type: Option<String>,
    #[serde(rename = "subscriptionExpirationDateTime")]
    subscription_expiration: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct GraphEnvelope {
    #[serde(default)]
    value: Vec<GraphNotification>,
}

/// POST /webhooks/microsoft - Graph handshake and change notifications
///
/// A request carrying `validationToken` is the subscription handshake and
/// gets the token echoed back as plain text. Everything else is a batch of
/// change notifications answered with 202 once each entry is ingested.
async fn microsoft(
    State(context): State<Arc<AppContext>>,
    Query(query): Query<GraphQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if let Some(token) = query.validation_token {
        return Ok((StatusCode::OK, token).into_response());
    }

    let envelope: GraphEnvelope = serde_json::from_slice(&body).map_err(|err| {
        CalWeaveError::Validation(format!("Graph notification body does not parse: {err}"))
    })?;
    for item in envelope.value {
        let notification = WebhookNotification {
            provider: Provider::Office365,
            channel_id: item.subscription_id,
            resource_id: item.resource,
            resource_state: item.change_type,
            message_id: None,
            expiration: item.subscription_expiration,
        };
        context.webhooks.ingest(&notification).await?;
    }
    Ok(StatusCode::ACCEPTED.into_response())
}
