//! Integration tests for the inbound webhook endpoints
//!
//! Covers both provider styles end to end:
//! - `POST /webhooks/google` - header-borne notifications driving a
//!   background reconcile, unknown channels acknowledged and dropped
//! - `POST /webhooks/microsoft` - the validationToken handshake and the
//!   Graph notification envelope

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use calweave_core::ports::SyncInfoRepository;
use serde_json::json;
use tower::ServiceExt;

mod support;
use support::setup_test_bed;

fn google_notification(channel_id: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/google")
        .header("X-Goog-Channel-ID", channel_id)
        .header("X-Goog-Resource-ID", format!("{channel_id}-resource"))
        .header("X-Goog-Resource-State", "exists")
        .header("X-Goog-Message-Number", "42")
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn a_google_notification_drives_a_background_reconcile() {
    let bed = setup_test_bed().await;
    bed.seed_account("noah@example.com");
    let connection_id = bed.seed_internal_connection("noah@example.com").await;
    bed.seed_channel(connection_id, "meetings", "chan-google-1").await;

    let response =
        bed.app().oneshot(google_notification("chan-google-1")).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    // The answer never waits on sync work; the reconcile completes behind it.
    bed.wait_for_reconcile(connection_id, "meetings").await;
}

#[tokio::test]
async fn an_unknown_channel_is_acknowledged_and_dropped() {
    let bed = setup_test_bed().await;

    let response =
        bed.app().oneshot(google_notification("chan-nobody-knows")).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let row = bed.sync_info.find_by_channel("chan-nobody-knows").await.expect("lookup");
    assert!(row.is_none());
}

#[tokio::test]
async fn a_notification_without_the_channel_header_is_rejected() {
    let bed = setup_test_bed().await;

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/google")
        .body(Body::empty())
        .expect("request");
    let response = bed.app().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn the_graph_validation_handshake_echoes_the_token() {
    let bed = setup_test_bed().await;

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/microsoft?validationToken=prove-you-own-this")
        .body(Body::empty())
        .expect("request");
    let response = bed.app().oneshot(request).await.expect("request");

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).expect("content type");
    assert!(content_type.to_str().expect("ascii").starts_with("text/plain"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    assert_eq!(&bytes[..], b"prove-you-own-this");
}

#[tokio::test]
async fn graph_change_notifications_drive_a_background_reconcile() {
    let bed = setup_test_bed().await;
    bed.seed_account("noah@example.com");
    let connection_id = bed.seed_internal_connection("noah@example.com").await;
    bed.seed_channel(connection_id, "meetings", "graph-sub-1").await;

    let body = json!({
        "value": [{
            "subscriptionId": "graph-sub-1",
            "resource": "me/events('AAMkAGI1')",
            "changeType": "updated",
            "subscriptionExpirationDateTime": "2030-01-01T00:00:00Z"
        }]
    });
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/microsoft")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    let response = bed.app().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    bed.wait_for_reconcile(connection_id, "meetings").await;
}

#[tokio::test]
async fn a_malformed_graph_body_is_rejected() {
    let bed = setup_test_bed().await;

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/microsoft")
        .body(Body::from("this is not an envelope"))
        .expect("request");
    let response = bed.app().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
