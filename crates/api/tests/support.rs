//! Shared wiring for the HTTP surface tests
//!
//! Builds a full [`AppContext`] over the in-memory stores, with the OAuth
//! token endpoint and every provider API base pointed at one wiremock
//! server. Concrete repository handles stay available for seeding and
//! assertions alongside the port-typed context.

// Shared across several test binaries; not every binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use calweave_app::{routes, AppContext, ConnectionCredentialStore};
use calweave_core::ports::{
    AccountRepository, ConnectedCalendarRepository, CredentialStore, KnownEventRepository,
    MeetingRepository, NotificationPort, SyncInfoRepository, TokenRefresher,
};
use calweave_core::{AdapterFactory, AvailabilityService};
use calweave_domain::{
    Account, CalendarSyncInfo, Config, ConnectedCalendar, CredentialPayload, OAuthClientConfig,
    Provider, SubCalendar,
};
use calweave_infra::providers::{ProviderEndpoints, INTERNAL_CALENDAR_ID};
use calweave_infra::repositories::{
    InMemoryAccountRepository, InMemoryConnectedCalendarRepository, InMemoryKnownEventRepository,
    InMemoryMeetingRepository, InMemorySyncInfoRepository, RecordingNotificationPort,
};
use calweave_infra::sync::Reconciler;
use calweave_infra::{
    CalendarAdapterFactory, CredentialManager, HttpClient, OAuthTokenClient, SyncService,
    WebhookIngest,
};
use chrono::{Duration as ChronoDuration, Utc};
use moka::sync::Cache;
use uuid::Uuid;
use wiremock::MockServer;

/// Shared bed for integration tests exercising the router end to end.
pub struct TestBed {
    /// Mock provider backend every adapter and the token client talk to.
    pub server: MockServer,
    pub context: Arc<AppContext>,
    /// Concrete store handles for seeding and direct assertions.
    pub accounts: Arc<InMemoryAccountRepository>,
    pub connections: Arc<InMemoryConnectedCalendarRepository>,
    pub sync_info: Arc<InMemorySyncInfoRepository>,
    pub meetings: Arc<InMemoryMeetingRepository>,
    pub known_events: Arc<InMemoryKnownEventRepository>,
    pub notifications: Arc<RecordingNotificationPort>,
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.webhook.callback_base_url = Some("https://hooks.test.example".into());
    config.providers.google = Some(OAuthClientConfig {
        client_id: "google-client".into(),
        client_secret: "google-secret".into(),
        redirect_uri: Some("https://app.test.example/oauth/callback".into()),
    });
    config
}

/// Build a fresh test bed with empty stores and a running mock server.
pub async fn setup_test_bed() -> TestBed {
    let server = MockServer::start().await;
    let config = test_config();

    let http = HttpClient::builder().max_attempts(1).build().expect("http client");

    let accounts = Arc::new(InMemoryAccountRepository::default());
    let connections = Arc::new(InMemoryConnectedCalendarRepository::default());
    let sync_info = Arc::new(InMemorySyncInfoRepository::default());
    let meetings = Arc::new(InMemoryMeetingRepository::default());
    let known_events = Arc::new(InMemoryKnownEventRepository::default());
    let notifications = Arc::new(RecordingNotificationPort::default());

    let accounts_port: Arc<dyn AccountRepository> = accounts.clone();
    let connections_port: Arc<dyn ConnectedCalendarRepository> = connections.clone();
    let sync_info_port: Arc<dyn SyncInfoRepository> = sync_info.clone();
    let meetings_port: Arc<dyn MeetingRepository> = meetings.clone();
    let known_events_port: Arc<dyn KnownEventRepository> = known_events.clone();
    let notifications_port: Arc<dyn NotificationPort> = notifications.clone();

    let oauth = Arc::new(
        OAuthTokenClient::new(http.clone(), config.providers.clone())
            .with_token_url(format!("{}/token", server.uri())),
    );
    let store: Arc<dyn CredentialStore> =
        Arc::new(ConnectionCredentialStore::new(Arc::clone(&connections_port)));
    let refresher: Arc<dyn TokenRefresher> = oauth.clone();
    let credentials = Arc::new(CredentialManager::new(refresher, store));

    let adapters: Arc<dyn AdapterFactory> = Arc::new(
        CalendarAdapterFactory::new(http, Arc::clone(&credentials), Arc::clone(&meetings_port))
            .with_endpoints(ProviderEndpoints {
                google_base: Some(server.uri()),
                microsoft_base: Some(server.uri()),
                icloud_caldav_base: server.uri(),
            }),
    );
    let availability =
        AvailabilityService::new(Arc::clone(&connections_port), Arc::clone(&adapters));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&connections_port),
        Arc::clone(&sync_info_port),
        Arc::clone(&known_events_port),
        Arc::clone(&adapters),
        Arc::clone(&notifications_port),
        &config.sync,
    ));
    let sync = SyncService::new(
        Arc::clone(&meetings_port),
        Arc::clone(&connections_port),
        Arc::clone(&known_events_port),
        Arc::clone(&adapters),
        Arc::clone(&notifications_port),
        Arc::clone(&reconciler),
        &config.sync,
    )
    .expect("sync service");
    let webhooks = WebhookIngest::new(
        Arc::clone(&sync_info_port),
        Arc::clone(&connections_port),
        sync.clone(),
        &config.webhook,
    );
    let oauth_states =
        Cache::builder().time_to_live(Duration::from_secs(600)).max_capacity(64).build();

    let context = Arc::new(AppContext {
        config,
        accounts: accounts_port,
        connections: connections_port,
        sync_info: sync_info_port,
        meetings: meetings_port,
        known_events: known_events_port,
        notifications: notifications_port,
        credentials,
        oauth,
        adapters,
        availability,
        reconciler,
        sync,
        webhooks,
        oauth_states,
    });

    TestBed {
        server,
        context,
        accounts,
        connections,
        sync_info,
        meetings,
        known_events,
        notifications,
    }
}

impl TestBed {
    /// Router over the bed's context; clone per request.
    pub fn app(&self) -> Router {
        routes::router(Arc::clone(&self.context))
    }

    pub fn seed_account(&self, address: &str) {
        self.accounts.insert(Account { address: address.into(), display_name: None });
    }

    /// Seed an internal-provider connection for an account.
    ///
    /// The internal calendar contributes busy time but is not a mirror
    /// target, so booking tests exercise the queue without duplicating
    /// meetings through the internal adapter.
    pub async fn seed_internal_connection(&self, address: &str) -> Uuid {
        let connection = ConnectedCalendar {
            id: Uuid::now_v7(),
            account_address: address.into(),
            provider: Provider::Internal,
            email: address.into(),
            payload: CredentialPayload::None,
            calendars: vec![SubCalendar {
                calendar_id: INTERNAL_CALENDAR_ID.into(),
                name: "Meetings".into(),
                color: None,
                sync: false,
                enabled: true,
                is_read_only: false,
            }],
            active: true,
        };
        let id = connection.id;
        self.connections.upsert(&connection).await.expect("seed connection");
        id
    }

    /// Seed a live push channel for a connection's calendar.
    pub async fn seed_channel(&self, connection_id: Uuid, calendar_id: &str, channel_id: &str) {
        let mut info = CalendarSyncInfo::new(connection_id, calendar_id);
        info.channel_id = Some(channel_id.into());
        info.resource_id = Some(format!("{channel_id}-resource"));
        info.channel_expiry = Some(Utc::now() + ChronoDuration::hours(6));
        self.sync_info.upsert(&info).await.expect("seed channel");
    }

    /// Wait until the background queue has reconciled the calendar once.
    pub async fn wait_for_reconcile(&self, connection_id: Uuid, calendar_id: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let info = self
                .sync_info
                .find(connection_id, calendar_id)
                .await
                .expect("sync info lookup");
            if info.and_then(|row| row.last_sync).is_some() {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("reconcile of {connection_id}/{calendar_id} never completed");
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}
