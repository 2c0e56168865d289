//! Application context - dependency injection container

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calweave_core::ports::{
    AccountRepository, ConnectedCalendarRepository, CredentialStore, KnownEventRepository,
    MeetingRepository, NotificationPort, SyncInfoRepository, TokenRefresher,
};
use calweave_core::{AdapterFactory, AvailabilityService};
use calweave_domain::{Config, CredentialPayload, Provider, Result};
use calweave_infra::repositories::{
    InMemoryAccountRepository, InMemoryConnectedCalendarRepository, InMemoryKnownEventRepository,
    InMemoryMeetingRepository, InMemorySyncInfoRepository, LogNotificationPort,
};
use calweave_infra::sync::Reconciler;
use calweave_infra::{
    CalendarAdapterFactory, CredentialManager, HttpClient, OAuthTokenClient, SyncScheduler,
    SyncService, WebhookIngest,
};
use moka::sync::Cache;
use uuid::Uuid;

/// Unclaimed consent-flow states lapse after this long.
const OAUTH_STATE_TTL: Duration = Duration::from_secs(600);
const OAUTH_STATE_CAPACITY: u64 = 4096;

/// A consent flow the platform has started and expects back.
///
/// The consent screen itself lives outside the engine; whoever starts one
/// registers its `state` value here so the callback can tie the returning
/// code to an account and reject forged states.
#[derive(Debug, Clone)]
pub struct PendingConnection {
    /// Platform account the new connection belongs to.
    pub account_address: String,
    pub provider: Provider,
    /// Address of the external calendar account being connected.
    pub email: String,
}

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub accounts: Arc<dyn AccountRepository>,
    pub connections: Arc<dyn ConnectedCalendarRepository>,
    pub sync_info: Arc<dyn SyncInfoRepository>,
    pub meetings: Arc<dyn MeetingRepository>,
    pub known_events: Arc<dyn KnownEventRepository>,
    pub notifications: Arc<dyn NotificationPort>,
    pub credentials: Arc<CredentialManager>,
    pub oauth: Arc<OAuthTokenClient>,
    pub adapters: Arc<dyn AdapterFactory>,
    pub availability: AvailabilityService,
    pub reconciler: Arc<Reconciler>,
    pub sync: SyncService,
    pub webhooks: WebhookIngest,
    /// CSRF states for consent flows awaiting their callback.
    pub oauth_states: Cache<String, PendingConnection>,
}

/// Persists rotated credentials onto the connection row itself, keeping
/// the connection the single source of truth for its secret.
pub struct ConnectionCredentialStore {
    connections: Arc<dyn ConnectedCalendarRepository>,
}

impl ConnectionCredentialStore {
    pub fn new(connections: Arc<dyn ConnectedCalendarRepository>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl CredentialStore for ConnectionCredentialStore {
    async fn load(&self, connection_id: Uuid) -> Result<Option<CredentialPayload>> {
        Ok(self.connections.find_by_id(connection_id).await?.map(|connection| connection.payload))
    }

    async fn persist(&self, connection_id: Uuid, payload: &CredentialPayload) -> Result<()> {
        self.connections.update_payload(connection_id, payload).await
    }
}

impl AppContext {
    /// Wire the full engine from configuration.
    ///
    /// Stores are the in-memory implementations; a deployment with durable
    /// storage swaps them behind the same ports.
    pub fn new(config: Config) -> Result<Self> {
        let http = HttpClient::new()?;

        let accounts: Arc<dyn AccountRepository> = Arc::new(InMemoryAccountRepository::default());
        let connections: Arc<dyn ConnectedCalendarRepository> =
            Arc::new(InMemoryConnectedCalendarRepository::default());
        let sync_info: Arc<dyn SyncInfoRepository> =
            Arc::new(InMemorySyncInfoRepository::default());
        let meetings: Arc<dyn MeetingRepository> = Arc::new(InMemoryMeetingRepository::default());
        let known_events: Arc<dyn KnownEventRepository> =
            Arc::new(InMemoryKnownEventRepository::default());
        let notifications: Arc<dyn NotificationPort> = Arc::new(LogNotificationPort);

        let oauth = Arc::new(OAuthTokenClient::new(http.clone(), config.providers.clone()));
        let store: Arc<dyn CredentialStore> =
            Arc::new(ConnectionCredentialStore::new(Arc::clone(&connections)));
        let refresher: Arc<dyn TokenRefresher> = oauth.clone();
        let credentials = Arc::new(CredentialManager::new(refresher, store));

        let adapters: Arc<dyn AdapterFactory> = Arc::new(CalendarAdapterFactory::new(
            http,
            Arc::clone(&credentials),
            Arc::clone(&meetings),
        ));
        let availability =
            AvailabilityService::new(Arc::clone(&connections), Arc::clone(&adapters));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&connections),
            Arc::clone(&sync_info),
            Arc::clone(&known_events),
            Arc::clone(&adapters),
            Arc::clone(&notifications),
            &config.sync,
        ));
        let sync = SyncService::new(
            Arc::clone(&meetings),
            Arc::clone(&connections),
            Arc::clone(&known_events),
            Arc::clone(&adapters),
            Arc::clone(&notifications),
            Arc::clone(&reconciler),
            &config.sync,
        )?;
        let webhooks = WebhookIngest::new(
            Arc::clone(&sync_info),
            Arc::clone(&connections),
            sync.clone(),
            &config.webhook,
        );
        let oauth_states = Cache::builder()
            .time_to_live(OAUTH_STATE_TTL)
            .max_capacity(OAUTH_STATE_CAPACITY)
            .build();

        Ok(Self {
            config,
            accounts,
            connections,
            sync_info,
            meetings,
            known_events,
            notifications,
            credentials,
            oauth,
            adapters,
            availability,
            reconciler,
            sync,
            webhooks,
            oauth_states,
        })
    }

    /// Build the sweep scheduler over this context's stores and queue.
    ///
    /// Starting and stopping want exclusive access, so the binary owns the
    /// scheduler instead of the shared context.
    pub fn scheduler(&self) -> SyncScheduler {
        SyncScheduler::new(
            Arc::clone(&self.connections),
            Arc::clone(&self.sync_info),
            Arc::clone(&self.adapters),
            self.sync.clone(),
            self.config.sync.clone(),
            self.config.webhook.clone(),
        )
    }

    /// Register the CSRF `state` of a consent flow the platform just
    /// started. The callback claims it; unclaimed states lapse.
    pub fn expect_connection(&self, state: impl Into<String>, pending: PendingConnection) {
        self.oauth_states.insert(state.into(), pending);
    }

    /// Claim a pending consent flow by its state value. Single use.
    pub fn take_pending(&self, state: &str) -> Option<PendingConnection> {
        self.oauth_states.remove(state)
    }
}
