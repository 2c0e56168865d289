//! Engine configuration structures
//!
//! Deserialized from environment variables or a config file by the infra
//! loader. Every section has sensible defaults so a bare `Config::default()`
//! yields a runnable engine (providers still need OAuth client settings
//! before their adapters can be built).

use serde::{Deserialize, Serialize};

use crate::constants;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Inbound HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: constants::DEFAULT_SERVER_HOST.to_string(),
            port: constants::DEFAULT_SERVER_PORT,
        }
    }
}

/// Sync orchestration and task queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whether the scheduled sweep runs at all.
    pub enabled: bool,
    /// Seconds between scheduled reconciliation sweeps.
    pub sweep_interval_seconds: u64,
    /// Reconciliation window reaches this many days into the past.
    pub window_past_days: i64,
    /// Reconciliation window reaches this many days into the future.
    pub window_future_days: i64,
    /// Bounded retry budget for transient failures within one cycle.
    pub max_retries: u32,
    /// Global cap on concurrently executing sync tasks across all accounts.
    pub global_concurrency: usize,
    /// Enqueue is rejected beyond this many pending tasks.
    pub max_pending_tasks: usize,
    /// Per-task bound on a single provider call, in seconds.
    pub task_timeout_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_seconds: constants::DEFAULT_SWEEP_INTERVAL_SECS,
            window_past_days: constants::DEFAULT_SYNC_WINDOW_PAST_DAYS,
            window_future_days: constants::DEFAULT_SYNC_WINDOW_FUTURE_DAYS,
            max_retries: constants::DEFAULT_MAX_SYNC_RETRIES,
            global_concurrency: constants::DEFAULT_GLOBAL_CONCURRENCY,
            max_pending_tasks: constants::DEFAULT_MAX_PENDING_TASKS,
            task_timeout_seconds: constants::DEFAULT_TASK_TIMEOUT_SECS,
        }
    }
}

/// Webhook ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Duplicate notifications inside this window are dropped.
    pub dedupe_ttl_seconds: u64,
    /// Channels expiring within this lead window get renewed by the sweep.
    pub channel_renewal_lead_seconds: u64,
    /// Public base URL providers push to, e.g. `https://api.example.com`.
    pub callback_base_url: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            dedupe_ttl_seconds: constants::DEFAULT_WEBHOOK_DEDUPE_TTL_SECS,
            channel_renewal_lead_seconds: constants::DEFAULT_CHANNEL_RENEWAL_LEAD_SECS,
            callback_base_url: None,
        }
    }
}

/// OAuth client settings for the providers that need them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub google: Option<OAuthClientConfig>,
    pub microsoft: Option<OAuthClientConfig>,
}

/// Client credentials for one OAuth provider family
///
/// Consent-screen flows live outside the engine; these settings only feed
/// the code-exchange on-ramp and refresh round-trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
}
