//! Engine constants
//!
//! Centralized location for all domain-level defaults used throughout the
//! engine. Runtime-tunable values have a matching field in [`crate::Config`].

// Sync orchestration
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 900;
pub const DEFAULT_SYNC_WINDOW_PAST_DAYS: i64 = 30;
pub const DEFAULT_SYNC_WINDOW_FUTURE_DAYS: i64 = 90;
pub const DEFAULT_MAX_SYNC_RETRIES: u32 = 3;

// Task queue
pub const DEFAULT_GLOBAL_CONCURRENCY: usize = 8;
pub const DEFAULT_MAX_PENDING_TASKS: usize = 10_000;
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 30;

// Webhooks
pub const DEFAULT_WEBHOOK_DEDUPE_TTL_SECS: u64 = 600;
pub const DEFAULT_CHANNEL_RENEWAL_LEAD_SECS: u64 = 86_400;

// Inbound HTTP
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

// Outbound HTTP
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_HTTP_MAX_ATTEMPTS: usize = 3;
