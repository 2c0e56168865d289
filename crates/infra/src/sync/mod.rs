//! Sync pipeline: keyed task queue, reconciler, webhook intake, sweep
//!
//! Internal mutations and remote change signals both funnel into one
//! [`SyncService`] queue. Tasks for the same account key execute strictly
//! in order; tasks for different accounts run in parallel under a global
//! concurrency cap. The [`Reconciler`] converges one connected calendar
//! against its remote listing, [`WebhookIngest`] turns provider pings into
//! reconcile tasks, and [`SyncScheduler`] runs the periodic sweep plus
//! webhook channel renewal.

use std::time::Duration;

use calweave_common::{RetryConfig, RetryDecision, RetryError, RetryPolicy};
use calweave_domain::CalWeaveError;

mod reconciler;
mod scheduler;
mod service;
mod webhook;

pub use reconciler::Reconciler;
pub use scheduler::{callback_url_for, SyncScheduler};
pub use service::{SyncReport, SyncService, SyncTicket};
pub use webhook::{IngestOutcome, WebhookIngest};

/// First backoff step for provider calls.
const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(500);
/// Backoff is capped here no matter how many attempts remain.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(60);

/// Retry schedule for provider calls inside one sync cycle.
///
/// `max_retries` counts retries, not attempts; zero still means the call
/// runs once.
pub(crate) fn provider_retry_config(max_retries: u32) -> RetryConfig {
    RetryConfig::builder()
        .max_attempts(max_retries.saturating_add(1))
        .exponential_backoff(RETRY_INITIAL_DELAY, 2.0, RETRY_MAX_DELAY)
        .build()
        .unwrap_or_else(|_| RetryConfig::default())
}

/// Retry policy driven by the error taxonomy.
///
/// Server pacing hints override the backoff schedule; transient and
/// rate-limited failures retry; everything else stops immediately so auth
/// expiry and validation failures surface on the first attempt.
pub(crate) struct ProviderRetryPolicy;

impl RetryPolicy<CalWeaveError> for ProviderRetryPolicy {
    fn should_retry(&self, error: &CalWeaveError, _attempt: u32) -> RetryDecision {
        if let Some(delay) = error.retry_after() {
            return RetryDecision::RetryAfter(delay);
        }
        if error.is_retryable() {
            RetryDecision::Retry
        } else {
            RetryDecision::Stop
        }
    }
}

/// Collapses a retry wrapper back into the domain error it carried.
pub(crate) fn flatten_retry(error: RetryError<CalWeaveError>) -> CalWeaveError {
    match error {
        RetryError::AttemptsExhausted { source, .. } | RetryError::NonRetryable { source } => {
            source
        }
        RetryError::InvalidConfiguration { message } => CalWeaveError::Internal(message),
        RetryError::BudgetExceeded { elapsed } => {
            CalWeaveError::Transient(format!("retry time budget exceeded after {elapsed:?}"))
        }
    }
}
