//! Resilience primitives for operations that talk to the network
//!
//! The retry machinery here is deliberately generic: it knows nothing about
//! calendars or providers. Domain-aware retry policies (which errors are
//! worth retrying, how to honor a provider's `Retry-After` hint) live with
//! the code that owns those error types and plug in through [`RetryPolicy`].

pub mod clock;
pub mod retry;

pub use clock::{Clock, MockClock, SystemClock};
pub use retry::{
    policies, BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryOutcome, RetryPolicy, RetryResult,
};
