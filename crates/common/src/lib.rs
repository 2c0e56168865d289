//! Modular common utilities shared across CalWeave crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error plumbing and side-effect-free utilities
//! - `observability`: opt-in tracing
//! - `runtime`: async infrastructure (resilience, single-flight, keyed task
//!   queue)
//! - `test-utils`: deterministic clocks and runtime helpers for tests

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;
#[cfg(feature = "runtime")]
pub mod singleflight;
#[cfg(feature = "runtime")]
pub mod sync;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use resilience::{
    BackoffStrategy, Clock, Jitter, MockClock, RetryConfig, RetryConfigBuilder, RetryDecision,
    RetryError, RetryExecutor, RetryOutcome, RetryPolicy, RetryResult, SystemClock,
};
#[cfg(feature = "runtime")]
pub use singleflight::SingleFlight;
#[cfg(feature = "runtime")]
pub use sync::queue::{
    KeyedTaskQueue, QueueConfig, QueueError, QueueResult, QueueStats, TaskError, TaskHandler,
    TaskTicket,
};
