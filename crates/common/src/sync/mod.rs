//! Synchronization primitives for background work
//!
//! The [`queue`] submodule provides the keyed task queue that serializes
//! work per key while letting unrelated keys proceed in parallel. Callers
//! receive a [`queue::TaskTicket`] per enqueued task and may await the
//! outcome or fire and forget.
//!
//! For generic, reusable resilience patterns (retry, clocks), see the
//! `resilience` module which provides library-quality abstractions without
//! domain coupling.

pub mod queue;

pub use queue::{
    KeyedTaskQueue, QueueConfig, QueueError, QueueResult, QueueStats, TaskError, TaskHandler,
    TaskTicket,
};
