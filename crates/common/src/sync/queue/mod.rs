//! Keyed FIFO task queue
//!
//! Tasks sharing a key execute strictly one at a time in submission order;
//! tasks under different keys run concurrently up to a global limit. Built
//! for provider synchronization where writes against one account must never
//! interleave but accounts are independent of each other.

mod core;
mod errors;
mod types;

pub use core::KeyedTaskQueue;
pub use errors::{QueueError, QueueResult, TaskError};
pub use types::{QueueConfig, QueueStats, TaskHandler, TaskTicket};
