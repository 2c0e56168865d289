use std::time::Duration;

use thiserror::Error;

/// Errors surfaced at enqueue time
///
/// Failures of the task itself are reported through [`TaskError`] when the
/// ticket is awaited; `QueueError` only covers admission problems.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue is at maximum capacity ({0})")]
    CapacityExceeded(usize),

    #[error("Queue is shutting down")]
    ShuttingDown,

    #[error("Invalid queue configuration: {0}")]
    InvalidConfiguration(String),
}

/// Queue operation result type
pub type QueueResult<T> = Result<T, QueueError>;

/// Terminal outcome of an individual task, reported via its ticket
#[derive(Debug, Error)]
pub enum TaskError<E> {
    /// The handler ran and returned an error.
    #[error("Task failed: {0}")]
    Task(E),

    /// The queue shut down before the task ran to completion.
    #[error("Task cancelled by queue shutdown")]
    Cancelled,

    /// The handler exceeded the configured per-task time limit.
    #[error("Task timed out after {limit:?}")]
    Timeout { limit: Duration },
}

impl<E> TaskError<E> {
    /// The handler error, when the handler itself failed.
    pub fn into_task_error(self) -> Option<E> {
        match self {
            Self::Task(error) => Some(error),
            _ => None,
        }
    }
}
