use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::errors::TaskError;

/// Processes tasks pulled from the queue.
///
/// One handler instance is shared across every lane, so implementations must
/// be `Send + Sync` and carry their own state behind `Arc`s.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    type Task: Send + 'static;
    type Output: Send + 'static;
    type Error: Send + 'static;

    async fn run(&self, task: Self::Task) -> Result<Self::Output, Self::Error>;
}

/// Queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Tasks allowed to run simultaneously across all keys.
    pub global_concurrency: usize,
    /// Admission limit on tasks waiting to run, across all keys.
    pub max_pending: usize,
    /// Per-task wall clock limit. `None` disables the limit.
    pub task_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            global_concurrency: 8,
            max_pending: 10_000,
            task_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl QueueConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.global_concurrency == 0 {
            return Err("global_concurrency must be greater than 0".to_string());
        }
        if self.max_pending == 0 {
            return Err("max_pending must be greater than 0".to_string());
        }
        if let Some(timeout) = self.task_timeout {
            if timeout.is_zero() {
                return Err("task_timeout must be greater than 0 when set".to_string());
            }
        }
        Ok(())
    }
}

/// Handle for one enqueued task.
///
/// Awaiting the ticket yields the handler's outcome once the task has run.
/// Dropping the ticket detaches from the result without cancelling the task.
#[derive(Debug)]
pub struct TaskTicket<O, E> {
    pub(super) receiver: oneshot::Receiver<Result<O, TaskError<E>>>,
}

impl<O, E> TaskTicket<O, E> {
    /// Wait for the task to settle.
    pub async fn wait(self) -> Result<O, TaskError<E>> {
        self.receiver.await.unwrap_or_else(|_| Err(TaskError::Cancelled))
    }
}

/// Point-in-time view of queue load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks admitted but not yet settled.
    pub pending: usize,
    /// Tasks currently inside a handler.
    pub in_flight: usize,
    /// Keys with a live lane.
    pub lanes: usize,
}
