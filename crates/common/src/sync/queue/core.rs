//! Core keyed task queue implementation
//!
//! ## Execution model
//!
//! Every key owns a lane: an unbounded channel drained by a dedicated worker
//! task. A lane runs its tasks strictly in arrival order, one at a time, so
//! two tasks sharing a key can never interleave. Lanes are independent of
//! each other and proceed concurrently, throttled only by a global semaphore
//! sized at [`QueueConfig::global_concurrency`].
//!
//! ## Lifecycle
//!
//! Lanes are created on first use and live until shutdown. Keys are expected
//! to be account-scoped and therefore bounded in number. [`shutdown`] stops
//! admission, lets tasks already inside a handler finish, settles everything
//! still waiting as [`TaskError::Cancelled`], and waits for the workers to
//! drain.
//!
//! [`shutdown`]: KeyedTaskQueue::shutdown

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::errors::{QueueError, QueueResult, TaskError};
use super::types::{QueueConfig, QueueStats, TaskHandler, TaskTicket};

struct Envelope<H: TaskHandler> {
    task: H::Task,
    reply: oneshot::Sender<Result<H::Output, TaskError<H::Error>>>,
}

struct Lanes<H: TaskHandler> {
    senders: HashMap<String, mpsc::UnboundedSender<Envelope<H>>>,
    workers: Vec<JoinHandle<()>>,
}

struct Inner<H: TaskHandler> {
    handler: Arc<H>,
    config: QueueConfig,
    lanes: Mutex<Lanes<H>>,
    permits: Arc<Semaphore>,
    pending: AtomicUsize,
    in_flight: AtomicUsize,
    shutdown: AtomicBool,
}

/// FIFO task queue with per-key serialization and a global concurrency cap.
///
/// Cheap to clone; all clones share the same lanes.
pub struct KeyedTaskQueue<H: TaskHandler> {
    inner: Arc<Inner<H>>,
}

impl<H: TaskHandler> Clone for KeyedTaskQueue<H> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<H: TaskHandler> KeyedTaskQueue<H> {
    /// Create a queue driving tasks through `handler`.
    pub fn new(handler: H, config: QueueConfig) -> QueueResult<Self> {
        config.validate().map_err(QueueError::InvalidConfiguration)?;
        let permits = Arc::new(Semaphore::new(config.global_concurrency));
        Ok(Self {
            inner: Arc::new(Inner {
                handler: Arc::new(handler),
                config,
                lanes: Mutex::new(Lanes { senders: HashMap::new(), workers: Vec::new() }),
                permits,
                pending: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                shutdown: AtomicBool::new(false),
            }),
        })
    }

    /// Submit a task under `key` and receive a ticket for its outcome.
    ///
    /// Never blocks on the task itself. Must be called from within a Tokio
    /// runtime because the first task for a key spawns that key's worker.
    pub fn enqueue(
        &self,
        key: impl Into<String>,
        task: H::Task,
    ) -> QueueResult<TaskTicket<H::Output, H::Error>> {
        let key = key.into();
        let admitted = self.inner.pending.fetch_add(1, Ordering::SeqCst) + 1;
        if admitted > self.inner.config.max_pending {
            self.inner.pending.fetch_sub(1, Ordering::SeqCst);
            warn!(key = %key, limit = self.inner.config.max_pending, "queue at capacity");
            return Err(QueueError::CapacityExceeded(self.inner.config.max_pending));
        }

        let (reply, receiver) = oneshot::channel();
        let envelope = Envelope { task, reply };

        let mut lanes = self.inner.lanes.lock();
        if self.inner.shutdown.load(Ordering::SeqCst) {
            self.inner.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::ShuttingDown);
        }

        let sender = match lanes.senders.get(&key) {
            Some(sender) => sender.clone(),
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                debug!(key = %key, "opening queue lane");
                let worker = tokio::spawn(lane_worker(Arc::clone(&self.inner), key.clone(), rx));
                lanes.workers.push(worker);
                lanes.senders.insert(key.clone(), tx.clone());
                tx
            }
        };
        if sender.send(envelope).is_err() {
            self.inner.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::ShuttingDown);
        }

        Ok(TaskTicket { receiver })
    }

    /// Current queue load.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.inner.pending.load(Ordering::SeqCst),
            in_flight: self.inner.in_flight.load(Ordering::SeqCst),
            lanes: self.inner.lanes.lock().senders.len(),
        }
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Stop admission and wait for the queue to drain.
    ///
    /// Tasks already inside a handler run to completion. Tasks still waiting
    /// for a worker or a permit settle as [`TaskError::Cancelled`]. Only the
    /// first caller drains; later calls return once they observe the flag.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        // Waking permit waiters first lets dequeued tasks settle promptly.
        self.inner.permits.close();
        let workers = {
            let mut lanes = self.inner.lanes.lock();
            lanes.senders.clear();
            std::mem::take(&mut lanes.workers)
        };
        debug!(workers = workers.len(), "draining queue lanes");
        for worker in workers {
            let _ = worker.await;
        }
    }
}

async fn lane_worker<H: TaskHandler>(
    inner: Arc<Inner<H>>,
    key: String,
    mut rx: mpsc::UnboundedReceiver<Envelope<H>>,
) {
    while let Some(envelope) = rx.recv().await {
        if inner.shutdown.load(Ordering::SeqCst) {
            settle(&inner, envelope.reply, Err(TaskError::Cancelled));
            continue;
        }

        let permit = match Arc::clone(&inner.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                settle(&inner, envelope.reply, Err(TaskError::Cancelled));
                continue;
            }
        };

        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = match inner.config.task_timeout {
            Some(limit) => match tokio::time::timeout(limit, inner.handler.run(envelope.task)).await
            {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(error)) => Err(TaskError::Task(error)),
                Err(_) => {
                    warn!(key = %key, ?limit, "task exceeded time limit");
                    Err(TaskError::Timeout { limit })
                }
            },
            None => inner.handler.run(envelope.task).await.map_err(TaskError::Task),
        };
        inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        drop(permit);

        settle(&inner, envelope.reply, result);
    }
    debug!(key = %key, "queue lane closed");
}

fn settle<H: TaskHandler>(
    inner: &Inner<H>,
    reply: oneshot::Sender<Result<H::Output, TaskError<H::Error>>>,
    result: Result<H::Output, TaskError<H::Error>>,
) {
    inner.pending.fetch_sub(1, Ordering::SeqCst);
    // The caller may have dropped its ticket; that is fine.
    let _ = reply.send(result);
}
