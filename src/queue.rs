//! # Task Queue
//! Unbounded FIFO shared by every submission handler (producers) and every
//! worker (consumers).
//!
//! Items travel through a tokio unbounded mpsc channel; the single receiver is
//! shared by all workers behind an async mutex. Beside the channel the queue
//! counts *unfinished* tasks: a task is unfinished from `enqueue` until a worker
//! calls [`TaskQueue::mark_done`] for it. [`TaskQueue::join`] waits for that
//! count to reach zero.

use std::sync::{Mutex, MutexGuard, PoisonError};

use metrics::gauge;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tracing::error;

use crate::error::QueueError;
use crate::model::Task;

#[derive(Debug, Default)]
struct Counts {
    /// Sent but not yet received.
    waiting: usize,
    unfinished: usize,
}

#[derive(Debug)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Task>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Task>>,
    counts: Mutex<Counts>,
    drained: Notify,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: AsyncMutex::new(rx),
            counts: Mutex::new(Counts::default()),
            drained: Notify::new(),
        }
    }

    fn counts(&self) -> MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a task. Never blocks and never fails.
    pub fn enqueue(&self, task: Task) {
        let depth = {
            let mut counts = self.counts();
            counts.waiting += 1;
            counts.unfinished += 1;
            counts.waiting
        };
        if self.tx.send(task).is_err() {
            // unreachable while `self.rx` is alive; keep the books straight anyway
            let mut counts = self.counts();
            counts.waiting -= 1;
            counts.unfinished -= 1;
            error!(target: "queue", "task channel closed, task dropped");
            return;
        }
        gauge!("queue_depth").set(depth as f64);
    }

    /// Wait for the oldest task and take it. Each task is handed to exactly one caller.
    ///
    /// Cancel-safe: dropping the future before it resolves never loses a task.
    pub async fn dequeue(&self) -> Task {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(task) => {
                let depth = {
                    let mut counts = self.counts();
                    counts.waiting = counts.waiting.saturating_sub(1);
                    counts.waiting
                };
                gauge!("queue_depth").set(depth as f64);
                task
            }
            // the queue owns a sender, so the channel cannot close under us
            None => std::future::pending().await,
        }
    }

    /// Record that one dequeued task has been fully handled (success or failure).
    pub fn mark_done(&self) -> Result<(), QueueError> {
        let now_idle = {
            let mut counts = self.counts();
            if counts.unfinished == 0 {
                return Err(QueueError::TooManyDone);
            }
            counts.unfinished -= 1;
            counts.unfinished == 0
        };
        if now_idle {
            self.drained.notify_waiters();
        }
        Ok(())
    }

    /// Resolve once every enqueued task has been marked done.
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let idle = self.counts().unfinished == 0;
            if idle {
                return;
            }
            notified.await;
        }
    }

    /// Tasks waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.counts().waiting
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks enqueued but not yet marked done (waiting + in flight).
    pub fn unfinished(&self) -> usize {
        self.counts().unfinished
    }
}
