//! # Worker Pool
//! A fixed number of tokio tasks draining the shared [`TaskQueue`].
//!
//! Each worker loops: dequeue, evaluate through the oracle, broadcast the
//! `videoScore` message, mark the task done. A failing (or panicking) task is
//! logged and the loop carries on. Completion bookkeeping runs on every exit
//! path through [`CompletionGuard`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::OracleError;
use crate::hub::{BroadcastHub, BroadcastReport};
use crate::model::{Task, VideoScoreMessage};
use crate::oracle::DynOracle;
use crate::queue::TaskQueue;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("could not serialize broadcast message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// How one task ended when nothing went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Broadcast(BroadcastReport),
    /// The oracle returned an error result; it is logged, not broadcast.
    Suppressed { error: String },
}

/// Marks the current task done when dropped, including on panic or cancellation.
struct CompletionGuard<'a> {
    queue: &'a TaskQueue,
    label: &'a str,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.queue.mark_done() {
            error!(target: "worker", worker = self.label, error = %e, "queue bookkeeping out of sync");
        }
        info!(
            target: "worker",
            worker = self.label,
            remaining = self.queue.len(),
            "task finished"
        );
    }
}

/// Evaluate one task and fan the result out.
pub async fn process_task(
    task: &Task,
    oracle: &DynOracle,
    hub: &BroadcastHub,
) -> Result<TaskOutcome, WorkerError> {
    let result = oracle.evaluate(task).await?;

    if result.has_error() {
        return Ok(TaskOutcome::Suppressed {
            error: result.error,
        });
    }

    let message = VideoScoreMessage::from_result(&task.video_id, &result);
    let text = serde_json::to_string(&message)?;
    info!(
        target: "worker",
        video_id = %task.video_id,
        score = message.score,
        "sending score to subscribers"
    );
    Ok(TaskOutcome::Broadcast(hub.broadcast(&text).await))
}

async fn run_worker(
    label: String,
    queue: Arc<TaskQueue>,
    hub: Arc<BroadcastHub>,
    oracle: DynOracle,
    shutdown: CancellationToken,
) {
    info!(target: "worker", worker = %label, "worker started");
    loop {
        let task = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            task = queue.dequeue() => task,
        };

        let _done = CompletionGuard {
            queue: &queue,
            label: &label,
        };
        let video_id = task.video_id.clone();
        info!(target: "worker", worker = %label, %video_id, "processing video");
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                warn!(target: "worker", worker = %label, %video_id, "shutdown: abandoning in-flight task");
                break;
            }
            res = AssertUnwindSafe(process_task(&task, &oracle, &hub)).catch_unwind() => res,
        };
        histogram!("task_duration_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            Ok(Ok(TaskOutcome::Broadcast(report))) => {
                counter!("tasks_processed_total", "outcome" => "broadcast").increment(1);
                info!(
                    target: "worker",
                    worker = %label, %video_id,
                    delivered = report.delivered,
                    pruned = report.pruned,
                    "successfully processed"
                );
            }
            Ok(Ok(TaskOutcome::Suppressed { error })) => {
                counter!("tasks_processed_total", "outcome" => "error_result").increment(1);
                warn!(
                    target: "worker",
                    worker = %label, %video_id, %error,
                    "evaluation returned an error; not broadcasting"
                );
            }
            Ok(Err(e)) => {
                counter!("tasks_processed_total", "outcome" => "failed").increment(1);
                error!(target: "worker", worker = %label, %video_id, error = %e, "error processing video");
            }
            Err(panic) => {
                counter!("tasks_processed_total", "outcome" => "panicked").increment(1);
                error!(
                    target: "worker",
                    worker = %label, %video_id,
                    panic = panic_message(panic.as_ref()),
                    "task panicked"
                );
            }
        }
    }
    info!(target: "worker", worker = %label, "worker stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that exited on their own after cancellation.
    pub stopped: usize,
    /// Workers that outlived the grace period and were aborted.
    pub aborted: usize,
    /// Workers whose task ended in a join error (panic outside a task).
    pub failed: usize,
}

pub struct WorkerPool {
    handles: Vec<(String, JoinHandle<()>)>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) on the current tokio runtime.
    pub fn spawn(
        size: usize,
        queue: Arc<TaskQueue>,
        hub: Arc<BroadcastHub>,
        oracle: DynOracle,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let handles = (0..size.max(1))
            .map(|i| {
                let label = format!("worker_{i}");
                let handle = tokio::spawn(run_worker(
                    label.clone(),
                    queue.clone(),
                    hub.clone(),
                    oracle.clone(),
                    shutdown.child_token(),
                ));
                (label, handle)
            })
            .collect::<Vec<_>>();
        info!(target: "worker", workers = handles.len(), oracle = oracle.name(), "worker pool started");
        Self { handles, shutdown }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Workers still running.
    pub fn alive(&self) -> usize {
        self.handles.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// Cancel every worker and wait for them, aborting stragglers after `grace`.
    ///
    /// Errors are logged and counted, never returned.
    pub async fn shutdown(self, grace: Duration) -> ShutdownReport {
        self.shutdown.cancel();
        let deadline = tokio::time::Instant::now() + grace;
        let mut report = ShutdownReport::default();

        for (label, mut handle) in self.handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.stopped += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    error!(target: "worker", worker = %label, error = %e, "worker ended abnormally");
                }
                Err(_) => {
                    handle.abort();
                    report.aborted += 1;
                    warn!(target: "worker", worker = %label, "worker did not stop within grace period; aborted");
                }
            }
        }
        info!(
            target: "worker",
            stopped = report.stopped,
            aborted = report.aborted,
            failed = report.failed,
            "worker pool stopped"
        );
        report
    }
}
