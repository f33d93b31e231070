//! Worker pool: claim tasks, execute them under a deadline, record outcomes.
//!
//! Timeout policy: a processor that runs past its deadline has its future
//! dropped. In-process work stops at the next await point; work that cannot
//! observe cancellation (blocking sections, requests already in flight) may
//! still produce side effects after the task is marked failed. Callers of
//! the service see only the FAILED record.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::dispatch::DispatchTable;
use crate::domain::{StatusUpdate, Task, TaskId, TaskType};
use crate::error::Error;
use crate::store::TaskStore;

/// Error text recorded when a processor exceeds its deadline.
const TIMEOUT_ERROR: &str = "Task timed out";

/// Handle over all workers of a service.
///
/// - `shutdown_and_join()` stops the pool and waits for every worker.
/// - A worker never outlives its pool: the pool owns every join handle.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `config.workers_per_type` workers for every registered task
    /// type.
    pub fn spawn(
        store: Arc<dyn TaskStore>,
        dispatch: Arc<DispatchTable>,
        config: &QueueConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::new();
        for task_type in dispatch.registered_types() {
            for i in 0..config.workers_per_type {
                let worker = Worker {
                    label: format!("{task_type}-{i}"),
                    task_type,
                    store: Arc::clone(&store),
                    dispatch: Arc::clone(&dispatch),
                    config: config.clone(),
                };
                let mut rx = shutdown_rx.clone();

                joins.push(tokio::spawn(async move {
                    worker.run(&mut rx).await;
                }));
            }
        }

        info!(workers = joins.len(), "worker pool started");
        Self { shutdown_tx, joins }
    }

    /// Total workers spawned.
    pub fn total(&self) -> usize {
        self.joins.len()
    }

    /// Workers whose loop has not yet exited.
    pub fn active(&self) -> usize {
        self.joins.iter().filter(|join| !join.is_finished()).count()
    }

    /// Request shutdown for all workers without waiting.
    ///
    /// This does not cancel in-flight processor execution; workers stop
    /// taking new claims and exit at their next suspension point.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for every worker to exit.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
        info!("worker pool stopped");
    }
}

/// One worker: an indefinite loop claiming tasks from a single type's queue.
struct Worker {
    label: String,
    task_type: TaskType,
    store: Arc<dyn TaskStore>,
    dispatch: Arc<DispatchTable>,
    config: QueueConfig,
}

impl Worker {
    async fn run(&self, shutdown_rx: &mut watch::Receiver<bool>) {
        debug!(worker = %self.label, "worker started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            // The blocking pop can wait up to poll_interval, so race it
            // against shutdown.
            let claimed = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                claimed = self
                    .store
                    .dequeue_timeout(self.task_type, self.config.poll_interval) => claimed,
            };

            match claimed {
                Ok(Some(task)) => self.process_one(task).await,
                // Queue stayed empty within the wait bound.
                Ok(None) => continue,
                Err(err) => {
                    // Transient store failure: back off and resume polling.
                    // A store failure never terminates the worker.
                    warn!(worker = %self.label, error = %err, "store unavailable, backing off");
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(self.config.store_backoff) => {}
                    }
                }
            }
        }

        debug!(worker = %self.label, "worker stopped");
    }

    /// Drive one claimed task to a terminal status.
    ///
    /// Every branch ends in a status write; the loop continues regardless of
    /// the outcome.
    async fn process_one(&self, task: Task) {
        let task_id = task.id();
        info!(
            worker = %self.label,
            task_id = %task_id,
            task_type = %task.task_type(),
            "processing task"
        );

        if let Err(err) = self.store.set_status(task_id, StatusUpdate::processing()).await {
            // The entry is already gone from its queue; without this write
            // the task can end up orphaned, with no terminal record.
            error!(
                worker = %self.label,
                task_id = %task_id,
                error = %err,
                "status write failed after claim, task may be orphaned"
            );
            tokio::time::sleep(self.config.store_backoff).await;
            return;
        }

        let Some(processor) = self.dispatch.get(task.task_type()) else {
            // No registration: terminal failure, no retry.
            let message = format!(
                "no processor registered for task type {}",
                task.task_type()
            );
            self.record_outcome(task_id, StatusUpdate::failed(message)).await;
            return;
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.config.processing_timeout,
            processor.process(task.payload()),
        )
        .await;
        let elapsed = started.elapsed().as_secs_f64();

        let update = match outcome {
            Ok(Ok(result)) => {
                info!(
                    worker = %self.label,
                    task_id = %task_id,
                    elapsed_secs = elapsed,
                    "task completed"
                );
                StatusUpdate::completed(result, elapsed)
            }
            Ok(Err(err)) => {
                warn!(worker = %self.label, task_id = %task_id, error = %err, "task failed");
                StatusUpdate::failed_after(err.to_string(), elapsed)
            }
            Err(_) => {
                let err = Error::Timeout(self.config.processing_timeout);
                warn!(
                    worker = %self.label,
                    task_id = %task_id,
                    elapsed_secs = elapsed,
                    error = %err,
                    "task timed out"
                );
                StatusUpdate::failed_after(TIMEOUT_ERROR, elapsed)
            }
        };

        self.record_outcome(task_id, update).await;
    }

    async fn record_outcome(&self, task_id: TaskId, update: StatusUpdate) {
        if let Err(err) = self.store.set_status(task_id, update).await {
            error!(
                worker = %self.label,
                task_id = %task_id,
                error = %err,
                "failed to record task outcome"
            );
            tokio::time::sleep(self.config.store_backoff).await;
        }
    }
}
