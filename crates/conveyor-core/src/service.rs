//! Queue service: pool lifecycle, submission, queries.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::config::QueueConfig;
use crate::dispatch::DispatchTable;
use crate::domain::{Priority, StatusRecord, StatusUpdate, Task, TaskId, TaskType};
use crate::error::Error;
use crate::stats::{QueueStats, TypeStats};
use crate::store::TaskStore;
use crate::worker::WorkerPool;

/// Service lifecycle state.
///
/// `Stopped -> Starting -> Running -> Stopping -> Stopped`. Stop is
/// idempotent; a start issued during shutdown waits for the shutdown to
/// finish and then starts from Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// One submission in a batch.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub task_type: TaskType,
    pub payload: serde_json::Value,
    pub priority: u8,
}

struct Lifecycle {
    state: ServiceState,
    pool: Option<WorkerPool>,
}

/// Orchestrator: owns the dispatch table and the worker-pool lifetime, and
/// exposes submit/query/stats to the embedding API layer.
///
/// Workers coordinate exclusively through the store's atomic dequeue; the
/// lifecycle lock here only serializes start/stop transitions.
pub struct QueueService {
    store: Arc<dyn TaskStore>,
    dispatch: Arc<DispatchTable>,
    config: QueueConfig,
    lifecycle: Mutex<Lifecycle>,
}

impl QueueService {
    pub fn new(store: Arc<dyn TaskStore>, dispatch: DispatchTable, config: QueueConfig) -> Self {
        Self {
            store,
            dispatch: Arc::new(dispatch),
            config,
            lifecycle: Mutex::new(Lifecycle {
                state: ServiceState::Stopped,
                pool: None,
            }),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServiceState {
        self.lifecycle.lock().await.state
    }

    /// Spawn workers for every registered task type.
    pub async fn start(&self) -> Result<(), Error> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state != ServiceState::Stopped {
            return Err(Error::Lifecycle(format!(
                "cannot start from {:?}",
                lifecycle.state
            )));
        }

        lifecycle.state = ServiceState::Starting;
        let pool = WorkerPool::spawn(
            Arc::clone(&self.store),
            Arc::clone(&self.dispatch),
            &self.config,
        );
        lifecycle.pool = Some(pool);
        lifecycle.state = ServiceState::Running;

        info!(
            task_types = self.dispatch.len(),
            workers_per_type = self.config.workers_per_type,
            "queue service started"
        );
        Ok(())
    }

    /// Broadcast cancellation and wait until every worker has exited.
    /// Idempotent: stopping a stopped service is a no-op.
    pub async fn stop(&self) -> Result<(), Error> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state == ServiceState::Stopped {
            return Ok(());
        }

        lifecycle.state = ServiceState::Stopping;
        if let Some(pool) = lifecycle.pool.take() {
            pool.shutdown_and_join().await;
        }
        lifecycle.state = ServiceState::Stopped;

        info!("queue service stopped");
        Ok(())
    }

    /// Validate, create the task, write its Pending record, enqueue.
    ///
    /// Fails synchronously on bad input without touching the queue.
    /// Submission while stopped is allowed; tasks accumulate until `start`.
    pub async fn submit(
        &self,
        task_type: TaskType,
        payload: serde_json::Value,
        priority: u8,
    ) -> Result<TaskId, Error> {
        let task = self.make_task(task_type, payload, priority)?;
        self.push(&task).await?;
        Ok(task.id())
    }

    /// Submit a batch. The whole batch is validated before any mutation, so
    /// one bad entry rejects all of them.
    pub async fn submit_many(&self, requests: Vec<SubmitRequest>) -> Result<Vec<TaskId>, Error> {
        let tasks = requests
            .into_iter()
            .map(|request| self.make_task(request.task_type, request.payload, request.priority))
            .collect::<Result<Vec<Task>, Error>>()?;

        let mut ids = Vec::with_capacity(tasks.len());
        for task in &tasks {
            self.push(task).await?;
            ids.push(task.id());
        }
        Ok(ids)
    }

    /// Proxy to the store's status lookup.
    pub async fn get_result(&self, task_id: TaskId) -> Result<Option<StatusRecord>, Error> {
        self.store.get_status(task_id).await
    }

    /// Pending counts per registered type plus worker liveness.
    pub async fn queue_stats(&self) -> Result<QueueStats, Error> {
        let mut stats = QueueStats::default();
        for task_type in self.dispatch.registered_types() {
            let pending = self.store.queue_size(task_type).await?;
            stats.per_type.insert(
                task_type,
                TypeStats {
                    pending_tasks: pending,
                    workers: self.config.workers_per_type,
                },
            );
        }

        let lifecycle = self.lifecycle.lock().await;
        if let Some(pool) = &lifecycle.pool {
            stats.total_workers = pool.total();
            stats.active_workers = pool.active();
        }
        Ok(stats)
    }

    fn make_task(
        &self,
        task_type: TaskType,
        payload: serde_json::Value,
        priority: u8,
    ) -> Result<Task, Error> {
        if !self.dispatch.contains(task_type) {
            return Err(Error::Validation(format!(
                "no processor registered for task type {task_type}"
            )));
        }
        let priority = Priority::new(priority)?;
        Ok(Task::new(task_type, payload, priority))
    }

    /// Pending status first, then the queue entry: a task visible to a
    /// worker always has a record to transition.
    async fn push(&self, task: &Task) -> Result<(), Error> {
        self.store
            .set_status(task.id(), StatusUpdate::pending())
            .await?;
        self.store.enqueue(task).await?;
        info!(
            task_id = %task.id(),
            task_type = %task.task_type(),
            priority = %task.priority(),
            "task submitted"
        );
        Ok(())
    }
}
